//! REST API for the Survey Engine
//!
//! Command surface: create/schedule/cancel assessments, issue tokens,
//! redeem a token with a response batch. Query surface: assessment lists
//! and status views, aggregate results with data-quality annotations.
//!
//! Authentication and session handling live in front of this service; the
//! authenticated customer scope arrives in the `X-Pejl-Customer` header and
//! every scoped handler filters by it.

mod assessments;
mod health;
mod redeem;
mod results;

pub use assessments::{
    cancel_assessment, create_assessment, get_assessment, issue_tokens, list_assessments,
    schedule_assessment,
};
pub use health::health_check;
pub use redeem::redeem;
pub use results::get_results;

use crate::error::Error;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

/// Header carrying the caller's customer scope
pub const CUSTOMER_SCOPE_HEADER: &str = "x-pejl-customer";

/// Authenticated customer scope for a request
///
/// Populated by the upstream auth layer. Rows outside this scope behave as
/// "not found" in every scoped query; leaking across tenants is a
/// correctness bug, not a cosmetic one.
pub struct CustomerScope(pub String);

#[axum::async_trait]
impl<S> FromRequestParts<S> for CustomerScope
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(CUSTOMER_SCOPE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        match value {
            Some(customer_id) => Ok(CustomerScope(customer_id)),
            None => Err(Error::BadRequest(format!(
                "missing {} header",
                CUSTOMER_SCOPE_HEADER
            ))),
        }
    }
}
