//! Token redemption handler

use crate::error::Result;
use crate::tokens::{self, RedemptionReceipt, ScoreEntry};
use crate::AppState;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct RedeemRequest {
    pub token: String,
    pub responses: Vec<ScoreEntry>,
}

/// POST /api/redeem
///
/// The token is the credential; no customer scope is required. The batch
/// must cover every active question, and the whole submission commits
/// atomically with the token's used flag.
pub async fn redeem(
    State(state): State<AppState>,
    Json(request): Json<RedeemRequest>,
) -> Result<Json<RedemptionReceipt>> {
    let receipt = tokens::redeem_token(
        &state.db,
        state.scoring.scale,
        &request.token,
        &request.responses,
    )
    .await?;

    Ok(Json(receipt))
}
