//! Assessment command and query handlers

use super::CustomerScope;
use crate::error::Result;
use crate::lifecycle::{self, NewAssessment};
use crate::tokens::{self, RespondentCount, TokenCounts};
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use pejl_common::db::models::{Assessment, Token};
use serde::{Deserialize, Serialize};

/// POST /api/assessments
///
/// Create a draft assessment targeting one unit of the caller's customer.
pub async fn create_assessment(
    State(state): State<AppState>,
    CustomerScope(customer_id): CustomerScope,
    Json(new): Json<NewAssessment>,
) -> Result<Response> {
    let assessment = lifecycle::create_assessment(&state.db, &customer_id, &new).await?;
    Ok((StatusCode::CREATED, Json(assessment)).into_response())
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    /// Optional filter: "scheduled" (not yet sent) or "due" (eligible to
    /// send now)
    pub filter: Option<String>,
}

/// GET /api/assessments
pub async fn list_assessments(
    State(state): State<AppState>,
    CustomerScope(customer_id): CustomerScope,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Assessment>>> {
    let assessments = match params.filter.as_deref() {
        None => lifecycle::list_assessments(&state.db, &customer_id).await?,
        Some("scheduled") => lifecycle::scheduled_assessments(&state.db, &customer_id).await?,
        Some("due") => {
            let now = Utc::now();
            lifecycle::scheduled_assessments(&state.db, &customer_id)
                .await?
                .into_iter()
                .filter(|a| a.scheduled_at.map(|at| at <= now).unwrap_or(false))
                .collect()
        }
        Some(other) => {
            return Err(crate::error::Error::BadRequest(format!(
                "unknown filter {}",
                other
            )))
        }
    };

    Ok(Json(assessments))
}

/// Assessment status view: the row plus respondent counts from the token
/// ledger (used tokens only; responses stay uncorrelated)
#[derive(Debug, Serialize)]
pub struct AssessmentView {
    #[serde(flatten)]
    pub assessment: Assessment,
    pub respondents: Vec<RespondentCount>,
}

/// GET /api/assessments/:id
pub async fn get_assessment(
    State(state): State<AppState>,
    CustomerScope(customer_id): CustomerScope,
    Path(id): Path<String>,
) -> Result<Json<AssessmentView>> {
    let assessment = lifecycle::get_assessment(&state.db, &customer_id, &id).await?;
    let respondents = tokens::respondent_counts(&state.db, &assessment.id).await?;

    Ok(Json(AssessmentView {
        assessment,
        respondents,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    pub scheduled_at: DateTime<Utc>,
}

/// POST /api/assessments/:id/schedule
///
/// Schedule or reschedule; legal from draft and scheduled only.
pub async fn schedule_assessment(
    State(state): State<AppState>,
    CustomerScope(customer_id): CustomerScope,
    Path(id): Path<String>,
    Json(request): Json<ScheduleRequest>,
) -> Result<Json<Assessment>> {
    let assessment = lifecycle::schedule_assessment(
        &state.db,
        &customer_id,
        &id,
        request.scheduled_at,
        Utc::now(),
    )
    .await?;

    Ok(Json(assessment))
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

/// POST /api/assessments/:id/cancel
///
/// Only legal from scheduled. An assessment that has already been sent (or
/// is still draft) answers 409 with cancelled=false; an unknown id is 404.
pub async fn cancel_assessment(
    State(state): State<AppState>,
    CustomerScope(customer_id): CustomerScope,
    Path(id): Path<String>,
) -> Result<Response> {
    let cancelled = lifecycle::cancel_assessment(&state.db, &customer_id, &id).await?;
    let status = if cancelled {
        StatusCode::OK
    } else {
        StatusCode::CONFLICT
    };

    Ok((status, Json(CancelResponse { cancelled })).into_response())
}

#[derive(Debug, Serialize)]
pub struct IssueResponse {
    pub issued: usize,
    pub tokens: Vec<Token>,
}

/// POST /api/assessments/:id/tokens
///
/// Issue the token set for the assessment's unit. Idempotent: repeating the
/// call returns the existing set.
pub async fn issue_tokens(
    State(state): State<AppState>,
    CustomerScope(customer_id): CustomerScope,
    Path(id): Path<String>,
) -> Result<Json<IssueResponse>> {
    let assessment = lifecycle::get_assessment(&state.db, &customer_id, &id).await?;

    let headcount: i64 =
        sqlx::query_scalar("SELECT headcount FROM org_units WHERE id = ? AND customer_id = ?")
            .bind(&assessment.unit_id)
            .bind(&customer_id)
            .fetch_optional(&state.db)
            .await?
            .ok_or_else(|| crate::error::Error::NotFound(format!("unit {}", assessment.unit_id)))?;

    let counts = TokenCounts::for_unit(headcount, assessment.include_leader_assessment);
    let issued = tokens::issue_tokens(&state.db, &assessment.id, &assessment.unit_id, counts).await?;

    Ok(Json(IssueResponse {
        issued: issued.len(),
        tokens: issued,
    }))
}
