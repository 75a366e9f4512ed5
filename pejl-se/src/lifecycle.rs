//! Assessment lifecycle manager
//!
//! State machine over the assessments table:
//! `draft -> scheduled -> sent`, with `scheduled -> cancelled`. `sent` and
//! `cancelled` are terminal. The scheduled->sent transition is driven by the
//! background scan in the scheduler module; everything here is the command
//! and query surface over the store.
//!
//! All administrator-facing operations filter by the caller's customer
//! scope; an id belonging to another tenant behaves as "not found".

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use pejl_common::db::models::Assessment;
use pejl_common::fields::AssessmentStatus;
use pejl_common::time::{from_db_time, to_db_time};
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

/// Parameters for creating a draft assessment
#[derive(Debug, Clone, Deserialize)]
pub struct NewAssessment {
    pub unit_id: String,
    pub name: String,
    pub period: Option<String>,
    pub include_leader_assessment: Option<bool>,
    pub min_responses: Option<i64>,
}

type AssessmentRow = (
    String,
    String,
    String,
    String,
    Option<String>,
    String,
    Option<String>,
    Option<String>,
    i64,
    i64,
    Option<String>,
);

const ASSESSMENT_COLUMNS: &str = "id, customer_id, unit_id, name, period, status, scheduled_at, \
     sent_at, include_leader_assessment, min_responses, last_error";

fn assessment_from_row(row: AssessmentRow) -> Result<Assessment> {
    let (
        id,
        customer_id,
        unit_id,
        name,
        period,
        status,
        scheduled_at,
        sent_at,
        include_leader_assessment,
        min_responses,
        last_error,
    ) = row;

    let status = AssessmentStatus::parse(&status)
        .ok_or_else(|| Error::Internal(format!("assessment {} has unknown status {}", id, status)))?;

    Ok(Assessment {
        id,
        customer_id,
        unit_id,
        name,
        period,
        status,
        scheduled_at: scheduled_at.as_deref().and_then(from_db_time),
        sent_at: sent_at.as_deref().and_then(from_db_time),
        include_leader_assessment: include_leader_assessment != 0,
        min_responses,
        last_error,
    })
}

/// Create a draft assessment targeting one unit
///
/// The target unit must belong to the caller's customer.
pub async fn create_assessment(
    pool: &SqlitePool,
    customer_id: &str,
    new: &NewAssessment,
) -> Result<Assessment> {
    let unit_ok: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM org_units WHERE id = ? AND customer_id = ?)")
            .bind(&new.unit_id)
            .bind(customer_id)
            .fetch_one(pool)
            .await?;

    if !unit_ok {
        return Err(Error::NotFound(format!("unit {}", new.unit_id)));
    }

    let min_responses = match new.min_responses {
        Some(n) if n >= 0 => n,
        Some(n) => return Err(Error::BadRequest(format!("min_responses {} is negative", n))),
        None => default_min_responses(pool).await?,
    };

    let id = Uuid::new_v4().to_string();
    sqlx::query(
        r#"
        INSERT INTO assessments (id, customer_id, unit_id, name, period, status, include_leader_assessment, min_responses)
        VALUES (?, ?, ?, ?, ?, 'draft', ?, ?)
        "#,
    )
    .bind(&id)
    .bind(customer_id)
    .bind(&new.unit_id)
    .bind(&new.name)
    .bind(&new.period)
    .bind(new.include_leader_assessment.unwrap_or(true) as i64)
    .bind(min_responses)
    .execute(pool)
    .await?;

    info!("Created assessment {} for unit {}", id, new.unit_id);
    get_assessment(pool, customer_id, &id).await
}

async fn default_min_responses(pool: &SqlitePool) -> Result<i64> {
    let value =
        sqlx::query_scalar::<_, String>("SELECT value FROM settings WHERE key = 'default_min_responses'")
            .fetch_optional(pool)
            .await?;
    Ok(value.and_then(|v| v.parse().ok()).unwrap_or(3))
}

/// Fetch one assessment within the caller's customer scope
pub async fn get_assessment(
    pool: &SqlitePool,
    customer_id: &str,
    assessment_id: &str,
) -> Result<Assessment> {
    let sql = format!(
        "SELECT {} FROM assessments WHERE id = ? AND customer_id = ?",
        ASSESSMENT_COLUMNS
    );
    let row: Option<AssessmentRow> = sqlx::query_as(&sql)
        .bind(assessment_id)
        .bind(customer_id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => assessment_from_row(row),
        None => Err(Error::NotFound(format!("assessment {}", assessment_id))),
    }
}

/// List assessments for a customer, newest first
pub async fn list_assessments(pool: &SqlitePool, customer_id: &str) -> Result<Vec<Assessment>> {
    let sql = format!(
        "SELECT {} FROM assessments WHERE customer_id = ? ORDER BY created_at DESC",
        ASSESSMENT_COLUMNS
    );
    let rows: Vec<AssessmentRow> = sqlx::query_as(&sql)
        .bind(customer_id)
        .fetch_all(pool)
        .await?;

    rows.into_iter().map(assessment_from_row).collect()
}

/// Scheduled-but-not-yet-sent assessments for a customer
pub async fn scheduled_assessments(
    pool: &SqlitePool,
    customer_id: &str,
) -> Result<Vec<Assessment>> {
    let sql = format!(
        "SELECT {} FROM assessments WHERE customer_id = ? AND status = 'scheduled' ORDER BY scheduled_at",
        ASSESSMENT_COLUMNS
    );
    let rows: Vec<AssessmentRow> = sqlx::query_as(&sql)
        .bind(customer_id)
        .fetch_all(pool)
        .await?;

    rows.into_iter().map(assessment_from_row).collect()
}

/// Schedule (or reschedule) an assessment
///
/// Legal from draft and from scheduled; the timestamp must lie in the
/// future. Sent and cancelled assessments reject with a state conflict.
pub async fn schedule_assessment(
    pool: &SqlitePool,
    customer_id: &str,
    assessment_id: &str,
    scheduled_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<Assessment> {
    if scheduled_at <= now {
        return Err(Error::BadRequest(format!(
            "scheduled_at {} is not in the future",
            to_db_time(scheduled_at)
        )));
    }

    let current = get_assessment(pool, customer_id, assessment_id).await?;
    match current.status {
        AssessmentStatus::Draft | AssessmentStatus::Scheduled => {}
        other => {
            return Err(Error::InvalidState(format!(
                "cannot schedule assessment in status {}",
                other.as_str()
            )))
        }
    }

    sqlx::query(
        r#"
        UPDATE assessments
        SET status = 'scheduled', scheduled_at = ?, updated_at = CURRENT_TIMESTAMP
        WHERE id = ? AND customer_id = ? AND status IN ('draft', 'scheduled')
        "#,
    )
    .bind(to_db_time(scheduled_at))
    .bind(assessment_id)
    .bind(customer_id)
    .execute(pool)
    .await?;

    info!(
        "Assessment {} scheduled for {}",
        assessment_id,
        to_db_time(scheduled_at)
    );
    get_assessment(pool, customer_id, assessment_id).await
}

/// Cancel a scheduled assessment
///
/// Returns true when the cancellation took effect. An assessment that has
/// already moved on (sent, cancelled, or still draft) returns false rather
/// than an error; an unknown id is NotFound, so callers can tell "already
/// done" from "does not exist".
pub async fn cancel_assessment(
    pool: &SqlitePool,
    customer_id: &str,
    assessment_id: &str,
) -> Result<bool> {
    // Existence check first: the conditional update alone cannot
    // distinguish a missing row from a wrong-state row
    get_assessment(pool, customer_id, assessment_id).await?;

    let result = sqlx::query(
        r#"
        UPDATE assessments
        SET status = 'cancelled', updated_at = CURRENT_TIMESTAMP
        WHERE id = ? AND customer_id = ? AND status = 'scheduled'
        "#,
    )
    .bind(assessment_id)
    .bind(customer_id)
    .execute(pool)
    .await?;

    let cancelled = result.rows_affected() == 1;
    if cancelled {
        info!("Assessment {} cancelled", assessment_id);
    }
    Ok(cancelled)
}

/// All assessments due for sending, across tenants
///
/// The background scan owns this query; it is the only caller that is not
/// customer-scoped. Sent assessments never reappear regardless of their
/// scheduled_at.
pub async fn due_assessments(pool: &SqlitePool, now: DateTime<Utc>) -> Result<Vec<Assessment>> {
    let sql = format!(
        "SELECT {} FROM assessments WHERE status = 'scheduled' AND scheduled_at IS NOT NULL AND scheduled_at <= ? ORDER BY scheduled_at",
        ASSESSMENT_COLUMNS
    );
    let rows: Vec<AssessmentRow> = sqlx::query_as(&sql)
        .bind(to_db_time(now))
        .fetch_all(pool)
        .await?;

    rows.into_iter().map(assessment_from_row).collect()
}

/// Promote an assessment to sent
///
/// Unconditional status write once token issuance and dispatch succeeded;
/// clears any stale send error.
pub async fn mark_sent(
    pool: &SqlitePool,
    assessment_id: &str,
    sent_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE assessments
        SET status = 'sent', sent_at = ?, last_error = NULL, updated_at = CURRENT_TIMESTAMP
        WHERE id = ?
        "#,
    )
    .bind(to_db_time(sent_at))
    .bind(assessment_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Record a send failure on the assessment
///
/// The assessment stays scheduled for the next scan; the error text is what
/// the administrator sees instead of an opaque "scheduled" label.
pub async fn record_send_error(
    pool: &SqlitePool,
    assessment_id: &str,
    error: &str,
) -> Result<()> {
    sqlx::query(
        "UPDATE assessments SET last_error = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(error)
    .bind(assessment_id)
    .execute(pool)
    .await?;

    Ok(())
}
