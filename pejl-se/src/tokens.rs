//! Token ledger
//!
//! Issues and redeems single-use anonymous access tokens. A token binds
//! {assessment, unit, respondent category} without a personal identifier.
//! Redemption is the only mutation a token ever sees, and it is exactly-once:
//! the used flag and the full response batch commit in one transaction.
//!
//! The used-token count is the sole basis for response-count reporting; the
//! ledger never correlates a token back to the response rows it produced.

use crate::error::{Error, Result};
use crate::questions;
use chrono::Utc;
use pejl_common::config::ScaleConfig;
use pejl_common::db::models::Token;
use pejl_common::fields::{AssessmentStatus, RespondentCategory};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Token string length. 32 alphanumeric characters is ~190 bits, collisions
/// are a generation error rather than an expected case.
const TOKEN_LEN: usize = 32;

/// Attempts per slot before giving up on token generation
const MAX_GENERATION_ATTEMPTS: u32 = 5;

/// Desired respondent slots per category for one assessment+unit pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCounts {
    pub employee: i64,
    pub leader_assess: i64,
    pub leader_self: i64,
}

impl TokenCounts {
    /// Derive slot counts from unit headcount and assessment configuration
    pub fn for_unit(headcount: i64, include_leader_assessment: bool) -> Self {
        Self {
            employee: headcount.max(0),
            leader_assess: if include_leader_assessment { 1 } else { 0 },
            leader_self: if include_leader_assessment { 1 } else { 0 },
        }
    }

    fn per_category(&self) -> [(RespondentCategory, i64); 3] {
        [
            (RespondentCategory::Employee, self.employee),
            (RespondentCategory::LeaderAssess, self.leader_assess),
            (RespondentCategory::LeaderSelf, self.leader_self),
        ]
    }

    pub fn total(&self) -> i64 {
        self.employee + self.leader_assess + self.leader_self
    }
}

/// One answered question inside a submission batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub question_id: String,
    pub score: i64,
    pub comment: Option<String>,
}

/// Confirmation returned on successful redemption
#[derive(Debug, Clone, Serialize)]
pub struct RedemptionReceipt {
    pub assessment_id: String,
    pub respondent_category: RespondentCategory,
    pub responses_written: usize,
}

/// Used/total token counts for one respondent category
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RespondentCount {
    pub category: RespondentCategory,
    pub used: i64,
    pub total: i64,
}

fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// Issue tokens for an assessment+unit pair
///
/// Idempotent: if any tokens already exist for the pair, the existing set is
/// returned unchanged, so retrying a failed delivery step never doubles
/// respondent slots. Under concurrent invocation the unique slot index makes
/// the second writer detect the existing row and skip.
pub async fn issue_tokens(
    pool: &SqlitePool,
    assessment_id: &str,
    unit_id: &str,
    counts: TokenCounts,
) -> Result<Vec<Token>> {
    let existing = tokens_for_pair(pool, assessment_id, unit_id).await?;
    if !existing.is_empty() {
        debug!(
            "Tokens already issued for assessment {} unit {} ({} slots), skipping",
            assessment_id,
            unit_id,
            existing.len()
        );
        return Ok(existing);
    }

    for (category, count) in counts.per_category() {
        for slot in 0..count {
            insert_token_slot(pool, assessment_id, unit_id, category, slot).await?;
        }
    }

    let issued = tokens_for_pair(pool, assessment_id, unit_id).await?;
    info!(
        "Issued {} tokens for assessment {} unit {}",
        issued.len(),
        assessment_id,
        unit_id
    );
    Ok(issued)
}

/// Insert one token slot, retrying on token-string collision
///
/// INSERT OR IGNORE distinguishes the two silent-failure cases afterwards:
/// slot already present means a concurrent issuance won the race (done),
/// slot still absent means the random token collided (retry with a fresh
/// value). Exhausting attempts is a fatal generation error.
async fn insert_token_slot(
    pool: &SqlitePool,
    assessment_id: &str,
    unit_id: &str,
    category: RespondentCategory,
    slot: i64,
) -> Result<()> {
    for _ in 0..MAX_GENERATION_ATTEMPTS {
        let token = generate_token();
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO tokens (token, assessment_id, unit_id, respondent_category, slot)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&token)
        .bind(assessment_id)
        .bind(unit_id)
        .bind(category.as_str())
        .bind(slot)
        .execute(pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        let slot_taken: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM tokens
                WHERE assessment_id = ? AND unit_id = ? AND respondent_category = ? AND slot = ?
            )
            "#,
        )
        .bind(assessment_id)
        .bind(unit_id)
        .bind(category.as_str())
        .bind(slot)
        .fetch_one(pool)
        .await?;

        if slot_taken {
            debug!(
                "Slot {}/{} already issued for assessment {} unit {} (concurrent issuance)",
                category.as_str(),
                slot,
                assessment_id,
                unit_id
            );
            return Ok(());
        }
        // Token string collided with an unrelated row; loop for a fresh value
    }

    Err(Error::TokenGeneration(format!(
        "no unique token after {} attempts for assessment {}",
        MAX_GENERATION_ATTEMPTS, assessment_id
    )))
}

/// All tokens for an assessment+unit pair
pub async fn tokens_for_pair(
    pool: &SqlitePool,
    assessment_id: &str,
    unit_id: &str,
) -> Result<Vec<Token>> {
    let rows: Vec<(String, String, String, String, i64, Option<String>)> = sqlx::query_as(
        r#"
        SELECT token, assessment_id, unit_id, respondent_category, is_used, used_at
        FROM tokens
        WHERE assessment_id = ? AND unit_id = ?
        ORDER BY respondent_category, slot
        "#,
    )
    .bind(assessment_id)
    .bind(unit_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(token, assessment_id, unit_id, category, is_used, used_at)| {
            let respondent_category = RespondentCategory::parse(&category).ok_or_else(|| {
                Error::Internal(format!("token has unknown respondent category {}", category))
            })?;
            let used_at = used_at
                .as_deref()
                .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&chrono::Utc));
            Ok(Token {
                token,
                assessment_id,
                unit_id,
                respondent_category,
                is_used: is_used != 0,
                used_at,
            })
        })
        .collect()
}

/// Redeem a token with a complete submission batch
///
/// The whole batch and the used flag commit atomically; a lost race on the
/// compare-and-set update surfaces as TokenAlreadyUsed with nothing written.
pub async fn redeem_token(
    pool: &SqlitePool,
    scale: ScaleConfig,
    token_str: &str,
    batch: &[ScoreEntry],
) -> Result<RedemptionReceipt> {
    // Token lookup joined to its assessment: one query answers existence,
    // used state, lifecycle status and customer scope
    let row: Option<(String, String, String, i64, String, String)> = sqlx::query_as(
        r#"
        SELECT t.assessment_id, t.unit_id, t.respondent_category, t.is_used, a.status, a.customer_id
        FROM tokens t
        JOIN assessments a ON a.id = t.assessment_id
        WHERE t.token = ?
        "#,
    )
    .bind(token_str)
    .fetch_optional(pool)
    .await?;

    let (assessment_id, unit_id, category, is_used, status, customer_id) =
        row.ok_or(Error::TokenNotFound)?;

    let respondent_category = RespondentCategory::parse(&category)
        .ok_or_else(|| Error::Internal(format!("unknown respondent category {}", category)))?;

    if is_used != 0 {
        return Err(Error::TokenAlreadyUsed);
    }

    if AssessmentStatus::parse(&status) == Some(AssessmentStatus::Cancelled) {
        return Err(Error::AssessmentClosed(assessment_id));
    }

    // A submission is all-or-nothing per respondent: it must cover exactly
    // the active question set
    let required = questions::active_questions(pool, &customer_id).await?;
    validate_batch(batch, &required, scale)?;

    let used_at = Utc::now().to_rfc3339();
    let mut tx = pool.begin().await?;

    // Compare-and-set on is_used: concurrent redemptions of the same token
    // leave exactly one winner, the rest see zero rows affected
    let updated = sqlx::query(
        "UPDATE tokens SET is_used = 1, used_at = ? WHERE token = ? AND is_used = 0",
    )
    .bind(&used_at)
    .bind(token_str)
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() == 0 {
        tx.rollback().await?;
        return Err(Error::TokenAlreadyUsed);
    }

    for entry in batch {
        sqlx::query(
            r#"
            INSERT INTO responses (assessment_id, unit_id, question_id, respondent_category, score, comment)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&assessment_id)
        .bind(&unit_id)
        .bind(&entry.question_id)
        .bind(respondent_category.as_str())
        .bind(entry.score)
        .bind(&entry.comment)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    info!(
        "Token redeemed for assessment {} ({}, {} responses)",
        assessment_id,
        respondent_category.as_str(),
        batch.len()
    );

    Ok(RedemptionReceipt {
        assessment_id,
        respondent_category,
        responses_written: batch.len(),
    })
}

/// Validate a submission batch against the active question set and scale
fn validate_batch(
    batch: &[ScoreEntry],
    required: &[pejl_common::db::models::Question],
    scale: ScaleConfig,
) -> Result<()> {
    let required_ids: HashSet<&str> = required.iter().map(|q| q.id.as_str()).collect();

    let mut seen: HashMap<&str, i64> = HashMap::new();
    for entry in batch {
        if !required_ids.contains(entry.question_id.as_str()) {
            return Err(Error::BadRequest(format!(
                "question {} is not part of the active question set",
                entry.question_id
            )));
        }
        if seen.insert(entry.question_id.as_str(), entry.score).is_some() {
            return Err(Error::BadRequest(format!(
                "question {} answered more than once",
                entry.question_id
            )));
        }
        if !scale.contains(entry.score) {
            return Err(Error::ScoreOutOfRange(format!(
                "score {} outside scale {}..{}",
                entry.score, scale.min, scale.max
            )));
        }
    }

    if seen.len() != required_ids.len() {
        let missing: Vec<&str> = required
            .iter()
            .map(|q| q.id.as_str())
            .filter(|id| !seen.contains_key(id))
            .collect();
        return Err(Error::IncompleteSubmission(format!(
            "{} of {} questions unanswered: {}",
            missing.len(),
            required_ids.len(),
            missing.join(", ")
        )));
    }

    Ok(())
}

/// Used/total token counts per respondent category
///
/// Reported from the token table alone; responses stay uncorrelated.
pub async fn respondent_counts(
    pool: &SqlitePool,
    assessment_id: &str,
) -> Result<Vec<RespondentCount>> {
    let rows: Vec<(String, i64, i64)> = sqlx::query_as(
        r#"
        SELECT respondent_category, SUM(is_used), COUNT(*)
        FROM tokens
        WHERE assessment_id = ?
        GROUP BY respondent_category
        "#,
    )
    .bind(assessment_id)
    .fetch_all(pool)
    .await?;

    let by_category: HashMap<String, (i64, i64)> = rows
        .into_iter()
        .map(|(category, used, total)| (category, (used, total)))
        .collect();

    Ok(RespondentCategory::ALL
        .iter()
        .map(|&category| {
            let (used, total) = by_category
                .get(category.as_str())
                .copied()
                .unwrap_or((0, 0));
            RespondentCount {
                category,
                used,
                total,
            }
        })
        .collect())
}
