//! Question catalog
//!
//! The active question set for a customer: customer-scoped items when any
//! exist, otherwise the seeded global default catalog. Questions referenced
//! by responses are never deleted, only deactivated.

use crate::error::{Error, Result};
use pejl_common::db::models::Question;
use pejl_common::fields::Field;
use sqlx::SqlitePool;

/// Fetch the active question set for a customer, ordered by sequence
///
/// A customer with its own active questions overrides the default catalog
/// wholesale; there is no per-question merge.
pub async fn active_questions(pool: &SqlitePool, customer_id: &str) -> Result<Vec<Question>> {
    let custom = fetch_questions(pool, Some(customer_id)).await?;
    if !custom.is_empty() {
        return Ok(custom);
    }

    fetch_questions(pool, None).await
}

async fn fetch_questions(pool: &SqlitePool, customer_id: Option<&str>) -> Result<Vec<Question>> {
    let rows: Vec<(String, Option<String>, String, String, i64, i64, i64, i64)> = match customer_id
    {
        Some(customer_id) => {
            sqlx::query_as(
                r#"
                SELECT id, customer_id, field, text, reverse_scored, sequence, is_default, active
                FROM questions
                WHERE customer_id = ? AND active = 1
                ORDER BY sequence
                "#,
            )
            .bind(customer_id)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as(
                r#"
                SELECT id, customer_id, field, text, reverse_scored, sequence, is_default, active
                FROM questions
                WHERE customer_id IS NULL AND is_default = 1 AND active = 1
                ORDER BY sequence
                "#,
            )
            .fetch_all(pool)
            .await?
        }
    };

    rows.into_iter()
        .map(
            |(id, customer_id, field, text, reverse_scored, sequence, is_default, active)| {
                let field = Field::parse(&field).ok_or_else(|| {
                    Error::Internal(format!("question {} has unknown field code {}", id, field))
                })?;
                Ok(Question {
                    id,
                    customer_id,
                    field,
                    text,
                    reverse_scored: reverse_scored != 0,
                    sequence,
                    is_default: is_default != 0,
                    active: active != 0,
                })
            },
        )
        .collect()
}

/// Deactivate a question within the caller's customer scope
///
/// Returns NotFound when the question does not exist or belongs to another
/// customer; the row itself is kept because responses may reference it.
pub async fn deactivate_question(
    pool: &SqlitePool,
    customer_id: &str,
    question_id: &str,
) -> Result<()> {
    let result = sqlx::query("UPDATE questions SET active = 0 WHERE id = ? AND customer_id = ?")
        .bind(question_id)
        .bind(customer_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("question {}", question_id)));
    }

    Ok(())
}
