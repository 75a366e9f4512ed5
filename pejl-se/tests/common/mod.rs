//! Shared test helpers: throwaway database + seeded tenant fixtures

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use pejl_common::time::to_db_time;
use pejl_se::lifecycle::{self, NewAssessment};
use pejl_se::questions;
use pejl_se::tokens::ScoreEntry;
use sqlx::SqlitePool;
use tempfile::TempDir;

/// Create a fresh database in a temp directory
///
/// The TempDir must be kept alive for the duration of the test.
pub async fn setup_db() -> (TempDir, SqlitePool) {
    let dir = tempfile::tempdir().expect("temp dir");
    let db_path = dir.path().join("pejl.db");
    let pool = pejl_common::db::init_database(&db_path)
        .await
        .expect("init database");
    (dir, pool)
}

pub async fn seed_customer(pool: &SqlitePool, id: &str, name: &str) {
    sqlx::query("INSERT INTO customers (id, name, sender_name) VALUES (?, ?, ?)")
        .bind(id)
        .bind(name)
        .bind(name)
        .execute(pool)
        .await
        .expect("seed customer");
}

pub async fn seed_unit(pool: &SqlitePool, id: &str, customer_id: &str, headcount: i64) {
    sqlx::query(
        "INSERT INTO org_units (id, customer_id, name, path, depth, headcount) VALUES (?, ?, ?, ?, 0, ?)",
    )
    .bind(id)
    .bind(customer_id)
    .bind(id)
    .bind(format!("/{}", id))
    .bind(headcount)
    .execute(pool)
    .await
    .expect("seed unit");
}

pub async fn seed_contact(pool: &SqlitePool, id: &str, unit_id: &str, email: &str) {
    sqlx::query("INSERT INTO contacts (id, unit_id, name, email, is_leader) VALUES (?, ?, ?, ?, 0)")
        .bind(id)
        .bind(unit_id)
        .bind(email)
        .bind(email)
        .execute(pool)
        .await
        .expect("seed contact");
}

/// Create a draft assessment through the lifecycle API
pub async fn create_assessment(
    pool: &SqlitePool,
    customer_id: &str,
    unit_id: &str,
    name: &str,
) -> String {
    let assessment = lifecycle::create_assessment(
        pool,
        customer_id,
        &NewAssessment {
            unit_id: unit_id.to_string(),
            name: name.to_string(),
            period: Some("2026-Q3".to_string()),
            include_leader_assessment: Some(true),
            min_responses: None,
        },
    )
    .await
    .expect("create assessment");
    assessment.id
}

/// Put an assessment into scheduled state with an arbitrary timestamp,
/// bypassing the future-only validation so tests can construct overdue rows
pub async fn force_schedule(pool: &SqlitePool, assessment_id: &str, at: DateTime<Utc>) {
    sqlx::query("UPDATE assessments SET status = 'scheduled', scheduled_at = ? WHERE id = ?")
        .bind(to_db_time(at))
        .bind(assessment_id)
        .execute(pool)
        .await
        .expect("force schedule");
}

/// A complete submission batch answering every active question with the
/// same raw score
pub async fn full_batch(pool: &SqlitePool, customer_id: &str, score: i64) -> Vec<ScoreEntry> {
    let questions = questions::active_questions(pool, customer_id)
        .await
        .expect("active questions");
    assert!(!questions.is_empty(), "default catalog must be seeded");

    questions
        .into_iter()
        .map(|q| ScoreEntry {
            question_id: q.id,
            score,
            comment: None,
        })
        .collect()
}
