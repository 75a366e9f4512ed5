//! Token ledger integration tests
//!
//! Covers issuance idempotence, the exactly-once redemption contract, and
//! all-or-nothing batch semantics against a real database.

mod common;

use common::*;
use pejl_common::config::ScaleConfig;
use pejl_common::fields::RespondentCategory;
use pejl_se::error::Error;
use pejl_se::tokens::{self, ScoreEntry, TokenCounts};

async fn setup_assessment() -> (tempfile::TempDir, sqlx::SqlitePool, String) {
    let (dir, pool) = setup_db().await;
    seed_customer(&pool, "cust-a", "Acme").await;
    seed_unit(&pool, "unit-a", "cust-a", 3).await;
    let assessment_id = create_assessment(&pool, "cust-a", "unit-a", "Q3 pulse").await;
    (dir, pool, assessment_id)
}

#[tokio::test]
async fn issuing_tokens_twice_produces_no_duplicates() {
    let (_dir, pool, assessment_id) = setup_assessment().await;
    let counts = TokenCounts::for_unit(3, true);

    let first = tokens::issue_tokens(&pool, &assessment_id, "unit-a", counts)
        .await
        .unwrap();
    assert_eq!(first.len(), 5); // 3 employee + leader_assess + leader_self

    let second = tokens::issue_tokens(&pool, &assessment_id, "unit-a", counts)
        .await
        .unwrap();
    assert_eq!(second.len(), 5);

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tokens WHERE assessment_id = ?")
        .bind(&assessment_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(total, 5);
}

#[tokio::test]
async fn issued_tokens_carry_requested_categories() {
    let (_dir, pool, assessment_id) = setup_assessment().await;

    let issued = tokens::issue_tokens(
        &pool,
        &assessment_id,
        "unit-a",
        TokenCounts::for_unit(2, false),
    )
    .await
    .unwrap();

    assert_eq!(issued.len(), 2);
    assert!(issued
        .iter()
        .all(|t| t.respondent_category == RespondentCategory::Employee));
    assert!(issued.iter().all(|t| !t.is_used));
}

#[tokio::test]
async fn redemption_succeeds_once_and_writes_full_batch() {
    let (_dir, pool, assessment_id) = setup_assessment().await;
    let issued = tokens::issue_tokens(
        &pool,
        &assessment_id,
        "unit-a",
        TokenCounts::for_unit(1, false),
    )
    .await
    .unwrap();
    let token = issued[0].token.clone();

    let batch = full_batch(&pool, "cust-a", 4).await;
    let receipt = tokens::redeem_token(&pool, ScaleConfig::default(), &token, &batch)
        .await
        .unwrap();

    assert_eq!(receipt.responses_written, batch.len());
    assert_eq!(receipt.respondent_category, RespondentCategory::Employee);

    let response_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM responses WHERE assessment_id = ?")
            .bind(&assessment_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(response_count as usize, batch.len());

    // Second redemption is a state conflict, not a not-found
    let again = tokens::redeem_token(&pool, ScaleConfig::default(), &token, &batch).await;
    assert!(matches!(again, Err(Error::TokenAlreadyUsed)));
}

#[tokio::test]
async fn concurrent_redemptions_yield_exactly_one_success() {
    let (_dir, pool, assessment_id) = setup_assessment().await;
    let issued = tokens::issue_tokens(
        &pool,
        &assessment_id,
        "unit-a",
        TokenCounts::for_unit(1, false),
    )
    .await
    .unwrap();
    let token = issued[0].token.clone();
    let batch = full_batch(&pool, "cust-a", 3).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let pool = pool.clone();
        let token = token.clone();
        let batch = batch.clone();
        handles.push(tokio::spawn(async move {
            tokens::redeem_token(&pool, ScaleConfig::default(), &token, &batch).await
        }));
    }

    let mut successes = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(Error::TokenAlreadyUsed) => conflicts += 1,
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(conflicts, 7);

    // Exactly one batch of responses landed
    let response_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM responses WHERE assessment_id = ?")
            .bind(&assessment_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(response_count as usize, batch.len());
}

#[tokio::test]
async fn unknown_token_is_not_found() {
    let (_dir, pool, _assessment_id) = setup_assessment().await;
    let batch = full_batch(&pool, "cust-a", 3).await;

    let result = tokens::redeem_token(
        &pool,
        ScaleConfig::default(),
        "doesnotexistdoesnotexistdoesnot1",
        &batch,
    )
    .await;
    assert!(matches!(result, Err(Error::TokenNotFound)));
}

#[tokio::test]
async fn incomplete_batch_writes_nothing() {
    let (_dir, pool, assessment_id) = setup_assessment().await;
    let issued = tokens::issue_tokens(
        &pool,
        &assessment_id,
        "unit-a",
        TokenCounts::for_unit(1, false),
    )
    .await
    .unwrap();
    let token = issued[0].token.clone();

    let mut batch = full_batch(&pool, "cust-a", 3).await;
    batch.pop();

    let result = tokens::redeem_token(&pool, ScaleConfig::default(), &token, &batch).await;
    assert!(matches!(result, Err(Error::IncompleteSubmission(_))));

    // Nothing partial became observable: token unused, no responses
    let is_used: i64 = sqlx::query_scalar("SELECT is_used FROM tokens WHERE token = ?")
        .bind(&token)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(is_used, 0);

    let response_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM responses WHERE assessment_id = ?")
            .bind(&assessment_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(response_count, 0);
}

#[tokio::test]
async fn out_of_range_score_is_rejected() {
    let (_dir, pool, assessment_id) = setup_assessment().await;
    let issued = tokens::issue_tokens(
        &pool,
        &assessment_id,
        "unit-a",
        TokenCounts::for_unit(1, false),
    )
    .await
    .unwrap();
    let token = issued[0].token.clone();

    let mut batch = full_batch(&pool, "cust-a", 3).await;
    batch[0].score = 9;

    let result = tokens::redeem_token(&pool, ScaleConfig::default(), &token, &batch).await;
    assert!(matches!(result, Err(Error::ScoreOutOfRange(_))));
}

#[tokio::test]
async fn duplicate_question_in_batch_is_rejected() {
    let (_dir, pool, assessment_id) = setup_assessment().await;
    let issued = tokens::issue_tokens(
        &pool,
        &assessment_id,
        "unit-a",
        TokenCounts::for_unit(1, false),
    )
    .await
    .unwrap();
    let token = issued[0].token.clone();

    let mut batch = full_batch(&pool, "cust-a", 3).await;
    let duplicate = ScoreEntry {
        question_id: batch[0].question_id.clone(),
        score: 4,
        comment: None,
    };
    batch.pop();
    batch.push(duplicate);

    let result = tokens::redeem_token(&pool, ScaleConfig::default(), &token, &batch).await;
    assert!(matches!(result, Err(Error::BadRequest(_))));
}

#[tokio::test]
async fn cancelled_assessment_rejects_redemption() {
    let (_dir, pool, assessment_id) = setup_assessment().await;
    let issued = tokens::issue_tokens(
        &pool,
        &assessment_id,
        "unit-a",
        TokenCounts::for_unit(1, false),
    )
    .await
    .unwrap();
    let token = issued[0].token.clone();

    sqlx::query("UPDATE assessments SET status = 'cancelled' WHERE id = ?")
        .bind(&assessment_id)
        .execute(&pool)
        .await
        .unwrap();

    let batch = full_batch(&pool, "cust-a", 3).await;
    let result = tokens::redeem_token(&pool, ScaleConfig::default(), &token, &batch).await;
    assert!(matches!(result, Err(Error::AssessmentClosed(_))));
}

#[tokio::test]
async fn respondent_counts_come_from_tokens_only() {
    let (_dir, pool, assessment_id) = setup_assessment().await;
    let issued = tokens::issue_tokens(
        &pool,
        &assessment_id,
        "unit-a",
        TokenCounts::for_unit(3, false),
    )
    .await
    .unwrap();

    let batch = full_batch(&pool, "cust-a", 4).await;
    tokens::redeem_token(&pool, ScaleConfig::default(), &issued[0].token, &batch)
        .await
        .unwrap();

    let counts = tokens::respondent_counts(&pool, &assessment_id)
        .await
        .unwrap();
    let employee = counts
        .iter()
        .find(|c| c.category == RespondentCategory::Employee)
        .unwrap();
    assert_eq!(employee.used, 1);
    assert_eq!(employee.total, 3);
}
