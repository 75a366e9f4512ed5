//! Lifecycle and scheduler integration tests
//!
//! State-machine transitions, the due-assessment query window, per-tick
//! send processing with failure isolation and retry, and the once-per-day
//! retention guard.

mod common;

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use common::*;
use pejl_common::db::models::Token;
use pejl_common::fields::AssessmentStatus;
use pejl_se::error::{Error, Result};
use pejl_se::lifecycle;
use pejl_se::ports::{Contact, ContactDirectory, DeliveryPort, DispatchOutcome, PurgeSummary, RetentionJob};
use pejl_se::scheduler::{Scheduler, SchedulerConfig};
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Delivery fake: counts calls, optionally fails hard (globally or for one
/// assessment name), optionally reports advisory per-contact errors
#[derive(Default)]
struct RecordingDelivery {
    calls: AtomicUsize,
    fail_hard: AtomicBool,
    fail_for: std::sync::Mutex<Option<String>>,
    advisory_errors: AtomicBool,
}

#[async_trait]
impl DeliveryPort for RecordingDelivery {
    async fn send_batch(
        &self,
        contacts: &[Contact],
        _tokens: &[Token],
        assessment_name: &str,
        _sender_name: &str,
    ) -> Result<DispatchOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let targeted_failure = self
            .fail_for
            .lock()
            .unwrap()
            .as_deref()
            .map(|name| name == assessment_name)
            .unwrap_or(false);
        if self.fail_hard.load(Ordering::SeqCst) || targeted_failure {
            return Err(Error::Delivery("smtp relay unreachable".to_string()));
        }
        let errors = if self.advisory_errors.load(Ordering::SeqCst) {
            vec!["bounced: old@example.com".to_string()]
        } else {
            Vec::new()
        };
        Ok(DispatchOutcome {
            emails_sent: contacts.len() as u64,
            sms_sent: 0,
            errors,
        })
    }
}

struct StaticContacts(Vec<Contact>);

#[async_trait]
impl ContactDirectory for StaticContacts {
    async fn unit_contacts(&self, _unit_id: &str) -> Result<Vec<Contact>> {
        Ok(self.0.clone())
    }
}

#[derive(Default)]
struct CountingRetention {
    runs: AtomicUsize,
}

#[async_trait]
impl RetentionJob for CountingRetention {
    async fn purge_expired(&self) -> Result<PurgeSummary> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(PurgeSummary { rows_purged: 42 })
    }
}

fn some_contacts() -> Vec<Contact> {
    vec![Contact {
        name: Some("Ann".to_string()),
        email: Some("ann@example.com".to_string()),
        phone: None,
        is_leader: false,
    }]
}

fn make_scheduler(
    pool: &SqlitePool,
    delivery: Arc<RecordingDelivery>,
    contacts: Vec<Contact>,
    retention: Arc<CountingRetention>,
) -> Scheduler {
    Scheduler::new(
        pool.clone(),
        delivery,
        Arc::new(StaticContacts(contacts)),
        retention,
        SchedulerConfig::default(),
    )
}

#[tokio::test]
async fn due_query_honors_time_window_and_status() {
    let (_dir, pool) = setup_db().await;
    seed_customer(&pool, "cust-a", "Acme").await;
    seed_unit(&pool, "unit-a", "cust-a", 4).await;

    let now = Utc::now();

    let overdue = create_assessment(&pool, "cust-a", "unit-a", "overdue").await;
    force_schedule(&pool, &overdue, now - Duration::hours(1)).await;

    let future = create_assessment(&pool, "cust-a", "unit-a", "future").await;
    force_schedule(&pool, &future, now + Duration::days(1)).await;

    let already_sent = create_assessment(&pool, "cust-a", "unit-a", "sent").await;
    force_schedule(&pool, &already_sent, now - Duration::days(2)).await;
    lifecycle::mark_sent(&pool, &already_sent, now - Duration::days(1))
        .await
        .unwrap();

    let due = lifecycle::due_assessments(&pool, now).await.unwrap();
    let ids: Vec<&str> = due.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec![overdue.as_str()]);
}

#[tokio::test]
async fn schedule_requires_future_timestamp() {
    let (_dir, pool) = setup_db().await;
    seed_customer(&pool, "cust-a", "Acme").await;
    seed_unit(&pool, "unit-a", "cust-a", 4).await;
    let id = create_assessment(&pool, "cust-a", "unit-a", "pulse").await;

    let now = Utc::now();
    let result =
        lifecycle::schedule_assessment(&pool, "cust-a", &id, now - Duration::minutes(5), now).await;
    assert!(matches!(result, Err(Error::BadRequest(_))));

    let scheduled =
        lifecycle::schedule_assessment(&pool, "cust-a", &id, now + Duration::hours(2), now)
            .await
            .unwrap();
    assert_eq!(scheduled.status, AssessmentStatus::Scheduled);

    // Reschedule while still scheduled is legal
    let rescheduled =
        lifecycle::schedule_assessment(&pool, "cust-a", &id, now + Duration::hours(4), now)
            .await
            .unwrap();
    assert_eq!(
        rescheduled.scheduled_at.unwrap().timestamp(),
        (now + Duration::hours(4)).timestamp()
    );
}

#[tokio::test]
async fn cancel_only_from_scheduled() {
    let (_dir, pool) = setup_db().await;
    seed_customer(&pool, "cust-a", "Acme").await;
    seed_unit(&pool, "unit-a", "cust-a", 4).await;
    let id = create_assessment(&pool, "cust-a", "unit-a", "pulse").await;

    // Draft: no-op
    assert!(!lifecycle::cancel_assessment(&pool, "cust-a", &id).await.unwrap());

    force_schedule(&pool, &id, Utc::now() + Duration::hours(1)).await;
    assert!(lifecycle::cancel_assessment(&pool, "cust-a", &id).await.unwrap());

    // Already cancelled: no-op again
    assert!(!lifecycle::cancel_assessment(&pool, "cust-a", &id).await.unwrap());

    // Unknown id is NotFound, distinguishable from the no-op
    let missing = lifecycle::cancel_assessment(&pool, "cust-a", "no-such-id").await;
    assert!(matches!(missing, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn cancel_rejected_after_sent() {
    let (_dir, pool) = setup_db().await;
    seed_customer(&pool, "cust-a", "Acme").await;
    seed_unit(&pool, "unit-a", "cust-a", 4).await;
    let id = create_assessment(&pool, "cust-a", "unit-a", "pulse").await;

    force_schedule(&pool, &id, Utc::now() - Duration::hours(1)).await;
    lifecycle::mark_sent(&pool, &id, Utc::now()).await.unwrap();

    assert!(!lifecycle::cancel_assessment(&pool, "cust-a", &id).await.unwrap());
    let assessment = lifecycle::get_assessment(&pool, "cust-a", &id).await.unwrap();
    assert_eq!(assessment.status, AssessmentStatus::Sent);
}

#[tokio::test]
async fn scan_sends_due_assessment_and_issues_tokens() {
    let (_dir, pool) = setup_db().await;
    seed_customer(&pool, "cust-a", "Acme").await;
    seed_unit(&pool, "unit-a", "cust-a", 3).await;
    let id = create_assessment(&pool, "cust-a", "unit-a", "pulse").await;
    force_schedule(&pool, &id, Utc::now() - Duration::minutes(10)).await;

    let delivery = Arc::new(RecordingDelivery::default());
    let retention = Arc::new(CountingRetention::default());
    let scheduler = make_scheduler(&pool, delivery.clone(), some_contacts(), retention);

    let sent = scheduler.scan_once(Utc::now()).await.unwrap();
    assert_eq!(sent, 1);
    assert_eq!(delivery.calls.load(Ordering::SeqCst), 1);

    let assessment = lifecycle::get_assessment(&pool, "cust-a", &id).await.unwrap();
    assert_eq!(assessment.status, AssessmentStatus::Sent);
    assert!(assessment.sent_at.is_some());
    assert!(assessment.last_error.is_none());

    // 3 employee + leader pair
    let token_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tokens WHERE assessment_id = ?")
        .bind(&id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(token_count, 5);
}

#[tokio::test]
async fn failed_send_stays_scheduled_and_surfaces_error() {
    let (_dir, pool) = setup_db().await;
    seed_customer(&pool, "cust-a", "Acme").await;
    seed_unit(&pool, "unit-a", "cust-a", 2).await;
    let id = create_assessment(&pool, "cust-a", "unit-a", "pulse").await;
    force_schedule(&pool, &id, Utc::now() - Duration::minutes(10)).await;

    let delivery = Arc::new(RecordingDelivery::default());
    delivery.fail_hard.store(true, Ordering::SeqCst);
    let retention = Arc::new(CountingRetention::default());
    let scheduler = make_scheduler(&pool, delivery.clone(), some_contacts(), retention);

    let sent = scheduler.scan_once(Utc::now()).await.unwrap();
    assert_eq!(sent, 0);

    let assessment = lifecycle::get_assessment(&pool, "cust-a", &id).await.unwrap();
    assert_eq!(assessment.status, AssessmentStatus::Scheduled);
    let last_error = assessment.last_error.expect("send error surfaced");
    assert!(last_error.contains("smtp relay unreachable"));

    // Next tick retries and succeeds without doubling the token slots
    delivery.fail_hard.store(false, Ordering::SeqCst);
    let sent = scheduler.scan_once(Utc::now()).await.unwrap();
    assert_eq!(sent, 1);

    let assessment = lifecycle::get_assessment(&pool, "cust-a", &id).await.unwrap();
    assert_eq!(assessment.status, AssessmentStatus::Sent);
    assert!(assessment.last_error.is_none());

    let token_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tokens WHERE assessment_id = ?")
        .bind(&id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(token_count, 4); // 2 employee + leader pair, issued once
}

#[tokio::test]
async fn one_failure_does_not_block_other_due_assessments() {
    let (_dir, pool) = setup_db().await;
    seed_customer(&pool, "cust-a", "Acme").await;
    seed_unit(&pool, "unit-a", "cust-a", 2).await;
    seed_unit(&pool, "unit-b", "cust-a", 2).await;

    // The broken assessment is due first, so the scan hits its failure
    // before reaching the healthy one
    let broken = create_assessment(&pool, "cust-a", "unit-b", "broken").await;
    force_schedule(&pool, &broken, Utc::now() - Duration::hours(2)).await;
    let healthy = create_assessment(&pool, "cust-a", "unit-a", "healthy").await;
    force_schedule(&pool, &healthy, Utc::now() - Duration::hours(1)).await;

    let delivery = Arc::new(RecordingDelivery::default());
    *delivery.fail_for.lock().unwrap() = Some("broken".to_string());
    let retention = Arc::new(CountingRetention::default());
    let scheduler = make_scheduler(&pool, delivery.clone(), some_contacts(), retention);

    let sent = scheduler.scan_once(Utc::now()).await.unwrap();
    assert_eq!(sent, 1);
    assert_eq!(delivery.calls.load(Ordering::SeqCst), 2);

    let broken_row = lifecycle::get_assessment(&pool, "cust-a", &broken).await.unwrap();
    assert_eq!(broken_row.status, AssessmentStatus::Scheduled);
    assert!(broken_row.last_error.is_some());

    let healthy_row = lifecycle::get_assessment(&pool, "cust-a", &healthy).await.unwrap();
    assert_eq!(healthy_row.status, AssessmentStatus::Sent);
}

#[tokio::test]
async fn empty_contact_list_still_transitions_to_sent() {
    let (_dir, pool) = setup_db().await;
    seed_customer(&pool, "cust-a", "Acme").await;
    seed_unit(&pool, "unit-a", "cust-a", 2).await;
    let id = create_assessment(&pool, "cust-a", "unit-a", "pulse").await;
    force_schedule(&pool, &id, Utc::now() - Duration::minutes(1)).await;

    let delivery = Arc::new(RecordingDelivery::default());
    let retention = Arc::new(CountingRetention::default());
    let scheduler = make_scheduler(&pool, delivery.clone(), Vec::new(), retention);

    let sent = scheduler.scan_once(Utc::now()).await.unwrap();
    assert_eq!(sent, 1);
    // No dispatch attempted against an empty contact list
    assert_eq!(delivery.calls.load(Ordering::SeqCst), 0);

    let assessment = lifecycle::get_assessment(&pool, "cust-a", &id).await.unwrap();
    assert_eq!(assessment.status, AssessmentStatus::Sent);
}

#[tokio::test]
async fn advisory_delivery_errors_do_not_block_transition() {
    let (_dir, pool) = setup_db().await;
    seed_customer(&pool, "cust-a", "Acme").await;
    seed_unit(&pool, "unit-a", "cust-a", 2).await;
    let id = create_assessment(&pool, "cust-a", "unit-a", "pulse").await;
    force_schedule(&pool, &id, Utc::now() - Duration::minutes(1)).await;

    let delivery = Arc::new(RecordingDelivery::default());
    delivery.advisory_errors.store(true, Ordering::SeqCst);
    let retention = Arc::new(CountingRetention::default());
    let scheduler = make_scheduler(&pool, delivery, some_contacts(), retention);

    let sent = scheduler.scan_once(Utc::now()).await.unwrap();
    assert_eq!(sent, 1);

    let assessment = lifecycle::get_assessment(&pool, "cust-a", &id).await.unwrap();
    assert_eq!(assessment.status, AssessmentStatus::Sent);
}

#[tokio::test]
async fn retention_fires_at_most_once_per_day() {
    let (_dir, pool) = setup_db().await;

    let delivery = Arc::new(RecordingDelivery::default());
    let retention = Arc::new(CountingRetention::default());
    let scheduler = make_scheduler(&pool, delivery, Vec::new(), retention.clone());

    // Before the trigger hour: nothing fires
    let early = Utc.with_ymd_and_hms(2026, 8, 6, 1, 0, 0).unwrap();
    assert!(!scheduler.maybe_run_retention(early).await.unwrap());

    // At the trigger hour: fires once
    let morning = Utc.with_ymd_and_hms(2026, 8, 6, 3, 5, 0).unwrap();
    assert!(scheduler.maybe_run_retention(morning).await.unwrap());

    // Later the same day: guarded by the last-run-date marker
    let later = Utc.with_ymd_and_hms(2026, 8, 6, 15, 0, 0).unwrap();
    assert!(!scheduler.maybe_run_retention(later).await.unwrap());
    assert_eq!(retention.runs.load(Ordering::SeqCst), 1);

    // Next day: fires again
    let next_day = Utc.with_ymd_and_hms(2026, 8, 7, 3, 5, 0).unwrap();
    assert!(scheduler.maybe_run_retention(next_day).await.unwrap());
    assert_eq!(retention.runs.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn scheduler_stops_cooperatively() {
    let (_dir, pool) = setup_db().await;

    let delivery = Arc::new(RecordingDelivery::default());
    let retention = Arc::new(CountingRetention::default());
    let scheduler = Arc::new(make_scheduler(&pool, delivery, Vec::new(), retention));

    let handle = scheduler.clone().start();
    scheduler.request_stop();

    // The loop must exit promptly once stop is requested
    tokio::time::timeout(std::time::Duration::from_secs(5), handle)
        .await
        .expect("scheduler loop exited")
        .expect("scheduler task completed");
}
