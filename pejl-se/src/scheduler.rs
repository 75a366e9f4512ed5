//! Background scheduler
//!
//! One long-lived scan loop per process. Each tick promotes due assessments
//! from scheduled to sent (token issuance, dispatch, status write) and once
//! per calendar day fires the retention callback. The relational store is
//! the sole synchronization point with request-serving work; the scheduler
//! holds no state the database does not.
//!
//! The context is an owned object with explicit start/stop: stop is
//! cooperative, in-flight assessment processing finishes and no new
//! iteration begins afterwards.

use crate::error::Result;
use crate::lifecycle;
use crate::ports::{ContactDirectory, DeliveryPort, RetentionJob};
use crate::tokens::{self, TokenCounts};
use chrono::{DateTime, Timelike, Utc};
use pejl_common::db::models::Assessment;
use pejl_common::db::{get_setting, set_setting};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{error, info, warn};

/// Scheduler configuration, loaded from database settings
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Enable the background loop (default: true)
    pub enabled: bool,

    /// Scan interval in seconds (default: 60s)
    pub interval_secs: u64,

    /// UTC hour at or after which the daily retention callback fires
    pub retention_hour: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 60,
            retention_hour: 3,
        }
    }
}

impl SchedulerConfig {
    /// Load scheduler configuration from database settings
    pub async fn from_database(pool: &SqlitePool) -> Self {
        let mut config = Self::default();

        if let Ok(Some(value)) = get_setting(pool, "scheduler_enabled").await {
            config.enabled = value.to_lowercase() == "true";
        }
        if let Ok(Some(value)) = get_setting(pool, "scheduler_interval_secs").await {
            if let Ok(interval) = value.parse::<u64>() {
                config.interval_secs = interval.max(1);
            }
        }
        if let Ok(Some(value)) = get_setting(pool, "retention_hour").await {
            if let Ok(hour) = value.parse::<u32>() {
                if hour < 24 {
                    config.retention_hour = hour;
                }
            }
        }

        config
    }
}

/// Scheduler context
///
/// Owns the pool, the collaborator ports and the shutdown channel. Replaces
/// ambient module state with an object the process wires up and controls.
pub struct Scheduler {
    pool: SqlitePool,
    delivery: Arc<dyn DeliveryPort>,
    contacts: Arc<dyn ContactDirectory>,
    retention: Arc<dyn RetentionJob>,
    config: SchedulerConfig,
    stop_tx: watch::Sender<bool>,
}

impl Scheduler {
    pub fn new(
        pool: SqlitePool,
        delivery: Arc<dyn DeliveryPort>,
        contacts: Arc<dyn ContactDirectory>,
        retention: Arc<dyn RetentionJob>,
        config: SchedulerConfig,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            pool,
            delivery,
            contacts,
            retention,
            config,
            stop_tx,
        }
    }

    /// Request a graceful stop
    ///
    /// The current scan finishes; no new iteration starts.
    pub fn request_stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Run the scheduler (spawns the background loop)
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let mut stop_rx = self.stop_tx.subscribe();

        tokio::spawn(async move {
            if !self.config.enabled {
                info!("Scheduler disabled by configuration");
                return;
            }

            info!(
                "Scheduler started (interval: {}s, retention hour: {:02}:00 UTC)",
                self.config.interval_secs, self.config.retention_hour
            );

            let mut timer = interval(Duration::from_secs(self.config.interval_secs));
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = timer.tick() => {}
                }
                if *stop_rx.borrow() {
                    break;
                }

                let now = Utc::now();
                if let Err(e) = self.scan_once(now).await {
                    error!("Scheduler scan failed: {}", e);
                }
                if let Err(e) = self.maybe_run_retention(now).await {
                    error!("Retention callback failed: {}", e);
                }
            }

            info!("Scheduler stopped");
        })
    }

    /// Process every due assessment once
    ///
    /// Failures are isolated per assessment: the error is logged and
    /// recorded on the row, and the scan continues with the rest. The
    /// failed assessment stays scheduled and is retried on a later tick.
    pub async fn scan_once(&self, now: DateTime<Utc>) -> Result<usize> {
        let due = lifecycle::due_assessments(&self.pool, now).await?;
        if due.is_empty() {
            return Ok(0);
        }

        info!("Scan found {} due assessment(s)", due.len());
        let mut sent = 0;

        for assessment in due {
            match self.process_assessment(&assessment, now).await {
                Ok(()) => sent += 1,
                Err(e) => {
                    error!("Sending assessment {} failed: {}", assessment.id, e);
                    if let Err(record_err) =
                        lifecycle::record_send_error(&self.pool, &assessment.id, &e.to_string())
                            .await
                    {
                        error!(
                            "Could not record send error for assessment {}: {}",
                            assessment.id, record_err
                        );
                    }
                }
            }
        }

        Ok(sent)
    }

    /// Drive one assessment through the send path
    ///
    /// Token issuance is idempotent, so a retry after a dispatch failure
    /// never doubles respondent slots. The status write to sent happens
    /// only after issuance and dispatch both succeeded.
    async fn process_assessment(&self, assessment: &Assessment, now: DateTime<Utc>) -> Result<()> {
        let (headcount, sender_name) = self.unit_info(&assessment.unit_id).await?;

        let counts = TokenCounts::for_unit(headcount, assessment.include_leader_assessment);
        let issued =
            tokens::issue_tokens(&self.pool, &assessment.id, &assessment.unit_id, counts).await?;

        let contacts = self.contacts.unit_contacts(&assessment.unit_id).await?;
        if contacts.is_empty() {
            // A unit without delivery targets is not an error; the
            // assessment still transitions with zero tokens dispatched
            info!(
                "Unit {} has no contacts, assessment {} sent without dispatch",
                assessment.unit_id, assessment.id
            );
        } else if !issued.is_empty() {
            let outcome = self
                .delivery
                .send_batch(&contacts, &issued, &assessment.name, &sender_name)
                .await?;

            if !outcome.errors.is_empty() {
                // Advisory per contract: partial delivery failures do not
                // block the transition
                warn!(
                    "Dispatch for assessment {} reported {} error(s): {}",
                    assessment.id,
                    outcome.errors.len(),
                    outcome.errors.join("; ")
                );
            }
            info!(
                "Dispatched assessment {} ({} emails, {} sms)",
                assessment.id, outcome.emails_sent, outcome.sms_sent
            );
        }

        lifecycle::mark_sent(&self.pool, &assessment.id, now).await?;
        Ok(())
    }

    async fn unit_info(&self, unit_id: &str) -> Result<(i64, String)> {
        let row: Option<(i64, Option<String>)> = sqlx::query_as(
            r#"
            SELECT u.headcount, c.sender_name
            FROM org_units u
            JOIN customers c ON c.id = u.customer_id
            WHERE u.id = ?
            "#,
        )
        .bind(unit_id)
        .fetch_optional(&self.pool)
        .await?;

        let (headcount, sender_name) = row.ok_or_else(|| {
            crate::error::Error::NotFound(format!("unit {} for due assessment", unit_id))
        })?;

        let sender_name = match sender_name {
            Some(name) if !name.is_empty() => name,
            _ => get_setting(&self.pool, "default_sender_name")
                .await?
                .unwrap_or_else(|| "Pejl".to_string()),
        };

        Ok((headcount, sender_name))
    }

    /// Fire the retention callback at most once per calendar day
    ///
    /// The last-run-date marker lives in the settings table, so overlapping
    /// loop iterations (or a restart within the trigger hour) cannot
    /// re-fire it the same day. Returns true when the callback ran.
    pub async fn maybe_run_retention(&self, now: DateTime<Utc>) -> Result<bool> {
        if now.hour() < self.config.retention_hour {
            return Ok(false);
        }

        let today = now.date_naive().to_string();
        let last_run = get_setting(&self.pool, "retention_last_run_date").await?;
        if last_run.as_deref() == Some(today.as_str()) {
            return Ok(false);
        }

        let summary = self.retention.purge_expired().await?;
        set_setting(&self.pool, "retention_last_run_date", &today).await?;

        info!(
            "Retention callback completed ({} rows purged)",
            summary.rows_purged
        );
        Ok(true)
    }
}
