//! Production adapters for the collaborator ports
//!
//! `HttpDelivery` hands a dispatch batch to the external delivery service
//! over HTTP. `DbContactDirectory` reads the contacts table (contact CRUD is
//! owned by the admin layer). `LoggingRetention` is the wiring seam for the
//! ops-owned purge job.

use crate::error::{Error, Result};
use crate::ports::{Contact, ContactDirectory, DeliveryPort, DispatchOutcome, PurgeSummary, RetentionJob};
use async_trait::async_trait;
use pejl_common::db::models::Token;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::info;

/// Delivery adapter posting batches to the delivery service
pub struct HttpDelivery {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Serialize)]
struct DispatchRequest<'a> {
    assessment_name: &'a str,
    sender_name: &'a str,
    contacts: &'a [Contact],
    tokens: Vec<&'a str>,
}

impl HttpDelivery {
    pub fn new(endpoint: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }
}

#[async_trait]
impl DeliveryPort for HttpDelivery {
    async fn send_batch(
        &self,
        contacts: &[Contact],
        tokens: &[Token],
        assessment_name: &str,
        sender_name: &str,
    ) -> Result<DispatchOutcome> {
        let request = DispatchRequest {
            assessment_name,
            sender_name,
            contacts,
            tokens: tokens.iter().map(|t| t.token.as_str()).collect(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Delivery(format!("delivery service unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Delivery(format!(
                "delivery service returned {}",
                response.status()
            )));
        }

        let outcome: DispatchOutcome = response
            .json()
            .await
            .map_err(|e| Error::Delivery(format!("malformed delivery response: {}", e)))?;

        Ok(outcome)
    }
}

/// Contact lookup backed by the contacts table
pub struct DbContactDirectory {
    pool: SqlitePool,
}

impl DbContactDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContactDirectory for DbContactDirectory {
    async fn unit_contacts(&self, unit_id: &str) -> Result<Vec<Contact>> {
        let rows: Vec<(Option<String>, Option<String>, Option<String>, i64)> = sqlx::query_as(
            "SELECT name, email, phone, is_leader FROM contacts WHERE unit_id = ? ORDER BY created_at",
        )
        .bind(unit_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(name, email, phone, is_leader)| Contact {
                name,
                email,
                phone,
                is_leader: is_leader != 0,
            })
            .collect())
    }
}

/// Delivery adapter for environments without a delivery service
///
/// Logs the batch instead of dispatching it. Assessments still transition
/// to sent; tokens reach respondents through whatever side channel the
/// deployment uses.
pub struct LogDelivery;

#[async_trait]
impl DeliveryPort for LogDelivery {
    async fn send_batch(
        &self,
        contacts: &[Contact],
        tokens: &[Token],
        assessment_name: &str,
        sender_name: &str,
    ) -> Result<DispatchOutcome> {
        info!(
            "Delivery disabled: would dispatch {} token(s) for '{}' from '{}' to {} contact(s)",
            tokens.len(),
            assessment_name,
            sender_name,
            contacts.len()
        );
        Ok(DispatchOutcome::default())
    }
}

/// Placeholder retention adapter
///
/// The purge job itself (and its 90/365-day windows) belongs to the ops
/// collaborator; this adapter only logs the invocation so the scheduling
/// contract is observable before the real job is wired in.
pub struct LoggingRetention;

#[async_trait]
impl RetentionJob for LoggingRetention {
    async fn purge_expired(&self) -> Result<PurgeSummary> {
        info!("Retention callback invoked (no-op adapter)");
        Ok(PurgeSummary::default())
    }
}
