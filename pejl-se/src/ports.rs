//! Collaborator ports
//!
//! The survey engine consumes three external collaborators at their
//! interfaces only: outbound delivery, contact lookup, and the data
//! retention job. Production adapters live in the delivery module; tests
//! substitute recording fakes.

use crate::error::Result;
use async_trait::async_trait;
use pejl_common::db::models::Token;
use serde::{Deserialize, Serialize};

/// A delivery target within one unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub is_leader: bool,
}

/// Result of one dispatch batch
///
/// Non-empty `errors` is advisory: individual undeliverable contacts do not
/// block the sent transition. Only a hard `Err` from the port does.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub emails_sent: u64,
    pub sms_sent: u64,
    pub errors: Vec<String>,
}

/// Outbound email/SMS delivery collaborator
#[async_trait]
pub trait DeliveryPort: Send + Sync {
    async fn send_batch(
        &self,
        contacts: &[Contact],
        tokens: &[Token],
        assessment_name: &str,
        sender_name: &str,
    ) -> Result<DispatchOutcome>;
}

/// Contact lookup collaborator
///
/// An empty list is a valid, non-error outcome: the unit simply has no
/// delivery targets.
#[async_trait]
pub trait ContactDirectory: Send + Sync {
    async fn unit_contacts(&self, unit_id: &str) -> Result<Vec<Contact>>;
}

/// Summary returned by the retention collaborator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PurgeSummary {
    pub rows_purged: u64,
}

/// Periodic data-retention callback
///
/// Invoked at most once per calendar day by the scheduler. Retention
/// windows are configuration owned by the collaborator, not by this core.
#[async_trait]
pub trait RetentionJob: Send + Sync {
    async fn purge_expired(&self) -> Result<PurgeSummary>;
}
