//! Database models

use crate::fields::{AssessmentStatus, Field, RespondentCategory};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub sender_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgUnit {
    pub id: String,
    pub customer_id: String,
    pub parent_id: Option<String>,
    pub name: String,
    pub path: String,
    pub depth: i64,
    pub headcount: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub customer_id: Option<String>,
    pub field: Field,
    pub text: String,
    pub reverse_scored: bool,
    pub sequence: i64,
    pub is_default: bool,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assessment {
    pub id: String,
    pub customer_id: String,
    pub unit_id: String,
    pub name: String,
    pub period: Option<String>,
    pub status: AssessmentStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub include_leader_assessment: bool,
    pub min_responses: i64,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub token: String,
    pub assessment_id: String,
    pub unit_id: String,
    pub respondent_category: RespondentCategory,
    pub is_used: bool,
    pub used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseRow {
    pub id: i64,
    pub assessment_id: String,
    pub unit_id: String,
    pub question_id: String,
    pub respondent_category: RespondentCategory,
    pub score: i64,
    pub comment: Option<String>,
}
