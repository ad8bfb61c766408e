//! Questionnaire responses and the bank references that own them.
//!
//! A response is owned by exactly one scheduled bank instance, addressed by
//! (bank name, iteration, protocol). The `authored` instant orders responses
//! and bounds completion queries for as-of reporting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::identity::UserId;
use super::protocol::ProtocolId;

/// Lifecycle of a questionnaire response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum QnrStatus {
    InProgress,
    Completed,
}

/// Address of one scheduled bank instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
pub struct QnrBankRef {
    pub bank_name: String,
    pub iteration: u32,
    pub protocol_id: Option<ProtocolId>,
}

/// Patient-reported outcome document for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionnaireResponse {
    pub id: i64,
    pub user_id: UserId,
    pub bank_ref: QnrBankRef,
    pub questionnaire_name: String,
    pub authored: DateTime<Utc>,
    pub status: QnrStatus,
    pub document: Value,
}

impl QuestionnaireResponse {
    /// True when this response counts as completed work at `as_of`.
    pub fn completed_by(&self, as_of: DateTime<Utc>) -> bool {
        self.status == QnrStatus::Completed && self.authored <= as_of
    }
}
