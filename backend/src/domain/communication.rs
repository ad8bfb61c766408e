//! Reminder communications and the requests that schedule them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::identity::UserId;
use super::questionnaire::{QuestionnaireBankId, RelativeDelta};

/// Lifecycle of one reminder communication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CommunicationStatus {
    /// Created; message not yet dispatched.
    Preparation,
    /// Dispatched successfully. At most one per (user, request, iteration).
    Completed,
    /// Superseded by a later request or by completed work.
    Suspended,
}

/// One emitted (or suppressed) reminder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Communication {
    pub id: i64,
    pub user_id: UserId,
    pub request_id: i64,
    pub qb_iteration: u32,
    pub status: CommunicationStatus,
    /// Reference to the materialised message, set once rendered.
    pub message_ref: Option<String>,
}

/// Whether a request currently schedules reminders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Active,
    Retired,
}

/// Reminder schedule attached to one questionnaire bank iteration.
///
/// Unique per (bank, iteration, notify delta).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunicationRequest {
    pub id: i64,
    pub status: RequestStatus,
    /// Offset from the governing row's start after which the reminder fires.
    pub notify_post_qb_start: RelativeDelta,
    pub qb_id: QuestionnaireBankId,
    pub qb_name: String,
    pub qb_iteration: u32,
    #[serde(default)]
    pub identifiers: Vec<super::identity::Identifier>,
    /// Template name resolved through the locale-aware message templates.
    pub template: String,
}

impl CommunicationRequest {
    /// Instant at which this request fires for a row starting at `qb_start`.
    pub fn fires_at(&self, qb_start: DateTime<Utc>) -> DateTime<Utc> {
        self.notify_post_qb_start.apply(qb_start)
    }
}

/// Rendered message handed to the mail collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailMessage {
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub footer: Option<String>,
}
