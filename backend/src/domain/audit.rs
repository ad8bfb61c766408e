//! Append-only audit records for state-changing actions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::identity::UserId;

/// Context classifying what kind of action an audit entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuditContext {
    Login,
    Assessment,
    Authentication,
    Intervention,
    Account,
    Consent,
    User,
    Observation,
    Organization,
    Group,
    Procedure,
    Relationship,
    Role,
    Tou,
    Access,
    Other,
}

/// One append-only audit entry keyed by actor, subject, and context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Audit {
    pub id: i64,
    pub actor_user_id: UserId,
    pub subject_user_id: UserId,
    pub context: AuditContext,
    /// Code version recorded at write time.
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub comment: Option<String>,
}

impl Audit {
    /// Build an entry stamped with the running crate version.
    pub fn record(
        actor: UserId,
        subject: UserId,
        context: AuditContext,
        timestamp: DateTime<Utc>,
        comment: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            actor_user_id: actor,
            subject_user_id: subject,
            context,
            version: env!("CARGO_PKG_VERSION").to_owned(),
            timestamp,
            comment: Some(comment.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    #[rstest]
    fn record_stamps_crate_version() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let audit = Audit::record(
            UserId::new(1),
            UserId::new(2),
            AuditContext::Consent,
            now,
            "consent withdrawn",
        );
        assert_eq!(audit.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(audit.context, AuditContext::Consent);
        assert_eq!(audit.comment.as_deref(), Some("consent withdrawn"));
    }

    #[rstest]
    fn context_serialises_snake_case() {
        assert_eq!(
            serde_json::to_value(AuditContext::Access).expect("serializes"),
            serde_json::json!("access")
        );
    }
}
