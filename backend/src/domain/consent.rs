//! User consent records, the anchor for consent-driven scheduling.
//!
//! At most one consent per (user, organization, study) is active at a time.
//! Withdrawal never deletes the row; it records a suspension so the original
//! acceptance date stays available for audit and backdated queries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::Error;
use super::identity::UserId;
use super::organization::OrganizationId;

/// Identifier for a research study.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(transparent)]
pub struct StudyId(i64);

impl StudyId {
    /// Wrap a raw study identifier.
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Underlying integer value.
    pub const fn value(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for StudyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bitmask of consent options granted at acceptance time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(transparent)]
pub struct ConsentOptions(u32);

impl ConsentOptions {
    pub const INCLUDE_IN_REPORTS: u32 = 1;
    pub const SEND_REMINDERS: u32 = 1 << 1;
    pub const SHARE_WITH_RESEARCHERS: u32 = 1 << 2;
    pub const STAFF_EDITABLE: u32 = 1 << 3;

    /// Build from a raw bitmask.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bitmask value.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Default option set for a newly accepted consent.
    pub const fn standard() -> Self {
        Self(Self::INCLUDE_IN_REPORTS | Self::SEND_REMINDERS | Self::STAFF_EDITABLE)
    }

    /// True when the given flag bit is set.
    pub const fn has(self, flag: u32) -> bool {
        self.0 & flag != 0
    }

    /// Reminder emission is only allowed when this option is set.
    pub const fn send_reminders(self) -> bool {
        self.has(Self::SEND_REMINDERS)
    }
}

/// Lifecycle of a consent row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConsentStatus {
    /// In force.
    Consented,
    /// Withdrawn by the user; scheduling stops at the suspension instant.
    Suspended,
    /// Deactivated by staff; superseded by a newer row.
    Deleted,
}

/// Consent of one user to one organization for one research study.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserConsent {
    pub id: i64,
    pub user_id: UserId,
    pub organization_id: OrganizationId,
    pub study_id: StudyId,
    pub acceptance_date: DateTime<Utc>,
    pub options: ConsentOptions,
    pub agreement_url: String,
    pub status: ConsentStatus,
    /// Instant of withdrawal when status is [`ConsentStatus::Suspended`].
    pub suspended_at: Option<DateTime<Utc>>,
    /// Actor who deactivated the row, recorded instead of removing it.
    pub deleted_by: Option<UserId>,
}

impl UserConsent {
    /// Accept a consent effective at `acceptance_date`.
    pub fn accept(
        user_id: UserId,
        organization_id: OrganizationId,
        study_id: StudyId,
        acceptance_date: DateTime<Utc>,
        options: ConsentOptions,
        agreement_url: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            user_id,
            organization_id,
            study_id,
            acceptance_date,
            options,
            agreement_url: agreement_url.into(),
            status: ConsentStatus::Consented,
            suspended_at: None,
            deleted_by: None,
        }
    }

    /// True while the consent governs scheduling.
    pub fn is_active(&self) -> bool {
        self.status == ConsentStatus::Consented
    }

    /// Withdraw the consent at `at`. The row stays for audit; the suspension
    /// instant marks where the timeline stops.
    pub fn withdraw(&mut self, at: DateTime<Utc>) -> Result<(), Error> {
        if self.status != ConsentStatus::Consented {
            return Err(Error::conflict("consent is not active"));
        }
        self.status = ConsentStatus::Suspended;
        self.suspended_at = Some(at);
        Ok(())
    }

    /// Deactivate in favour of a replacement row, recording who did it.
    pub fn deactivate(&mut self, by: UserId) -> Result<(), Error> {
        if self.status == ConsentStatus::Deleted {
            return Err(Error::conflict("consent is already deactivated"));
        }
        self.status = ConsentStatus::Deleted;
        self.deleted_by = Some(by);
        Ok(())
    }
}
