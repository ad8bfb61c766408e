//! Research protocols and their time-ordered association to organizations.
//!
//! Each organization carries a stack of protocol rows ordered by
//! `retired_as_of`. The row with a null `retired_as_of` is current; the
//! timestamps partition history into epochs. Two unretired rows on one
//! organization is a data-model invariant breach.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::Error;
use super::organization::OrganizationId;

/// Identifier for a research protocol.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(transparent)]
pub struct ProtocolId(i64);

impl ProtocolId {
    /// Wrap a raw protocol identifier.
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Underlying integer value.
    pub const fn value(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable protocol identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ResearchProtocol {
    pub id: ProtocolId,
    pub name: String,
}

/// Association of a protocol to an organization with retirement bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrgProtocolRow {
    pub organization_id: OrganizationId,
    pub protocol_id: ProtocolId,
    /// Null means "current"; a timestamp closes this protocol's epoch.
    pub retired_as_of: Option<DateTime<Utc>>,
}

/// Interval during which one protocol governs an organization.
///
/// Bounds are exclusive per the retirement semantics: a row is in force
/// between the previous row's `retired_as_of` and its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolEpoch {
    pub protocol_id: ProtocolId,
    /// Open start (−∞) when `None`.
    pub from: Option<DateTime<Utc>>,
    /// Open end (+∞) when `None`.
    pub until: Option<DateTime<Utc>>,
}

impl ProtocolEpoch {
    /// True when `at` falls inside this epoch.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.is_none_or(|from| at > from) && self.until.is_none_or(|until| at < until)
    }
}

/// Order an organization's protocol rows into epochs.
///
/// Retired rows sort by their retirement timestamp; the unretired row closes
/// the sequence. Exactly one unretired row is allowed.
pub fn protocol_epochs(rows: &[OrgProtocolRow]) -> Result<Vec<ProtocolEpoch>, Error> {
    let unretired = rows.iter().filter(|r| r.retired_as_of.is_none()).count();
    if unretired > 1 {
        return Err(Error::conflict(
            "organization has more than one unretired research protocol",
        ));
    }

    let mut retired: Vec<&OrgProtocolRow> =
        rows.iter().filter(|r| r.retired_as_of.is_some()).collect();
    retired.sort_by_key(|r| r.retired_as_of);

    let mut epochs = Vec::with_capacity(rows.len());
    let mut previous_boundary: Option<DateTime<Utc>> = None;
    for row in retired {
        epochs.push(ProtocolEpoch {
            protocol_id: row.protocol_id,
            from: previous_boundary,
            until: row.retired_as_of,
        });
        previous_boundary = row.retired_as_of;
    }
    if let Some(current) = rows.iter().find(|r| r.retired_as_of.is_none()) {
        epochs.push(ProtocolEpoch {
            protocol_id: current.protocol_id,
            from: previous_boundary,
            until: None,
        });
    }
    Ok(epochs)
}

/// Protocol in force at `at`, if any.
pub fn in_force_at(epochs: &[ProtocolEpoch], at: DateTime<Utc>) -> Option<ProtocolId> {
    epochs.iter().find(|e| e.contains(at)).map(|e| e.protocol_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn row(protocol: i64, retired: Option<DateTime<Utc>>) -> OrgProtocolRow {
        OrgProtocolRow {
            organization_id: OrganizationId::new(1),
            protocol_id: ProtocolId::new(protocol),
            retired_as_of: retired,
        }
    }

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[rstest]
    fn epochs_partition_history() {
        let rows = vec![
            row(3, None),
            row(2, Some(at(2025, 6, 1))),
            row(1, Some(at(2024, 1, 1))),
        ];
        let epochs = protocol_epochs(&rows).expect("well formed stack");
        assert_eq!(epochs.len(), 3);
        assert_eq!(in_force_at(&epochs, at(2023, 7, 1)), Some(ProtocolId::new(1)));
        assert_eq!(in_force_at(&epochs, at(2024, 7, 1)), Some(ProtocolId::new(2)));
        assert_eq!(in_force_at(&epochs, at(2026, 1, 1)), Some(ProtocolId::new(3)));
    }

    #[rstest]
    fn boundary_instant_belongs_to_neither_epoch_side() {
        let rows = vec![row(2, None), row(1, Some(at(2025, 6, 1)))];
        let epochs = protocol_epochs(&rows).expect("well formed stack");
        // Bounds are exclusive on both sides.
        assert_eq!(in_force_at(&epochs, at(2025, 6, 1)), None);
    }

    #[rstest]
    fn two_unretired_rows_is_fatal() {
        let rows = vec![row(1, None), row(2, None)];
        let err = protocol_epochs(&rows).expect_err("invariant breach");
        assert_eq!(err.code(), crate::domain::ErrorCode::Conflict);
    }

    #[rstest]
    fn retired_only_stack_has_no_current_epoch() {
        let rows = vec![row(1, Some(at(2024, 1, 1)))];
        let epochs = protocol_epochs(&rows).expect("well formed stack");
        assert_eq!(epochs.len(), 1);
        assert_eq!(in_force_at(&epochs, at(2025, 1, 1)), None);
    }
}
