//! Questionnaires, questionnaire banks, and their scheduling rules.
//!
//! A bank bundles instruments with relative offsets measured from the user's
//! trigger date. Recur rules expand recurring banks into iterations. All
//! deltas inside a recur must stay associative, so month-based periods are
//! rejected there at registration time.

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};

use super::error::Error;
use super::protocol::ProtocolId;

/// Identifier for a questionnaire bank.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(transparent)]
pub struct QuestionnaireBankId(i64);

impl QuestionnaireBankId {
    /// Wrap a raw bank identifier.
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Underlying integer value.
    pub const fn value(self) -> i64 {
        self.0
    }
}

/// Identifier for an intervention application.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(transparent)]
pub struct InterventionId(i64);

impl InterventionId {
    /// Wrap a raw intervention identifier.
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Underlying integer value.
    pub const fn value(self) -> i64 {
        self.0
    }
}

/// Named instrument referenced by banks and responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Questionnaire {
    pub id: i64,
    /// Unique instrument name, e.g. `epic26_v3`.
    pub name: String,
    #[serde(default)]
    pub identifiers: Vec<super::identity::Identifier>,
}

/// Relative period applied to an instant.
///
/// Serialised as `{"days": 90}`-style JSON. Months are calendar-dependent
/// and therefore non-associative; [`Recur`] validation rejects them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(deny_unknown_fields)]
pub struct RelativeDelta {
    #[serde(default, skip_serializing_if = "is_zero_i32")]
    pub years: i32,
    #[serde(default, skip_serializing_if = "is_zero_i32")]
    pub months: i32,
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub weeks: i64,
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub days: i64,
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub hours: i64,
}

fn is_zero_i32(v: &i32) -> bool {
    *v == 0
}

fn is_zero_i64(v: &i64) -> bool {
    *v == 0
}

impl RelativeDelta {
    /// Delta of whole days.
    pub const fn days(days: i64) -> Self {
        Self {
            years: 0,
            months: 0,
            weeks: 0,
            days,
            hours: 0,
        }
    }

    /// True when every component is zero.
    pub const fn is_zero(&self) -> bool {
        self.years == 0 && self.months == 0 && self.weeks == 0 && self.days == 0 && self.hours == 0
    }

    /// True when the delta uses calendar months (directly or via years).
    /// Year components stay associative because every step lands on the same
    /// month/day; bare month components do not.
    pub const fn uses_months(&self) -> bool {
        self.months != 0
    }

    /// Apply the delta to `base`. Calendar components (years, months) apply
    /// first, then the fixed-length components.
    pub fn apply(&self, base: DateTime<Utc>) -> DateTime<Utc> {
        let total_months = self.years * 12 + self.months;
        let shifted = if total_months >= 0 {
            base.checked_add_months(Months::new(total_months.unsigned_abs()))
        } else {
            base.checked_sub_months(Months::new(total_months.unsigned_abs()))
        }
        .unwrap_or(base);
        shifted + Duration::weeks(self.weeks) + Duration::days(self.days) + Duration::hours(self.hours)
    }

    /// Apply the delta `n` times, used to space recurring iterations.
    pub fn apply_n(&self, base: DateTime<Utc>, n: u32) -> DateTime<Utc> {
        let mut at = base;
        for _ in 0..n {
            at = self.apply(at);
        }
        at
    }
}

/// Bank classification, ordered for tie-breaking overlapping windows.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Baseline,
    Recurring,
    Indefinite,
    Followup,
}

impl Classification {
    /// Tie-break rank: baseline < recurring < indefinite < followup.
    pub const fn rank(self) -> u8 {
        match self {
            Self::Baseline => 0,
            Self::Recurring => 1,
            Self::Indefinite => 2,
            Self::Followup => 3,
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Baseline => "baseline",
            Self::Recurring => "recurring",
            Self::Indefinite => "indefinite",
            Self::Followup => "followup",
        };
        f.write_str(label)
    }
}

/// Rule expanding a recurring bank into iterations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Recur {
    /// Offset of the first iteration from the trigger date.
    pub start: RelativeDelta,
    /// Spacing between iterations.
    pub cycle_length: RelativeDelta,
    /// Offset from the trigger date after which no iteration starts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination: Option<RelativeDelta>,
}

impl Recur {
    /// Reject recur rules whose periods are not associative.
    pub fn validate(&self) -> Result<(), Error> {
        if self.cycle_length.is_zero() {
            return Err(Error::invalid_request("recur cycle_length must be non-zero"));
        }
        for (field, delta) in [
            ("start", &self.start),
            ("cycle_length", &self.cycle_length),
        ] {
            if delta.uses_months() {
                return Err(Error::invalid_request(format!(
                    "recur {field} may not use months; use days, weeks or years"
                )));
            }
        }
        if self.termination.as_ref().is_some_and(RelativeDelta::uses_months) {
            return Err(Error::invalid_request(
                "recur termination may not use months; use days, weeks or years",
            ));
        }
        Ok(())
    }
}

/// Instrument slot within a bank, ordered by rank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct QbQuestionnaire {
    pub rank: u32,
    pub questionnaire_name: String,
}

/// Classified bundle of questionnaires with relative scheduling offsets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionnaireBank {
    pub id: QuestionnaireBankId,
    pub name: String,
    pub classification: Classification,
    /// Exactly one of `research_protocol_id` and `intervention_id` is set.
    pub research_protocol_id: Option<ProtocolId>,
    pub intervention_id: Option<InterventionId>,
    pub start: RelativeDelta,
    pub due: RelativeDelta,
    pub overdue: RelativeDelta,
    pub expired: RelativeDelta,
    #[serde(default)]
    pub recurs: Vec<Recur>,
    pub questionnaires: Vec<QbQuestionnaire>,
}

impl QuestionnaireBank {
    /// Validate registration invariants: the protocol/intervention XOR,
    /// instrument uniqueness, rank uniqueness, and recur associativity.
    pub fn validate(&self) -> Result<(), Error> {
        match (self.research_protocol_id, self.intervention_id) {
            (Some(_), Some(_)) => {
                return Err(Error::invalid_request(
                    "questionnaire bank may not reference both a research protocol and an intervention",
                ));
            }
            (None, None) => {
                return Err(Error::invalid_request(
                    "questionnaire bank must reference a research protocol or an intervention",
                ));
            }
            _ => {}
        }
        if self.questionnaires.is_empty() {
            return Err(Error::invalid_request(
                "questionnaire bank must list at least one questionnaire",
            ));
        }
        let mut ranks: Vec<u32> = self.questionnaires.iter().map(|q| q.rank).collect();
        ranks.sort_unstable();
        ranks.dedup();
        if ranks.len() != self.questionnaires.len() {
            return Err(Error::conflict("duplicate rank within questionnaire bank"));
        }
        let mut names: Vec<&str> = self
            .questionnaires
            .iter()
            .map(|q| q.questionnaire_name.as_str())
            .collect();
        names.sort_unstable();
        names.dedup();
        if names.len() != self.questionnaires.len() {
            return Err(Error::conflict(
                "duplicate questionnaire within questionnaire bank",
            ));
        }
        if self.classification == Classification::Recurring && self.recurs.is_empty() {
            return Err(Error::invalid_request(
                "recurring questionnaire bank requires at least one recur rule",
            ));
        }
        for recur in &self.recurs {
            recur.validate()?;
        }
        Ok(())
    }

    /// Instrument names in rank order.
    pub fn instrument_names(&self) -> Vec<&str> {
        let mut slots: Vec<&QbQuestionnaire> = self.questionnaires.iter().collect();
        slots.sort_by_key(|q| q.rank);
        slots.iter().map(|q| q.questionnaire_name.as_str()).collect()
    }
}
