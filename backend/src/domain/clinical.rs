//! Clinical events recorded against a user.
//!
//! Observations carry coded findings (biopsy, diagnosis, localisation) with
//! an issued instant; procedures carry treatment codes with a start time.
//! Both feed the trigger-date resolver.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::concept::CodeableConcept;
use super::identity::UserId;

/// Coded observation issued for a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub id: i64,
    pub user_id: UserId,
    pub concept: CodeableConcept,
    /// Observation value; `true`/`false` findings arrive as coded strings.
    pub value: Option<String>,
    pub issued: DateTime<Utc>,
}

impl Observation {
    /// True when the observation is a positive finding for `code`.
    pub fn is_positive_for(&self, code: &str) -> bool {
        self.concept.has_clinical_code(code)
            && self.value.as_deref() != Some("false")
    }
}

/// Procedure performed on a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Procedure {
    pub id: i64,
    pub user_id: UserId,
    pub code: CodeableConcept,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub encounter_id: Option<i64>,
}

impl Procedure {
    /// Primary clinical code of the procedure, when coded in the portal's
    /// system.
    pub fn clinical_code(&self) -> Option<&str> {
        self.code
            .codings
            .iter()
            .find(|c| c.system == super::concept::CLINICAL_SYSTEM)
            .map(|c| c.code.as_str())
    }
}
