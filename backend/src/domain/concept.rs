//! Coded clinical concepts and the code sets that drive scheduling.
//!
//! A [`Concept`] is one coding from a terminology system; a
//! [`CodeableConcept`] is the FHIR-like wrapper carrying free text plus any
//! number of codings. The treatment code sets below decide whether a
//! procedure marks treatment as started and whether it moves the user's
//! trigger date.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Terminology system URI for the portal's own clinical codes.
pub const CLINICAL_SYSTEM: &str = "urn:portal:clinical-codes";

/// Single coding from a terminology system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Concept {
    pub system: String,
    pub code: String,
    pub display: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<Value>,
}

impl Concept {
    /// Concept in the portal's clinical system.
    pub fn clinical(code: impl Into<String>, display: impl Into<String>) -> Self {
        Self {
            system: CLINICAL_SYSTEM.to_owned(),
            code: code.into(),
            display: display.into(),
            extension: None,
        }
    }
}

/// Free-text wrapper around zero or more codings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CodeableConcept {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default)]
    pub codings: Vec<Concept>,
}

impl CodeableConcept {
    /// Wrap a single coding without free text.
    pub fn from_concept(concept: Concept) -> Self {
        Self {
            text: None,
            codings: vec![concept],
        }
    }

    /// True when any coding in the portal's clinical system carries `code`.
    pub fn has_clinical_code(&self, code: &str) -> bool {
        self.codings
            .iter()
            .any(|c| c.system == CLINICAL_SYSTEM && c.code == code)
    }
}

/// Biopsy observation code; its issued datetime anchors intervention-driven
/// questionnaire banks.
pub const BIOPSY: &str = "biopsy";

/// Procedure codes meaning treatment has begun and the trigger date moves to
/// the latest such procedure (recurring banks only).
pub const TX_RADICAL_PROSTATECTOMY_NERVE_SPARING: &str = "radical-prostatectomy-nerve-sparing";
pub const TX_RADICAL_PROSTATECTOMY: &str = "radical-prostatectomy";
pub const TX_EXTERNAL_BEAM_RADIATION: &str = "external-beam-radiation-therapy";
pub const TX_BRACHYTHERAPY: &str = "brachytherapy";
pub const TX_ANDROGEN_DEPRIVATION_CHEMICAL: &str = "androgen-deprivation-therapy";
pub const TX_SURGICAL_ORCHIECTOMY: &str = "surgical-orchiectomy";
pub const TX_FOCAL_THERAPY: &str = "focal-therapy";
pub const TX_WHOLE_GLAND_ABLATION: &str = "whole-gland-ablation";
pub const TX_FOCAL_GLAND_ABLATION: &str = "focal-gland-ablation";

/// Placeholder codes: treatment counts as started for eligibility, but the
/// trigger date does not move.
pub const TX_OTHER_PROCEDURE: &str = "other-procedure-on-prostate";
pub const TX_OTHER_PRIMARY_TREATMENT: &str = "other-primary-treatment";

/// Procedure codes meaning the user is eligible but treatment has not begun.
pub const NTX_WATCHFUL_WAITING: &str = "watchful-waiting";
pub const NTX_ACTIVE_SURVEILLANCE: &str = "active-surveillance";
pub const NTX_NONE_OF_THE_ABOVE: &str = "none-of-the-above";

const TREATMENT_STARTED: &[&str] = &[
    TX_RADICAL_PROSTATECTOMY_NERVE_SPARING,
    TX_RADICAL_PROSTATECTOMY,
    TX_EXTERNAL_BEAM_RADIATION,
    TX_BRACHYTHERAPY,
    TX_ANDROGEN_DEPRIVATION_CHEMICAL,
    TX_SURGICAL_ORCHIECTOMY,
    TX_FOCAL_THERAPY,
    TX_WHOLE_GLAND_ABLATION,
    TX_FOCAL_GLAND_ABLATION,
    TX_OTHER_PROCEDURE,
    TX_OTHER_PRIMARY_TREATMENT,
];

const TREATMENT_NOT_STARTED: &[&str] = &[
    NTX_WATCHFUL_WAITING,
    NTX_ACTIVE_SURVEILLANCE,
    NTX_NONE_OF_THE_ABOVE,
];

/// True when the code marks treatment as started.
pub fn is_treatment_started(code: &str) -> bool {
    TREATMENT_STARTED.contains(&code)
}

/// True when a started-treatment code also moves the trigger date. The two
/// placeholder codes count as started without advancing it.
pub fn advances_trigger(code: &str) -> bool {
    is_treatment_started(code)
        && code != TX_OTHER_PROCEDURE
        && code != TX_OTHER_PRIMARY_TREATMENT
}

/// True when the code marks the user eligible with treatment not yet begun.
pub fn is_treatment_not_started(code: &str) -> bool {
    TREATMENT_NOT_STARTED.contains(&code)
}
