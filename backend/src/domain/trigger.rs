//! Trigger-date resolution: the instant a user's relative offsets measure
//! from, per research study.
//!
//! Consent-driven studies anchor on the active consent's acceptance date.
//! Intervention-driven banks anchor on the earliest positive biopsy
//! observation. A treatment-started procedure moves the anchor forward to the
//! latest such procedure, but only for recurring banks, and never for the
//! placeholder codes.

use chrono::{DateTime, Utc};

use super::clinical::{Observation, Procedure};
use super::concept::{self, BIOPSY};
use super::consent::UserConsent;
use super::questionnaire::{Classification, QuestionnaireBank};

/// Resolved trigger anchor for one (user, study).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerDate {
    /// Consent or biopsy anchor.
    pub base: DateTime<Utc>,
    /// Latest treatment-started procedure start, when one moves the anchor.
    pub advanced: Option<DateTime<Utc>>,
    /// Any treatment-started code seen, including the placeholders.
    pub treatment_started: bool,
    /// A treatment-not-started code marks eligibility without moving dates.
    pub eligible: bool,
}

impl TriggerDate {
    /// Anchor instant for one bank: recurring banks follow the treatment
    /// date when present, all others stay on the base anchor.
    pub fn for_bank(&self, bank: &QuestionnaireBank) -> DateTime<Utc> {
        if bank.classification == Classification::Recurring {
            self.advanced.unwrap_or(self.base)
        } else {
            self.base
        }
    }
}

/// Resolve the trigger for a consent-driven study.
///
/// `consent` must be the user's active consent for the study's top-level
/// organization. Returns `None` without one, which yields an empty timeline.
pub fn resolve_consent_trigger(
    consent: Option<&UserConsent>,
    procedures: &[Procedure],
) -> Option<TriggerDate> {
    let consent = consent.filter(|c| c.is_active() || c.suspended_at.is_some())?;
    Some(apply_procedures(consent.acceptance_date, procedures))
}

/// Resolve the trigger for intervention-driven banks: earliest positive
/// biopsy observation.
pub fn resolve_intervention_trigger(
    observations: &[Observation],
    procedures: &[Procedure],
) -> Option<TriggerDate> {
    let earliest_biopsy = observations
        .iter()
        .filter(|o| o.is_positive_for(BIOPSY))
        .map(|o| o.issued)
        .min()?;
    Some(apply_procedures(earliest_biopsy, procedures))
}

fn apply_procedures(base: DateTime<Utc>, procedures: &[Procedure]) -> TriggerDate {
    let mut advanced: Option<DateTime<Utc>> = None;
    let mut treatment_started = false;
    let mut eligible = false;
    for procedure in procedures {
        let Some(code) = procedure.clinical_code() else {
            continue;
        };
        if concept::is_treatment_started(code) {
            treatment_started = true;
            eligible = true;
            if concept::advances_trigger(code) {
                advanced = Some(match advanced {
                    Some(current) => current.max(procedure.start_time),
                    None => procedure.start_time,
                });
            }
        } else if concept::is_treatment_not_started(code) {
            eligible = true;
        }
    }
    TriggerDate {
        base,
        advanced,
        treatment_started,
        eligible,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::concept::{
        Concept, CodeableConcept, NTX_ACTIVE_SURVEILLANCE, TX_BRACHYTHERAPY, TX_OTHER_PROCEDURE,
        TX_RADICAL_PROSTATECTOMY,
    };
    use crate::domain::consent::{ConsentOptions, StudyId};
    use crate::domain::identity::UserId;
    use crate::domain::organization::OrganizationId;
    use crate::domain::protocol::ProtocolId;
    use crate::domain::questionnaire::{
        QbQuestionnaire, QuestionnaireBank, QuestionnaireBankId, Recur, RelativeDelta,
    };
    use chrono::TimeZone;
    use rstest::rstest;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn consent(accepted: DateTime<Utc>) -> UserConsent {
        UserConsent::accept(
            UserId::new(1),
            OrganizationId::new(1),
            StudyId::new(0),
            accepted,
            ConsentOptions::standard(),
            "https://portal.example/agreement",
        )
    }

    fn procedure(code: &str, start: DateTime<Utc>) -> Procedure {
        Procedure {
            id: 0,
            user_id: UserId::new(1),
            code: CodeableConcept::from_concept(Concept::clinical(code, code)),
            start_time: start,
            end_time: None,
            encounter_id: None,
        }
    }

    fn bank(classification: Classification) -> QuestionnaireBank {
        QuestionnaireBank {
            id: QuestionnaireBankId::new(1),
            name: "bank".to_owned(),
            classification,
            research_protocol_id: Some(ProtocolId::new(1)),
            intervention_id: None,
            start: RelativeDelta::default(),
            due: RelativeDelta::days(7),
            overdue: RelativeDelta::days(30),
            expired: RelativeDelta::days(90),
            recurs: if classification == Classification::Recurring {
                vec![Recur {
                    start: RelativeDelta::days(90),
                    cycle_length: RelativeDelta::days(90),
                    termination: None,
                }]
            } else {
                Vec::new()
            },
            questionnaires: vec![QbQuestionnaire {
                rank: 0,
                questionnaire_name: "epic26".to_owned(),
            }],
        }
    }

    #[rstest]
    fn missing_consent_yields_no_trigger() {
        assert!(resolve_consent_trigger(None, &[]).is_none());
    }

    #[rstest]
    fn consent_anchor_without_procedures() {
        let trigger =
            resolve_consent_trigger(Some(&consent(at(2025, 1, 1))), &[]).expect("trigger");
        assert_eq!(trigger.base, at(2025, 1, 1));
        assert_eq!(trigger.advanced, None);
        assert!(!trigger.treatment_started);
    }

    #[rstest]
    fn latest_treatment_procedure_advances_recurring_banks_only() {
        let procedures = vec![
            procedure(TX_BRACHYTHERAPY, at(2025, 2, 1)),
            procedure(TX_RADICAL_PROSTATECTOMY, at(2025, 3, 15)),
        ];
        let trigger = resolve_consent_trigger(Some(&consent(at(2025, 1, 1))), &procedures)
            .expect("trigger");
        assert_eq!(trigger.advanced, Some(at(2025, 3, 15)));
        assert_eq!(trigger.for_bank(&bank(Classification::Recurring)), at(2025, 3, 15));
        assert_eq!(trigger.for_bank(&bank(Classification::Baseline)), at(2025, 1, 1));
    }

    #[rstest]
    fn placeholder_codes_count_as_started_without_moving_the_anchor() {
        let procedures = vec![procedure(TX_OTHER_PROCEDURE, at(2025, 2, 1))];
        let trigger = resolve_consent_trigger(Some(&consent(at(2025, 1, 1))), &procedures)
            .expect("trigger");
        assert!(trigger.treatment_started);
        assert_eq!(trigger.advanced, None);
        assert_eq!(trigger.for_bank(&bank(Classification::Recurring)), at(2025, 1, 1));
    }

    #[rstest]
    fn not_started_codes_mark_eligibility_only() {
        let procedures = vec![procedure(NTX_ACTIVE_SURVEILLANCE, at(2025, 2, 1))];
        let trigger = resolve_consent_trigger(Some(&consent(at(2025, 1, 1))), &procedures)
            .expect("trigger");
        assert!(trigger.eligible);
        assert!(!trigger.treatment_started);
        assert_eq!(trigger.advanced, None);
    }

    #[rstest]
    fn intervention_trigger_uses_earliest_positive_biopsy() {
        let obs = |issued, value: &str| Observation {
            id: 0,
            user_id: UserId::new(1),
            concept: CodeableConcept::from_concept(Concept::clinical(BIOPSY, "Biopsy")),
            value: Some(value.to_owned()),
            issued,
        };
        let observations = vec![
            obs(at(2025, 3, 1), "true"),
            obs(at(2025, 2, 1), "false"),
            obs(at(2025, 4, 1), "true"),
        ];
        let trigger = resolve_intervention_trigger(&observations, &[]).expect("trigger");
        assert_eq!(trigger.base, at(2025, 3, 1));

        assert!(resolve_intervention_trigger(&[], &[]).is_none());
    }
}
