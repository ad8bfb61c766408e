//! Status-derivation coverage: governing-row selection, the boundary
//! instants, and the touched/untouched expiry rules.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rstest::rstest;

use super::*;
use crate::domain::identity::UserId;
use crate::domain::protocol::ProtocolId;
use crate::domain::questionnaire::{
    Classification, QbQuestionnaire, QuestionnaireBank, QuestionnaireBankId, Recur, RelativeDelta,
};
use crate::domain::response::{QnrBankRef, QnrStatus, QuestionnaireResponse};
use crate::domain::timeline::{materialise_rows, QbDescriptor};
use crate::domain::trigger::TriggerDate;

fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

fn bank_with(
    name: &str,
    due: RelativeDelta,
    overdue: RelativeDelta,
    expired: RelativeDelta,
    instruments: &[&str],
) -> Arc<QuestionnaireBank> {
    Arc::new(QuestionnaireBank {
        id: QuestionnaireBankId::new(1),
        name: name.to_owned(),
        classification: Classification::Baseline,
        research_protocol_id: Some(ProtocolId::new(1)),
        intervention_id: None,
        start: RelativeDelta::default(),
        due,
        overdue,
        expired,
        recurs: Vec::new(),
        questionnaires: instruments
            .iter()
            .enumerate()
            .map(|(rank, name)| QbQuestionnaire {
                rank: rank as u32,
                questionnaire_name: (*name).to_owned(),
            })
            .collect(),
    })
}

fn qnr(
    bank_name: &str,
    iteration: u32,
    instrument: &str,
    status: QnrStatus,
    authored: DateTime<Utc>,
) -> QuestionnaireResponse {
    QuestionnaireResponse {
        id: 0,
        user_id: UserId::new(1),
        bank_ref: QnrBankRef {
            bank_name: bank_name.to_owned(),
            iteration,
            protocol_id: None,
        },
        questionnaire_name: instrument.to_owned(),
        authored,
        status,
        document: serde_json::json!({}),
    }
}

/// Baseline with overdue and expired both at 90 days: untouched work is
/// Overdue one hour before the bound and Expired one day after it.
#[rstest]
#[case(Duration::days(89) + Duration::hours(23), OverallStatus::Overdue)]
#[case(Duration::days(91), OverallStatus::Expired)]
fn untouched_baseline_at_the_ninety_day_bound(
    #[case] elapsed: Duration,
    #[case] expected: OverallStatus,
) {
    let consented = at(2025, 1, 1);
    let bank = bank_with(
        "crv-baseline",
        RelativeDelta::days(7),
        RelativeDelta::days(90),
        RelativeDelta::days(90),
        &["epic26", "eproms_add"],
    );
    let row = QbDescriptor::at(bank, 0, None, consented);
    let report = assess(&row, &[], consented + elapsed, None);
    assert_eq!(report.overall_status, expected);
    assert_eq!(
        report.instruments_needing_full,
        vec!["epic26".to_owned(), "eproms_add".to_owned()]
    );
}

#[rstest]
#[case(Duration::zero(), OverallStatus::Due)]
#[case(Duration::days(30), OverallStatus::Overdue)]
#[case(Duration::days(30) + Duration::seconds(1), OverallStatus::Expired)]
fn untouched_boundaries_are_inclusive_at_overdue(
    #[case] elapsed: Duration,
    #[case] expected: OverallStatus,
) {
    let start = at(2025, 1, 1);
    let bank = bank_with(
        "crv-baseline",
        RelativeDelta::days(7),
        RelativeDelta::days(30),
        RelativeDelta::days(90),
        &["epic26"],
    );
    let row = QbDescriptor::at(bank, 0, None, start);
    assert_eq!(assess(&row, &[], start + elapsed, None).overall_status, expected);
}

#[rstest]
fn in_progress_survives_past_overdue_until_expiry() {
    let start = at(2025, 1, 1);
    let bank = bank_with(
        "crv-baseline",
        RelativeDelta::days(7),
        RelativeDelta::days(30),
        RelativeDelta::days(90),
        &["epic26"],
    );
    let row = QbDescriptor::at(bank, 0, None, start);
    let responses = vec![qnr(
        "crv-baseline",
        0,
        "epic26",
        QnrStatus::InProgress,
        start + Duration::days(5),
    )];

    let report = assess(&row, &responses, start + Duration::days(40), None);
    assert_eq!(report.overall_status, OverallStatus::InProgress);
    assert_eq!(report.instruments_in_progress, vec!["epic26".to_owned()]);

    // One instant past expiry with nothing completed: Expired, not partial.
    let report = assess(
        &row,
        &responses,
        start + Duration::days(90) + Duration::seconds(1),
        None,
    );
    assert_eq!(report.overall_status, OverallStatus::Expired);
}

#[rstest]
fn partial_completion_after_expiry() {
    let start = at(2025, 1, 1);
    let bank = bank_with(
        "crv-baseline",
        RelativeDelta::days(7),
        RelativeDelta::days(30),
        RelativeDelta::days(90),
        &["epic26", "eproms_add"],
    );
    let row = QbDescriptor::at(bank, 0, None, start);
    let responses = vec![qnr(
        "crv-baseline",
        0,
        "epic26",
        QnrStatus::Completed,
        start + Duration::days(10),
    )];
    let report = assess(&row, &responses, start + Duration::days(120), None);
    assert_eq!(report.overall_status, OverallStatus::PartiallyCompleted);
    assert_eq!(report.instruments_needing_full, vec!["eproms_add".to_owned()]);
    assert_eq!(report.completed_date, None);
}

#[rstest]
fn completed_reports_latest_authored_instant() {
    let start = at(2025, 1, 1);
    let bank = bank_with(
        "crv-baseline",
        RelativeDelta::days(7),
        RelativeDelta::days(30),
        RelativeDelta::days(90),
        &["epic26", "eproms_add"],
    );
    let row = QbDescriptor::at(bank, 0, None, start);
    let responses = vec![
        qnr("crv-baseline", 0, "epic26", QnrStatus::Completed, start + Duration::days(3)),
        qnr("crv-baseline", 0, "eproms_add", QnrStatus::Completed, start + Duration::days(9)),
    ];
    let report = assess(&row, &responses, start + Duration::days(10), None);
    assert_eq!(report.overall_status, OverallStatus::Completed);
    assert_eq!(report.completed_date, Some(start + Duration::days(9)));
    assert!(report.instruments_needing_full.is_empty());
}

#[rstest]
fn completion_is_evaluated_as_of_the_query_instant() {
    let start = at(2025, 1, 1);
    let bank = bank_with(
        "crv-baseline",
        RelativeDelta::days(7),
        RelativeDelta::days(30),
        RelativeDelta::days(90),
        &["epic26"],
    );
    let row = QbDescriptor::at(bank, 0, None, start);
    let responses = vec![qnr(
        "crv-baseline",
        0,
        "epic26",
        QnrStatus::Completed,
        start + Duration::days(20),
    )];
    // Backdated before the response was authored: still untouched.
    let report = assess(&row, &responses, start + Duration::days(5), None);
    assert_eq!(report.overall_status, OverallStatus::Due);
}

#[rstest]
fn withdrawal_before_start_reports_withdrawn() {
    let start = at(2025, 6, 1);
    let bank = bank_with(
        "crv-baseline",
        RelativeDelta::days(7),
        RelativeDelta::days(30),
        RelativeDelta::days(90),
        &["epic26"],
    );
    let row = QbDescriptor::at(bank, 0, None, start);
    let report = assess(&row, &[], start + Duration::days(1), Some(at(2025, 5, 1)));
    assert_eq!(report.overall_status, OverallStatus::Withdrawn);

    // Withdrawal after the row opened does not mask its status.
    let report = assess(&row, &[], start + Duration::days(1), Some(at(2025, 6, 2)));
    assert_eq!(report.overall_status, OverallStatus::Due);
}

fn recurring_rows(consented: DateTime<Utc>) -> Vec<QbDescriptor> {
    let bank = Arc::new(QuestionnaireBank {
        id: QuestionnaireBankId::new(2),
        name: "crv-recurring".to_owned(),
        classification: Classification::Recurring,
        research_protocol_id: Some(ProtocolId::new(1)),
        intervention_id: None,
        start: RelativeDelta::default(),
        due: RelativeDelta::days(7),
        overdue: RelativeDelta::days(30),
        expired: RelativeDelta::days(90),
        recurs: vec![Recur {
            start: RelativeDelta::days(90),
            cycle_length: RelativeDelta::days(90),
            termination: Some(RelativeDelta::days(720)),
        }],
        questionnaires: vec![QbQuestionnaire {
            rank: 0,
            questionnaire_name: "epic26".to_owned(),
        }],
    });
    let trigger = TriggerDate {
        base: consented,
        advanced: None,
        treatment_started: false,
        eligible: true,
    };
    materialise_rows(&trigger, &[bank])
}

/// Recurring bank, first iteration window [T+90d, T+180d): Overdue at
/// T+100d (past due, on or before overdue) and Expired at T+121d (past the
/// overdue bound, untouched).
#[rstest]
#[case(Duration::days(100), OverallStatus::Overdue)]
#[case(Duration::days(121), OverallStatus::Expired)]
fn recurring_first_iteration_status(#[case] elapsed: Duration, #[case] expected: OverallStatus) {
    let consented = at(2025, 1, 1);
    let rows = recurring_rows(consented);
    let as_of = consented + elapsed;
    let governing = select_governing(&rows, &[], as_of).expect("governing row");
    assert_eq!(governing.iteration, 0);
    let report = assess(governing, &[], as_of, None);
    assert_eq!(report.overall_status, expected);
    assert_eq!(report.qb_iteration, 0);
}

#[rstest]
fn governing_row_advances_with_the_next_iteration() {
    let consented = at(2025, 1, 1);
    let rows = recurring_rows(consented);
    let governing =
        select_governing(&rows, &[], consented + Duration::days(185)).expect("governing row");
    assert_eq!(governing.iteration, 1);
}

#[rstest]
fn in_progress_response_pins_the_governing_row() {
    let consented = at(2025, 1, 1);
    let rows = recurring_rows(consented);
    // Iterations 0 and 1 overlap around T+180d only via expiry windows; use
    // an instant inside iteration 0's window with iteration 1 not yet open.
    let as_of = consented + Duration::days(100);
    let responses = vec![qnr(
        "crv-recurring",
        0,
        "epic26",
        QnrStatus::InProgress,
        consented + Duration::days(95),
    )];
    let governing = select_governing(&rows, &responses, as_of).expect("governing row");
    assert_eq!(governing.iteration, 0);
    let report = assess(governing, &responses, as_of, None);
    assert_eq!(report.overall_status, OverallStatus::InProgress);
}

#[rstest]
fn past_schedule_end_reports_against_last_expired_row() {
    let consented = at(2020, 1, 1);
    let rows = recurring_rows(consented);
    let as_of = consented + Duration::days(2000);
    let governing = select_governing(&rows, &[], as_of).expect("governing row");
    assert_eq!(governing.iteration, 6);
    assert_eq!(assess(governing, &[], as_of, None).overall_status, OverallStatus::Expired);
}

#[rstest]
fn empty_timeline_has_no_governing_row() {
    assert!(select_governing(&[], &[], at(2025, 1, 1)).is_none());
}
