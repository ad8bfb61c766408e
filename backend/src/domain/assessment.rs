//! Assessment-status computation over the materialised timeline.
//!
//! Given a user's timeline, their questionnaire responses, and an as-of
//! instant, derive the governing row, the overall status, and the
//! instruments still needed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::response::{QnrStatus, QuestionnaireResponse};
use super::timeline::{QbDescriptor, TimelineState};

/// Overall assessment status for one governing row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub enum OverallStatus {
    Due,
    Overdue,
    Expired,
    #[serde(rename = "In Progress")]
    InProgress,
    #[serde(rename = "Partially Completed")]
    PartiallyCompleted,
    Completed,
    Withdrawn,
}

impl std::fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Due => "Due",
            Self::Overdue => "Overdue",
            Self::Expired => "Expired",
            Self::InProgress => "In Progress",
            Self::PartiallyCompleted => "Partially Completed",
            Self::Completed => "Completed",
            Self::Withdrawn => "Withdrawn",
        };
        f.write_str(label)
    }
}

impl OverallStatus {
    /// Corresponding persisted timeline state.
    pub const fn timeline_state(self) -> TimelineState {
        match self {
            Self::Due => TimelineState::Due,
            Self::Overdue => TimelineState::Overdue,
            Self::Expired => TimelineState::Expired,
            Self::InProgress => TimelineState::Due,
            Self::PartiallyCompleted => TimelineState::PartiallyCompleted,
            Self::Completed => TimelineState::Completed,
            Self::Withdrawn => TimelineState::Withdrawn,
        }
    }
}

/// Full engine output for one (user, study, as_of) query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentReport {
    pub overall_status: OverallStatus,
    pub qb_name: String,
    pub qb_iteration: u32,
    pub due: DateTime<Utc>,
    pub overdue: DateTime<Utc>,
    pub expired: DateTime<Utc>,
    /// Instruments with no completed response, rank order.
    pub instruments_needing_full: Vec<String>,
    /// Instruments with an in-progress response and no completed one.
    pub instruments_in_progress: Vec<String>,
    /// Max authored instant across completed responses, when all are in.
    pub completed_date: Option<DateTime<Utc>>,
}

/// Responses owned by one descriptor: matched by bank name and iteration.
fn owned_by<'a>(
    responses: &'a [QuestionnaireResponse],
    descriptor: &QbDescriptor,
) -> impl Iterator<Item = &'a QuestionnaireResponse> {
    let name = descriptor.bank.name.clone();
    let iteration = descriptor.iteration;
    responses
        .iter()
        .filter(move |qnr| qnr.bank_ref.bank_name == name && qnr.bank_ref.iteration == iteration)
}

/// Select the governing row at `as_of`.
///
/// Preference order: a row the user holds an in-progress response against,
/// then the row whose window contains `as_of` (classification rank breaking
/// overlaps), then the most recent expired row for partial-completion
/// reporting.
pub fn select_governing<'a>(
    rows: &'a [QbDescriptor],
    responses: &[QuestionnaireResponse],
    as_of: DateTime<Utc>,
) -> Option<&'a QbDescriptor> {
    let in_window: Vec<&QbDescriptor> =
        rows.iter().filter(|r| r.window_contains(as_of)).collect();

    // An in-progress response pins its row while the window is open.
    let pinned = in_window.iter().find(|row| {
        owned_by(responses, row).any(|qnr| qnr.status == QnrStatus::InProgress)
    });
    if let Some(row) = pinned {
        return Some(row);
    }

    if let Some(row) = in_window
        .iter()
        .max_by_key(|r| (r.bank.classification.rank(), r.start))
    {
        return Some(row);
    }

    // Past the end of the schedule: report against the last expired row.
    rows.iter()
        .filter(|r| r.expired <= as_of)
        .max_by_key(|r| r.expired)
}

/// Derive the report for the governing row.
///
/// `withdrawn_at` carries the consent suspension instant when the user has
/// withdrawn; withdrawal before the row's start reports Withdrawn.
pub fn assess(
    governing: &QbDescriptor,
    responses: &[QuestionnaireResponse],
    as_of: DateTime<Utc>,
    withdrawn_at: Option<DateTime<Utc>>,
) -> AssessmentReport {
    let mut needing_full = Vec::new();
    let mut in_progress = Vec::new();
    let mut completed_dates = Vec::new();

    for instrument in governing.bank.instrument_names() {
        let completed_at = owned_by(responses, governing)
            .filter(|qnr| qnr.questionnaire_name == instrument && qnr.completed_by(as_of))
            .map(|qnr| qnr.authored)
            .max();
        if let Some(authored) = completed_at {
            completed_dates.push(authored);
            continue;
        }
        needing_full.push(instrument.to_owned());
        let has_in_progress = owned_by(responses, governing).any(|qnr| {
            qnr.questionnaire_name == instrument && qnr.status == QnrStatus::InProgress
        });
        if has_in_progress {
            in_progress.push(instrument.to_owned());
        }
    }

    let total = governing.bank.instrument_names().len();
    let completed_count = completed_dates.len();
    let touched = completed_count > 0 || !in_progress.is_empty();

    // Untouched work expires one instant past the overdue bound; touched
    // work stays In Progress until the expired bound passes.
    let past_window = if touched {
        as_of > governing.expired
    } else {
        as_of > governing.overdue
    };

    let overall_status = if withdrawn_at.is_some_and(|at| at < governing.start) {
        OverallStatus::Withdrawn
    } else if completed_count == total {
        OverallStatus::Completed
    } else if past_window {
        if completed_count > 0 {
            OverallStatus::PartiallyCompleted
        } else {
            OverallStatus::Expired
        }
    } else if touched {
        OverallStatus::InProgress
    } else if as_of < governing.due {
        OverallStatus::Due
    } else {
        // due <= as_of <= overdue, inclusive at the overdue bound.
        OverallStatus::Overdue
    };

    let completed_date = if completed_count == total {
        completed_dates.into_iter().max()
    } else {
        None
    };

    AssessmentReport {
        overall_status,
        qb_name: governing.bank.name.clone(),
        qb_iteration: governing.iteration,
        due: governing.due,
        overdue: governing.overdue,
        expired: governing.expired,
        instruments_needing_full: needing_full,
        instruments_in_progress: in_progress,
        completed_date,
    }
}

#[cfg(test)]
#[path = "assessment_tests.rs"]
mod assessment_tests;
