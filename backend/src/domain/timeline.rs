//! Questionnaire-bank timeline materialisation.
//!
//! For one (user, study) the timeline is the ordered, finite sequence of
//! scheduled bank instances across the user's lifetime. Rows are computed
//! from the trigger date and the protocol in force at the as-of instant,
//! then adjusted for the retirement rule: an iteration the user already
//! started on an older protocol keeps that protocol's bank; the following
//! iteration moves to the newer one.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::consent::StudyId;
use super::identity::UserId;
use super::protocol::{in_force_at, ProtocolEpoch, ProtocolId};
use super::questionnaire::{Classification, QuestionnaireBank};
use super::response::QuestionnaireResponse;
use super::trigger::TriggerDate;

/// Fallback horizon for recur rules without a termination delta.
const FALLBACK_HORIZON_YEARS: i64 = 10;

/// Far-future window length for indefinite banks.
const INDEFINITE_YEARS: i64 = 50;

/// One scheduled bank instance with absolute window instants.
#[derive(Debug, Clone, PartialEq)]
pub struct QbDescriptor {
    pub bank: Arc<QuestionnaireBank>,
    pub iteration: u32,
    /// Index of the recur rule that produced this row, for recurring banks.
    pub recur_index: Option<usize>,
    pub start: DateTime<Utc>,
    pub due: DateTime<Utc>,
    pub overdue: DateTime<Utc>,
    pub expired: DateTime<Utc>,
}

impl QbDescriptor {
    /// Build a row for `bank` whose window opens at `start`.
    pub fn at(
        bank: Arc<QuestionnaireBank>,
        iteration: u32,
        recur_index: Option<usize>,
        start: DateTime<Utc>,
    ) -> Self {
        let due = bank.due.apply(start);
        let overdue = bank.overdue.apply(start);
        let expired = if bank.classification == Classification::Indefinite {
            start + Duration::days(INDEFINITE_YEARS * 365)
        } else {
            bank.expired.apply(start)
        };
        Self {
            bank,
            iteration,
            recur_index,
            start,
            due,
            overdue,
            expired,
        }
    }

    /// True while `as_of` falls inside the governing window `[start, expired)`.
    pub fn window_contains(&self, as_of: DateTime<Utc>) -> bool {
        as_of >= self.start && as_of < self.expired
    }
}

/// Materialise rows for a set of banks against one trigger.
pub fn materialise_rows(
    trigger: &TriggerDate,
    banks: &[Arc<QuestionnaireBank>],
) -> Vec<QbDescriptor> {
    let mut rows = Vec::new();
    for bank in banks {
        let anchor = trigger.for_bank(bank);
        match bank.classification {
            Classification::Baseline | Classification::Followup | Classification::Indefinite => {
                let start = bank.start.apply(anchor);
                rows.push(QbDescriptor::at(Arc::clone(bank), 0, None, start));
            }
            Classification::Recurring => {
                for (recur_index, recur) in bank.recurs.iter().enumerate() {
                    let first = recur.start.apply(bank.start.apply(anchor));
                    let limit = recur
                        .termination
                        .map(|t| t.apply(anchor))
                        .unwrap_or(anchor + Duration::days(FALLBACK_HORIZON_YEARS * 365));
                    let mut iteration: u32 = 0;
                    loop {
                        let start = recur.cycle_length.apply_n(first, iteration);
                        if start >= limit {
                            break;
                        }
                        rows.push(QbDescriptor::at(
                            Arc::clone(bank),
                            iteration,
                            Some(recur_index),
                            start,
                        ));
                        iteration += 1;
                    }
                }
            }
        }
    }
    sort_rows(&mut rows);
    rows
}

fn sort_rows(rows: &mut [QbDescriptor]) {
    rows.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then(a.bank.classification.rank().cmp(&b.bank.classification.rank()))
            .then(a.bank.name.cmp(&b.bank.name))
            .then(a.iteration.cmp(&b.iteration))
    });
}

/// Apply the protocol retirement rule: a row whose iteration the user
/// already started under a different bank of the same classification keeps
/// that older bank, with the window recomputed from the older bank's deltas.
pub fn apply_retirement_pinning(
    rows: Vec<QbDescriptor>,
    responses: &[QuestionnaireResponse],
    trigger: &TriggerDate,
    bank_by_name: &dyn Fn(&str) -> Option<Arc<QuestionnaireBank>>,
) -> Vec<QbDescriptor> {
    let mut pinned: Vec<QbDescriptor> = rows
        .into_iter()
        .map(|row| {
            let started_elsewhere = responses.iter().find(|qnr| {
                qnr.bank_ref.iteration == row.iteration
                    && qnr.bank_ref.bank_name != row.bank.name
            });
            let Some(qnr) = started_elsewhere else {
                return row;
            };
            let Some(old_bank) = bank_by_name(&qnr.bank_ref.bank_name) else {
                return row;
            };
            if old_bank.classification != row.bank.classification {
                return row;
            }
            rebuild_for_bank(old_bank, &row, trigger)
        })
        .collect();
    sort_rows(&mut pinned);
    pinned
}

fn rebuild_for_bank(
    bank: Arc<QuestionnaireBank>,
    row: &QbDescriptor,
    trigger: &TriggerDate,
) -> QbDescriptor {
    let anchor = trigger.for_bank(&bank);
    let start = match (bank.classification, row.recur_index) {
        (Classification::Recurring, Some(index)) => bank
            .recurs
            .get(index)
            .or_else(|| bank.recurs.first())
            .map(|recur| {
                recur
                    .cycle_length
                    .apply_n(recur.start.apply(bank.start.apply(anchor)), row.iteration)
            })
            .unwrap_or_else(|| bank.start.apply(anchor)),
        _ => bank.start.apply(anchor),
    };
    QbDescriptor::at(bank, row.iteration, row.recur_index, start)
}

/// Protocol governing the timeline at `as_of`. Falls back to the protocol
/// retiring exactly at `as_of`, whose epoch bound is exclusive.
pub fn governing_protocol(epochs: &[ProtocolEpoch], as_of: DateTime<Utc>) -> Option<ProtocolId> {
    in_force_at(epochs, as_of).or_else(|| {
        epochs
            .iter()
            .find(|e| e.until == Some(as_of))
            .map(|e| e.protocol_id)
    })
}

/// Build the full timeline for one (user, study) as of `as_of`.
///
/// A `None` trigger yields the empty timeline: the user has no scheduled
/// work. Backdated `as_of` values reconstruct against the protocol in force
/// at that instant.
pub fn build_timeline(
    trigger: Option<&TriggerDate>,
    epochs: &[ProtocolEpoch],
    as_of: DateTime<Utc>,
    banks_for_protocol: &dyn Fn(ProtocolId) -> Vec<Arc<QuestionnaireBank>>,
    bank_by_name: &dyn Fn(&str) -> Option<Arc<QuestionnaireBank>>,
    responses: &[QuestionnaireResponse],
) -> Vec<QbDescriptor> {
    let Some(trigger) = trigger else {
        return Vec::new();
    };
    let Some(protocol) = governing_protocol(epochs, as_of) else {
        return Vec::new();
    };
    let banks = banks_for_protocol(protocol);
    let rows = materialise_rows(trigger, &banks);
    apply_retirement_pinning(rows, responses, trigger, bank_by_name)
}

/// State of a persisted timeline row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum TimelineState {
    Unstarted,
    Due,
    Overdue,
    Expired,
    Completed,
    PartiallyCompleted,
    Withdrawn,
}

/// Materialised timeline row persisted for efficient lookup.
///
/// Fully rebuildable; rebuilding for an unchanged user yields identical rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QbTimelineRow {
    pub user_id: UserId,
    pub study_id: StudyId,
    pub qb_name: String,
    pub iteration: u32,
    pub recur_index: Option<usize>,
    pub classification: Classification,
    pub start: DateTime<Utc>,
    pub due: DateTime<Utc>,
    pub overdue: DateTime<Utc>,
    pub expired: DateTime<Utc>,
    pub state: TimelineState,
    /// Instant the state was computed at.
    pub at: DateTime<Utc>,
}

impl QbTimelineRow {
    /// Project a descriptor into its persisted form.
    pub fn from_descriptor(
        user_id: UserId,
        study_id: StudyId,
        descriptor: &QbDescriptor,
        state: TimelineState,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            study_id,
            qb_name: descriptor.bank.name.clone(),
            iteration: descriptor.iteration,
            recur_index: descriptor.recur_index,
            classification: descriptor.bank.classification,
            start: descriptor.start,
            due: descriptor.due,
            overdue: descriptor.overdue,
            expired: descriptor.expired,
            state,
            at,
        }
    }
}

#[cfg(test)]
#[path = "timeline_tests.rs"]
mod timeline_tests;
