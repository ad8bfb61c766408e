//! Persisted background tasks claimed by the worker pool.
//!
//! Tasks carry a kind, a JSON payload, and retry bookkeeping. The worker
//! claims due tasks under a transactional select, executes them, and either
//! acknowledges or reschedules with exponential backoff until the attempt
//! budget is spent.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Retries stop once a task has failed this many times.
pub const MAX_ATTEMPTS: i32 = 8;

/// Kind of background work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// POST a signed callback notification to one client.
    DeliverCallback,
    /// Run one communication-scheduler pass.
    ReminderTick,
}

impl TaskKind {
    /// Stable string form stored in the task table.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DeliverCallback => "deliver_callback",
            Self::ReminderTick => "reminder_tick",
        }
    }

    /// Parse the stored string form.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "deliver_callback" => Some(Self::DeliverCallback),
            "reminder_tick" => Some(Self::ReminderTick),
            _ => None,
        }
    }
}

/// One persisted task row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub kind: TaskKind,
    pub payload: Value,
    pub attempts: i32,
    pub next_attempt_at: DateTime<Utc>,
}

impl Task {
    /// New task runnable at `now`.
    pub fn new(kind: TaskKind, payload: Value, now: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            kind,
            payload,
            attempts: 0,
            next_attempt_at: now,
        }
    }

    /// True when the attempt budget is exhausted.
    pub fn abandoned(&self) -> bool {
        self.attempts >= MAX_ATTEMPTS
    }
}

/// Exponential backoff delay after `attempts` failures, capped at an hour.
pub fn backoff_delay(attempts: i32) -> Duration {
    let exp = attempts.clamp(0, 12) as u32;
    let seconds = 30i64.saturating_mul(2i64.saturating_pow(exp));
    Duration::seconds(seconds.min(3600))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 30)]
    #[case(1, 60)]
    #[case(2, 120)]
    #[case(6, 1920)]
    #[case(7, 3600)]
    #[case(40, 3600)]
    fn backoff_doubles_and_caps(#[case] attempts: i32, #[case] seconds: i64) {
        assert_eq!(backoff_delay(attempts), Duration::seconds(seconds));
    }

    #[rstest]
    fn kind_round_trips_storage_form() {
        for kind in [TaskKind::DeliverCallback, TaskKind::ReminderTick] {
            assert_eq!(TaskKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(TaskKind::parse("unknown"), None);
    }

    #[rstest]
    fn task_abandons_after_budget() {
        let mut task = Task::new(
            TaskKind::ReminderTick,
            serde_json::json!({}),
            Utc::now(),
        );
        assert!(!task.abandoned());
        task.attempts = MAX_ATTEMPTS;
        assert!(task.abandoned());
    }
}
