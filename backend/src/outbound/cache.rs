//! Process-local TTL cache over computed timelines.
//!
//! Expiry instants carry a random jitter so entries seeded together do not
//! expire together. Writes that change scheduling inputs invalidate through
//! the port; expiry alone bounds staleness for everything else.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use crate::domain::consent::StudyId;
use crate::domain::identity::UserId;
use crate::domain::ports::{Clock, TimelineCache};
use crate::domain::timeline::QbTimelineRow;

/// Default entry lifetime before jitter.
const DEFAULT_TTL_SECONDS: i64 = 600;

/// Jitter ceiling added to each entry's lifetime.
const JITTER_SECONDS: i64 = 60;

struct Entry {
    rows: Vec<QbTimelineRow>,
    expires_at: DateTime<Utc>,
}

pub struct TtlTimelineCache {
    clock: Arc<dyn Clock>,
    ttl: Duration,
    entries: Mutex<HashMap<(i64, i64), Entry>>,
}

impl TtlTimelineCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_ttl(clock, Duration::seconds(DEFAULT_TTL_SECONDS))
    }

    pub fn with_ttl(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            clock,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<(i64, i64), Entry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn expiry(&self) -> DateTime<Utc> {
        let jitter = rand::thread_rng().gen_range(0..=JITTER_SECONDS);
        self.clock.now() + self.ttl + Duration::seconds(jitter)
    }
}

impl TimelineCache for TtlTimelineCache {
    fn get(&self, user: UserId, study: StudyId) -> Option<Vec<QbTimelineRow>> {
        let now = self.clock.now();
        let mut entries = self.lock();
        match entries.get(&(user.value(), study.value())) {
            Some(entry) if entry.expires_at > now => Some(entry.rows.clone()),
            Some(_) => {
                entries.remove(&(user.value(), study.value()));
                None
            }
            None => None,
        }
    }

    fn put(&self, user: UserId, study: StudyId, rows: Vec<QbTimelineRow>) {
        let expires_at = self.expiry();
        self.lock()
            .insert((user.value(), study.value()), Entry { rows, expires_at });
    }

    fn invalidate(&self, user: UserId) {
        self.lock().retain(|(cached_user, _), _| *cached_user != user.value());
    }
}
