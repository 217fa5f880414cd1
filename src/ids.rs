//! Time source and identifier generation.
//!
//! Identifiers are millisecond timestamps rendered as strings. Two creations
//! inside the same millisecond would collide, so the generator never hands
//! out an id less than or equal to the previous one.
use std::sync::{
    atomic::{AtomicI64, Ordering},
    Arc, Mutex,
};

use chrono::{DateTime, Duration, Utc};
use log::trace;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Used by tests and replays.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Moves the clock forward by `millis` milliseconds.
    pub fn advance_millis(&self, millis: i64) {
        if let Ok(mut now) = self.now.lock() {
            *now += Duration::milliseconds(millis);
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
            .lock()
            .map(|now| *now)
            .unwrap_or_else(|poisoned| *poisoned.into_inner())
    }
}

/// Hands out strictly increasing millisecond-timestamp identifiers.
#[derive(Debug, Default)]
pub struct IdGenerator {
    last: AtomicI64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id for a record created at `at`.
    pub fn next_id(&self, at: DateTime<Utc>) -> String {
        let candidate = at.timestamp_millis();
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let next = candidate.max(last + 1);
            match self
                .last
                .compare_exchange_weak(last, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => {
                    if next != candidate {
                        trace!("Clock has not advanced, bumped id {} -> {}", candidate, next);
                    }
                    return next.to_string();
                }
                Err(current) => last = current,
            }
        }
    }

    /// Makes sure future ids sort after every id already in use.
    pub fn observe<'a>(&self, ids: impl IntoIterator<Item = &'a str>) {
        let max_seen = ids
            .into_iter()
            .filter_map(|id| id.parse::<i64>().ok())
            .max();
        if let Some(max_seen) = max_seen {
            self.last.fetch_max(max_seen, Ordering::Relaxed);
        }
    }
}

/// Timestamp for a modification of a record last touched at `previous`.
///
/// Keeps modification times strictly increasing even when the clock has not
/// moved (or moved backwards) since the previous write.
pub fn next_update_time(now: DateTime<Utc>, previous: DateTime<Utc>) -> DateTime<Utc> {
    if now > previous {
        now
    } else {
        previous + Duration::milliseconds(1)
    }
}
