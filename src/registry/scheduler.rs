//! Probe Scheduler
//!
//! Max-priority structure over host URLs. `next` peeks the top entry
//! without removing it; the probe loop re-ranks it afterwards with
//! `reprioritize`. Entries are never evicted.

use std::collections::{BTreeSet, HashMap};

/// Lowest fast-track priority. Regular priorities stay far below it.
pub const FAST_TRACK_FLOOR: i64 = i64::MAX / 2;

/// A host URL with its current scheduling weight (higher = probe sooner)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub url: String,
    pub priority: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("No hosts to schedule")]
    EmptyRegistry,
}

/// Priority queue with peek and O(log n) re-keying
#[derive(Debug, Default)]
pub struct Scheduler {
    /// Ordered by (priority, url); the last element is the next to probe
    ranking: BTreeSet<(i64, String)>,

    /// Current priority of each URL
    priorities: HashMap<String, i64>,

    /// Fast-track priorities handed out so far
    fast_tracked: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.priorities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.priorities.is_empty()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.priorities.contains_key(url)
    }

    /// Highest priority among all entries
    pub fn max_priority(&self) -> Option<i64> {
        self.ranking.last().map(|(priority, _)| *priority)
    }

    /// Insert a new URL on the fast track: its priority is strictly
    /// greater than every priority currently in the queue.
    ///
    /// Returns `None` if the URL is already scheduled.
    pub fn insert(&mut self, url: &str) -> Option<i64> {
        if self.contains(url) {
            return None;
        }

        let priority = self.fast_track_priority();
        self.fast_tracked += 1;

        self.ranking.insert((priority, url.to_string()));
        self.priorities.insert(url.to_string(), priority);
        Some(priority)
    }

    /// Entry with the maximum priority, left in place
    pub fn next(&self) -> Result<ScheduleEntry, ScheduleError> {
        self.ranking
            .last()
            .map(|(priority, url)| ScheduleEntry {
                url: url.clone(),
                priority: *priority,
            })
            .ok_or(ScheduleError::EmptyRegistry)
    }

    /// Replace the priority of `url`. Returns false for unknown URLs.
    pub fn reprioritize(&mut self, url: &str, priority: i64) -> bool {
        let Some(current) = self.priorities.get_mut(url) else {
            return false;
        };

        let old = std::mem::replace(current, priority);
        let mut key = (old, url.to_string());
        self.ranking.remove(&key);
        key.0 = priority;
        self.ranking.insert(key);
        true
    }

    fn fast_track_priority(&self) -> i64 {
        let candidate = FAST_TRACK_FLOOR.saturating_add(self.fast_tracked as i64);
        match self.max_priority() {
            Some(max) if max >= candidate => max.saturating_add(1),
            _ => candidate,
        }
    }
}
