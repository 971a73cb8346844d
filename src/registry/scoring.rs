//! Peer Scoring System
//!
//! Turns the stream of probe outcomes of a host into a cumulative
//! success ratio (`average`) and a smoothed one (`score`), both in [0, 1].
//! The smoothing memory factor `k` trades history against reactivity:
//! `score = average * (1 - 1/k) + outcome * (1/k)`.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Neutral prior given to a host before its first check
pub const INITIAL_SCORE: f64 = 0.5;

/// Outcome of one probe attempt. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Check {
    /// UTC time the probe started
    pub time: DateTime<Utc>,

    /// Caller -> responder delay (ms), unset on failure
    pub ping_delay_ms: Option<f64>,

    /// Responder -> caller delay (ms), unset on failure
    pub pong_delay_ms: Option<f64>,

    /// Full round-trip as seen locally (ms), unset on failure
    pub local_delay_ms: Option<f64>,

    pub success: bool,
}

impl Check {
    /// A failed attempt started at `time`
    pub fn failed(time: DateTime<Utc>) -> Self {
        Self {
            time,
            ping_delay_ms: None,
            pong_delay_ms: None,
            local_delay_ms: None,
            success: false,
        }
    }

    /// A successful attempt: `t0` before sending, `tr` stamped by the
    /// responder, `t3` once the full response was read.
    pub fn succeeded(t0: DateTime<Utc>, tr: DateTime<Utc>, t3: DateTime<Utc>) -> Self {
        Self {
            time: t0,
            ping_delay_ms: Some(millis(tr - t0)),
            pong_delay_ms: Some(millis(t3 - tr)),
            local_delay_ms: Some(millis(t3 - t0)),
            success: true,
        }
    }
}

fn millis(delta: Duration) -> f64 {
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1000.0,
        None => delta.num_milliseconds() as f64,
    }
}

fn outcome(success: bool) -> f64 {
    if success {
        1.0
    } else {
        0.0
    }
}

/// Availability change detected while recording a check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// First check of the host succeeded
    FirstOnline,

    /// Host stopped answering; `since` is the first failed check
    WentOffline { since: DateTime<Utc> },

    /// Host answers again after an outage of `outage`
    BackOnline { outage: Duration },
}

/// Append-only check history of one host with its running statistics
#[derive(Debug, Clone, Serialize)]
pub struct Checks {
    entries: Vec<Check>,
    average: f64,
    score: f64,
    #[serde(skip)]
    outage_start: Option<DateTime<Utc>>,
}

impl Default for Checks {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            average: 0.0,
            score: INITIAL_SCORE,
            outage_start: None,
        }
    }
}

impl Checks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded checks
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    /// Cumulative success ratio since creation
    pub fn average(&self) -> f64 {
        self.average
    }

    /// Smoothed success ratio
    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn last(&self) -> Option<&Check> {
        self.entries.last()
    }

    /// Start of the current outage, if the host is offline
    pub fn outage_start(&self) -> Option<DateTime<Utc>> {
        self.outage_start
    }

    /// Record a check with memory factor `k` (clamped to >= 1) and report
    /// any availability transition it causes.
    pub fn record(&mut self, check: Check, k: f64) -> Option<Transition> {
        let transition = self.transition(&check);

        let size = self.entries.len() as f64;
        let value = outcome(check.success);
        let weight = 1.0 / k.max(1.0);

        self.average = ((self.average * size + value) / (size + 1.0)).clamp(0.0, 1.0);
        self.score = (self.average * (1.0 - weight) + value * weight).clamp(0.0, 1.0);
        self.entries.push(check);

        transition
    }

    fn transition(&mut self, check: &Check) -> Option<Transition> {
        let previous = self.last().map(|c| c.success);
        if previous == Some(check.success) {
            return None;
        }

        if check.success {
            match self.outage_start.take() {
                Some(since) => Some(Transition::BackOnline {
                    outage: check.time - since,
                }),
                None => Some(Transition::FirstOnline),
            }
        } else {
            self.outage_start = Some(check.time);
            Some(Transition::WentOffline { since: check.time })
        }
    }
}

/// Scheduling priority of a host just probed in cycle `probe_counter`.
///
/// The counter grows by one per cycle, so the host probed last ranks
/// lowest and the one left alone longest ranks highest.
pub fn amortized_priority(probe_counter: u64) -> i64 {
    -i64::try_from(probe_counter).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn check(secs: i64, success: bool) -> Check {
        if success {
            Check::succeeded(at(secs), at(secs), at(secs))
        } else {
            Check::failed(at(secs))
        }
    }

    #[test]
    fn test_initial_state() {
        let checks = Checks::new();
        assert_eq!(checks.size(), 0);
        assert_eq!(checks.score(), INITIAL_SCORE);
        assert_eq!(checks.average(), 0.0);
        assert!(checks.last().is_none());
    }

    #[test]
    fn test_update_formula() {
        let mut checks = Checks::new();

        checks.record(check(0, true), 10.0);
        assert_eq!(checks.average(), 1.0);
        assert!((checks.score() - 1.0).abs() < 1e-12);

        checks.record(check(1, false), 10.0);
        assert!((checks.average() - 0.5).abs() < 1e-12);
        assert!((checks.score() - 0.45).abs() < 1e-12);
    }

    #[test]
    fn test_size_and_bounds() {
        let mut checks = Checks::new();
        let pattern = [true, false, false, true, true, true, false, true, false, false];

        for (i, success) in pattern.iter().enumerate() {
            checks.record(check(i as i64, *success), 3.0);
            assert_eq!(checks.size(), i + 1);
            assert!((0.0..=1.0).contains(&checks.average()));
            assert!((0.0..=1.0).contains(&checks.score()));
        }
    }

    #[test]
    fn test_converges_on_success() {
        let mut checks = Checks::new();
        let mut previous = checks.score();

        for i in 0..30 {
            checks.record(check(i, true), 10.0);
            assert!(checks.score() >= previous);
            previous = checks.score();
        }
        assert!(checks.score() > 0.99);
    }

    #[test]
    fn test_converges_on_failure() {
        let mut checks = Checks::new();
        let mut previous = checks.score();

        for i in 0..30 {
            checks.record(check(i, false), 10.0);
            assert!(checks.score() <= previous);
            previous = checks.score();
        }
        assert!(checks.score() < 0.01);
    }

    #[test]
    fn test_small_factor_reacts_faster() {
        let mut slow = Checks::new();
        let mut fast = Checks::new();
        for i in 0..5 {
            slow.record(check(i, true), 10.0);
            fast.record(check(i, true), 2.0);
        }

        slow.record(check(5, false), 10.0);
        fast.record(check(5, false), 2.0);
        assert!(fast.score() < slow.score());
    }

    #[test]
    fn test_outage_transitions() {
        let mut checks = Checks::new();
        let stream = [true, true, false, false, true];

        let transitions: Vec<_> = stream
            .iter()
            .enumerate()
            .map(|(i, success)| checks.record(check(i as i64 * 7, *success), 10.0))
            .collect();

        assert_eq!(transitions[0], Some(Transition::FirstOnline));
        assert_eq!(transitions[1], None);
        assert_eq!(transitions[2], Some(Transition::WentOffline { since: at(14) }));
        assert_eq!(transitions[3], None);
        assert_eq!(
            transitions[4],
            Some(Transition::BackOnline { outage: Duration::seconds(14) })
        );
        assert!(checks.outage_start().is_none());
    }

    #[test]
    fn test_first_check_failure_starts_outage() {
        let mut checks = Checks::new();
        assert_eq!(
            checks.record(check(0, false), 10.0),
            Some(Transition::WentOffline { since: at(0) })
        );
        assert_eq!(
            checks.record(check(5, true), 10.0),
            Some(Transition::BackOnline { outage: Duration::seconds(5) })
        );
    }

    #[test]
    fn test_delays() {
        let t0 = at(0);
        let tr = t0 + Duration::milliseconds(12);
        let t3 = t0 + Duration::milliseconds(30);
        let check = Check::succeeded(t0, tr, t3);

        assert_eq!(check.ping_delay_ms, Some(12.0));
        assert_eq!(check.pong_delay_ms, Some(18.0));
        assert_eq!(check.local_delay_ms, Some(30.0));

        let failed = Check::failed(t0);
        assert!(failed.ping_delay_ms.is_none());
        assert!(!failed.success);
    }

    #[test]
    fn test_amortized_priority_decreases() {
        assert!(amortized_priority(1) > amortized_priority(2));
        assert_eq!(amortized_priority(0), 0);
    }
}
