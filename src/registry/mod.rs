//! Peer Registry Module
//!
//! Owns the peer set (URL -> Host), the registration order used for
//! discovery replies, the probe scheduler and the global probe counter.
//! Kept in memory only; history does not survive restarts.
//!
//! All access goes through a single `RwLock` (`SharedRegistry`), so the
//! map, the key list and the scheduler always change together.

pub mod scheduler;
pub mod scoring;

use rand::seq::SliceRandom;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

pub use scheduler::{ScheduleEntry, ScheduleError, Scheduler};
pub use scoring::{Check, Checks, Transition};

/// Registry shared between the status server and the probe loop
pub type SharedRegistry = Arc<RwLock<Registry>>;

/// A monitored peer
#[derive(Debug, Clone, Serialize)]
pub struct Host {
    /// Unique, immutable key
    pub url: String,

    /// Current scheduling weight, mirrored from the scheduler
    pub priority: i64,

    /// Check history and statistics
    pub checks: Checks,
}

impl Host {
    fn new(url: &str, priority: i64) -> Self {
        Self {
            url: url.to_string(),
            priority,
            checks: Checks::new(),
        }
    }
}

/// Summary of the registry state
#[derive(Debug, Clone, Default, Serialize)]
pub struct RegistryStats {
    /// Total known peers
    pub total_peers: usize,

    /// Peers whose last check succeeded
    pub online_peers: usize,

    /// Peers whose last check failed
    pub offline_peers: usize,

    /// Peers never probed yet
    pub unchecked_peers: usize,

    /// Mean score over all peers
    pub average_score: f64,

    /// Probe cycles started so far
    pub probe_counter: u64,
}

/// In-memory peer registry
#[derive(Debug)]
pub struct Registry {
    /// This node's advertised URL, never registered
    local_url: String,

    hosts: HashMap<String, Host>,

    /// URLs in registration order
    keys: Vec<String>,

    scheduler: Scheduler,

    /// Incremented once per probe cycle
    probe_counter: u64,
}

impl Registry {
    pub fn new(local_url: impl Into<String>) -> Self {
        Self {
            local_url: local_url.into(),
            hosts: HashMap::new(),
            keys: Vec::new(),
            scheduler: Scheduler::new(),
            probe_counter: 0,
        }
    }

    /// Wrap in the shared lock used by the node's tasks
    pub fn shared(self) -> SharedRegistry {
        Arc::new(RwLock::new(self))
    }

    pub fn lookup(&self, url: &str) -> Option<&Host> {
        self.hosts.get(url)
    }

    pub fn contains(&self, url: &str) -> bool {
        self.hosts.contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Entries held by the scheduler, one per host
    pub fn scheduled_len(&self) -> usize {
        self.scheduler.len()
    }

    pub fn probe_counter(&self) -> u64 {
        self.probe_counter
    }

    /// Register a newly discovered peer on the fast track.
    ///
    /// No-op (returns false) for known URLs, the node's own URL and blanks.
    pub fn register(&mut self, url: &str) -> bool {
        let url = url.trim();
        if url.is_empty() || url == self.local_url || self.hosts.contains_key(url) {
            return false;
        }

        let Some(priority) = self.scheduler.insert(url) else {
            return false;
        };

        self.hosts.insert(url.to_string(), Host::new(url, priority));
        self.keys.push(url.to_string());

        info!("🔭 Discovered new host: {}", url);
        true
    }

    /// Register every URL of a discovery list; returns how many were new
    pub fn merge<'a>(&mut self, urls: impl IntoIterator<Item = &'a str>) -> usize {
        urls.into_iter().filter(|url| self.register(url)).count()
    }

    /// Known URLs in registration order
    pub fn snapshot(&self) -> Vec<String> {
        self.keys.clone()
    }

    /// At most `limit` known URLs: the whole snapshot when it fits,
    /// otherwise a uniform sample without repetition.
    pub fn sample(&self, limit: usize) -> Vec<String> {
        if self.keys.len() <= limit {
            return self.snapshot();
        }

        let mut rng = rand::thread_rng();
        self.keys
            .choose_multiple(&mut rng, limit)
            .cloned()
            .collect()
    }

    /// Start a probe cycle: advance the counter and pick the next host.
    pub fn begin_cycle(&mut self) -> Result<ScheduleEntry, ScheduleError> {
        let entry = self.scheduler.next()?;
        self.probe_counter += 1;
        Ok(entry)
    }

    /// Finish a probe cycle: score the check and re-rank the host.
    ///
    /// Returns the availability transition, if any.
    pub fn complete_cycle(&mut self, url: &str, check: Check, memory_factor: f64) -> Option<Transition> {
        let priority = scoring::amortized_priority(self.probe_counter);
        let host = self.hosts.get_mut(url)?;

        let transition = host.checks.record(check, memory_factor);
        host.priority = priority;
        self.scheduler.reprioritize(url, priority);

        debug!(
            "Host {} rescored: score={:.3} average={:.3} priority={}",
            url,
            host.checks.score(),
            host.checks.average(),
            priority
        );

        transition
    }

    /// Hosts in registration order
    pub fn hosts(&self) -> impl Iterator<Item = &Host> {
        self.keys.iter().filter_map(|url| self.hosts.get(url))
    }

    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats {
            total_peers: self.hosts.len(),
            probe_counter: self.probe_counter,
            ..Default::default()
        };

        for host in self.hosts.values() {
            match host.checks.last() {
                Some(check) if check.success => stats.online_peers += 1,
                Some(_) => stats.offline_peers += 1,
                None => stats.unchecked_peers += 1,
            }
        }

        if !self.hosts.is_empty() {
            stats.average_score = self.hosts.values().map(|h| h.checks.score()).sum::<f64>()
                / self.hosts.len() as f64;
        }

        stats
    }
}
