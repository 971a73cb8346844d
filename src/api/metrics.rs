//! Metrics Collection
//!
//! Collects and exposes metrics for monitoring the node.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Metrics collector for a peer uptime node
#[derive(Default)]
pub struct Metrics {
    /// Start time for uptime calculation
    start_time: Option<Instant>,

    /// Probes sent by the probe loop
    pub probes_sent: AtomicU64,

    /// Probes that produced a successful check
    pub probes_succeeded: AtomicU64,

    /// Probes that produced a failed check
    pub probes_failed: AtomicU64,

    /// Inbound status requests answered
    pub status_requests: AtomicU64,

    /// Peers added to the registry (gossip and announcements)
    pub peers_discovered: AtomicU64,

    /// Current registry size
    pub known_peers: AtomicU64,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time
            .map(|t| t.elapsed().as_secs())
            .unwrap_or(0)
    }

    pub fn inc_probes_sent(&self) {
        self.probes_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_probes_succeeded(&self) {
        self.probes_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_probes_failed(&self) {
        self.probes_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_status_requests(&self) {
        self.status_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_peers_discovered(&self, count: u64) {
        self.peers_discovered.fetch_add(count, Ordering::Relaxed);
    }

    pub fn set_known_peers(&self, count: u64) {
        self.known_peers.store(count, Ordering::Relaxed);
    }

    /// Export metrics in Prometheus format
    pub fn to_prometheus(&self) -> String {
        let mut output = String::new();

        let series = [
            ("uptime_seconds", "gauge", "Node uptime in seconds", self.uptime_secs()),
            ("probes_total", "counter", "Probes sent", self.probes_sent.load(Ordering::Relaxed)),
            (
                "probes_succeeded_total",
                "counter",
                "Probes answered successfully",
                self.probes_succeeded.load(Ordering::Relaxed),
            ),
            (
                "probes_failed_total",
                "counter",
                "Probes that failed",
                self.probes_failed.load(Ordering::Relaxed),
            ),
            (
                "status_requests_total",
                "counter",
                "Inbound status requests answered",
                self.status_requests.load(Ordering::Relaxed),
            ),
            (
                "peers_discovered_total",
                "counter",
                "Peers added to the registry",
                self.peers_discovered.load(Ordering::Relaxed),
            ),
            ("known_peers", "gauge", "Peers in the registry", self.known_peers.load(Ordering::Relaxed)),
        ];

        for (name, kind, help, value) in series {
            output.push_str(&format!(
                "# HELP peer_uptime_{name} {help}\n\
                 # TYPE peer_uptime_{name} {kind}\n\
                 peer_uptime_{name} {value}\n\n"
            ));
        }

        output
    }

    /// Export metrics as JSON
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "uptime_secs": self.uptime_secs(),
            "probes": {
                "sent": self.probes_sent.load(Ordering::Relaxed),
                "succeeded": self.probes_succeeded.load(Ordering::Relaxed),
                "failed": self.probes_failed.load(Ordering::Relaxed),
            },
            "status_requests": self.status_requests.load(Ordering::Relaxed),
            "peers": {
                "discovered": self.peers_discovered.load(Ordering::Relaxed),
                "known": self.known_peers.load(Ordering::Relaxed),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_increment() {
        let metrics = Metrics::new();

        metrics.inc_probes_sent();
        metrics.inc_probes_sent();
        metrics.inc_probes_succeeded();
        metrics.add_peers_discovered(3);

        assert_eq!(metrics.probes_sent.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.probes_succeeded.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.peers_discovered.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.set_known_peers(42);
        metrics.inc_status_requests();

        let output = metrics.to_prometheus();

        assert!(output.contains("peer_uptime_known_peers 42"));
        assert!(output.contains("peer_uptime_status_requests_total 1"));
        assert!(output.contains("# TYPE peer_uptime_probes_total counter"));
    }

    #[test]
    fn test_json_format() {
        let metrics = Metrics::new();
        metrics.inc_probes_failed();

        let json = metrics.to_json();

        assert_eq!(json["probes"]["failed"], 1);
        assert_eq!(json["peers"]["known"], 0);
    }
}
