//! Node Configuration
//!
//! Configurable parameters for a peer uptime node.
//! Loaded from an optional TOML file, then overridden by CLI flags
//! (which also read the `PEER_*` environment variables).

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Main configuration for a peer uptime node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    // === Server ===

    /// Interface the status server binds to
    pub listen_ip: String,

    /// Port the status server binds to
    pub port: u16,

    /// URL under which other peers reach this node.
    /// Announced on every probe and never registered as a peer.
    pub url: String,

    /// Start the status server (gossip responder)
    pub server_enabled: bool,

    // === Client ===

    /// Bootstrap peer registered at startup
    pub discovery_url: String,

    /// Memory factor `k` of the score smoothing (>= 1).
    /// Larger values weight history more heavily.
    pub memory_factor: u32,

    /// Pause between two probe cycles (milliseconds)
    pub waiting_time_ms: u64,

    /// Upper bound for a single probe round-trip (seconds)
    pub probe_timeout_secs: u64,

    /// Start the probe loop
    pub client_enabled: bool,

    // === Discovery ===

    /// Maximum peers exchanged in one discovery reply
    pub discovery_limit: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            // Server
            listen_ip: "0.0.0.0".to_string(),
            port: 8080,
            url: "http://127.0.0.1:8080".to_string(),
            server_enabled: true,

            // Client
            discovery_url: "http://localhost:8081".to_string(),
            memory_factor: 10,
            waiting_time_ms: 1000,
            probe_timeout_secs: 10,
            client_enabled: true,

            // Discovery
            discovery_limit: 5,
        }
    }
}

impl NodeConfig {
    /// Load configuration from TOML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    // Builder-style methods for CLI overrides. `None` keeps the loaded value.

    pub fn with_listen_ip(mut self, ip: Option<String>) -> Self {
        if let Some(ip) = ip {
            self.listen_ip = ip;
        }
        self
    }

    pub fn with_port(mut self, port: Option<u16>) -> Self {
        if let Some(port) = port {
            self.port = port;
        }
        self
    }

    pub fn with_url(mut self, url: Option<String>) -> Self {
        if let Some(url) = url {
            self.url = url;
        }
        self
    }

    pub fn with_discovery_url(mut self, url: Option<String>) -> Self {
        if let Some(url) = url {
            self.discovery_url = url;
        }
        self
    }

    pub fn with_memory_factor(mut self, factor: Option<u32>) -> Self {
        if let Some(factor) = factor {
            self.memory_factor = factor;
        }
        self
    }

    pub fn with_waiting_time_ms(mut self, ms: Option<u64>) -> Self {
        if let Some(ms) = ms {
            self.waiting_time_ms = ms;
        }
        self
    }

    pub fn with_discovery_limit(mut self, limit: Option<usize>) -> Self {
        if let Some(limit) = limit {
            self.discovery_limit = limit;
        }
        self
    }

    pub fn with_server_enabled(mut self, enabled: Option<bool>) -> Self {
        if let Some(enabled) = enabled {
            self.server_enabled = enabled;
        }
        self
    }

    pub fn with_client_enabled(mut self, enabled: Option<bool>) -> Self {
        if let Some(enabled) = enabled {
            self.client_enabled = enabled;
        }
        self
    }

    /// Socket address of the status server
    pub fn listen_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr = format!("{}:{}", self.listen_ip, self.port).parse()?;
        Ok(addr)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.waiting_time_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Validate configuration values
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.memory_factor < 1 {
            anyhow::bail!("memory_factor ({}) must be at least 1", self.memory_factor);
        }

        if self.url.trim().is_empty() {
            anyhow::bail!("url must not be empty");
        }

        if self.probe_timeout_secs == 0 {
            anyhow::bail!("probe_timeout_secs must be greater than 0");
        }

        if self.discovery_limit == 0 {
            anyhow::bail!("discovery_limit must be greater than 0");
        }

        if !self.server_enabled && !self.client_enabled {
            anyhow::bail!("at least one of server_enabled or client_enabled must be set");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = NodeConfig::default();
        assert_eq!(config.memory_factor, 10);
        assert_eq!(config.waiting_time_ms, 1000);
        assert_eq!(config.discovery_limit, 5);
        assert!(config.server_enabled);
        assert!(config.client_enabled);
    }

    #[test]
    fn test_config_validation() {
        let mut config = NodeConfig::default();
        assert!(config.validate().is_ok());

        config.memory_factor = 0;
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.server_enabled = false;
        config.client_enabled = false;
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.url = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builder_methods() {
        let config = NodeConfig::default()
            .with_port(Some(9090))
            .with_url(Some("http://10.0.0.1:9090".to_string()))
            .with_memory_factor(None)
            .with_client_enabled(Some(false));

        assert_eq!(config.port, 9090);
        assert_eq!(config.url, "http://10.0.0.1:9090");
        assert_eq!(config.memory_factor, 10);
        assert!(!config.client_enabled);
    }

    #[test]
    fn test_listen_addr() {
        let config = NodeConfig::default().with_listen_ip(Some("127.0.0.1".to_string()));
        let addr = config.listen_addr().unwrap();
        assert_eq!(addr.port(), 8080);
        assert!(addr.ip().is_loopback());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("peer-uptime.toml");

        let config = NodeConfig::default()
            .with_discovery_url(Some("http://seed.example:8080".to_string()))
            .with_discovery_limit(Some(12));
        config.save(&path).unwrap();

        let loaded = NodeConfig::load(&path).unwrap();
        assert_eq!(loaded.discovery_url, "http://seed.example:8080");
        assert_eq!(loaded.discovery_limit, 12);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "port = 9001\n").unwrap();

        let loaded = NodeConfig::load(&path).unwrap();
        assert_eq!(loaded.port, 9001);
        assert_eq!(loaded.memory_factor, 10);
    }
}
