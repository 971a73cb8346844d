//! Probe Module
//!
//! Runs the serial probe loop: pick the highest-priority host, send it a
//! status request, score the resulting check and re-rank the host.
//!
//! ## Cycle
//!
//! 1. Lock registry, advance the probe counter, peek the next host
//! 2. Release the lock and POST /api/status (bounded by the probe timeout)
//! 3. Lock registry, merge discoveries, record the check, reprioritize
//!
//! Probe failures never leave this module: they become failed checks and
//! the next scheduled cycle is the retry.

use chrono::{DateTime, Utc};
use reqwest::header::CONTENT_TYPE;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::api::Metrics;
use crate::config::NodeConfig;
use crate::registry::{Check, ScheduleError, SharedRegistry, Transition};
use crate::types::{self, StatusRequest, StatusResponse, STATUS_PATH};

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Transport failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Protocol violation: {0}")]
    Protocol(String),
}

/// What one probe exchange produced
#[derive(Debug, Clone)]
pub struct ProbeReport {
    pub check: Check,

    /// Peers advertised by the responder (empty on failure)
    pub discoveries: Vec<String>,
}

/// HTTP client performing single health checks
#[derive(Debug, Clone)]
pub struct Prober {
    client: reqwest::Client,
    own_url: String,
    discovery_limit: usize,
}

impl Prober {
    pub fn new(config: &NodeConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.probe_timeout())
            .build()?;

        Ok(Self {
            client,
            own_url: config.url.clone(),
            discovery_limit: config.discovery_limit,
        })
    }

    /// Probe `url` once. Any failure yields a failed check started at T0.
    pub async fn probe(&self, url: &str) -> ProbeReport {
        let t0 = Utc::now();

        match self.exchange(url, t0).await {
            Ok((check, response)) => ProbeReport {
                check,
                discoveries: response.discoveries,
            },
            Err(e) => {
                warn!("Probe of {} failed: {}", url, e);
                ProbeReport {
                    check: Check::failed(t0),
                    discoveries: Vec::new(),
                }
            }
        }
    }

    async fn exchange(
        &self,
        url: &str,
        t0: DateTime<Utc>,
    ) -> Result<(Check, StatusResponse), ProbeError> {
        let request = StatusRequest::probe(self.discovery_limit, &self.own_url);
        let body = serde_json::to_vec(&request)?;

        let endpoint = format!("{}{}", url.trim_end_matches('/'), STATUS_PATH);
        let response = self
            .client
            .post(&endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ProbeError::Protocol(format!("HTTP status {}", response.status())));
        }

        let tr = response
            .headers()
            .get(types::REQUEST_TIME_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(types::parse_request_time)
            .ok_or_else(|| ProbeError::Protocol("missing or invalid request time".to_string()))?;

        let bytes = response.bytes().await?;
        let t3 = Utc::now();

        let status: StatusResponse = serde_json::from_slice(&bytes)
            .map_err(|e| ProbeError::Protocol(format!("undecodable body: {}", e)))?;

        if status.status != types::STATUS_OK {
            return Err(ProbeError::Protocol(format!("unexpected status {:?}", status.status)));
        }

        Ok((Check::succeeded(t0, tr, t3), status))
    }
}

/// Run probe cycles forever, sleeping `waiting_time_ms` between them
pub async fn run_probe_loop(
    config: Arc<NodeConfig>,
    registry: SharedRegistry,
    metrics: Arc<Metrics>,
) -> anyhow::Result<()> {
    let prober = Prober::new(&config)?;
    info!("🔁 Probe loop started (interval {}ms)", config.waiting_time_ms);

    loop {
        if let Err(ScheduleError::EmptyRegistry) =
            run_cycle(&prober, &registry, &metrics, config.memory_factor).await
        {
            warn!("No hosts to check, skipping cycle");
        }

        tokio::time::sleep(config.probe_interval()).await;
    }
}

/// One probe cycle. Returns the probed URL and its new check.
pub async fn run_cycle(
    prober: &Prober,
    registry: &SharedRegistry,
    metrics: &Metrics,
    memory_factor: u32,
) -> Result<(String, Check), ScheduleError> {
    let entry = {
        let mut reg = registry.write().await;
        reg.begin_cycle()?
    };

    debug!("Checking {} (priority {})", entry.url, entry.priority);
    metrics.inc_probes_sent();

    let report = prober.probe(&entry.url).await;

    if report.check.success {
        metrics.inc_probes_succeeded();
        debug!(
            "{} answered ({:?}ms ping, {:?}ms pong, {:?}ms local)",
            entry.url,
            report.check.ping_delay_ms,
            report.check.pong_delay_ms,
            report.check.local_delay_ms
        );
    } else {
        metrics.inc_probes_failed();
    }

    let transition = {
        let mut reg = registry.write().await;
        let added = reg.merge(report.discoveries.iter().map(String::as_str));
        if added > 0 {
            metrics.add_peers_discovered(added as u64);
        }
        metrics.set_known_peers(reg.len() as u64);

        reg.complete_cycle(&entry.url, report.check.clone(), f64::from(memory_factor))
    };

    match transition {
        Some(Transition::FirstOnline) => info!("🟢 Host {} is online for the first time", entry.url),
        Some(Transition::WentOffline { .. }) => warn!("🔴 Host {} is offline", entry.url),
        Some(Transition::BackOnline { outage }) => info!(
            "🟢 Host {} is back online after {}s",
            entry.url,
            outage.num_milliseconds() as f64 / 1000.0
        ),
        None => {}
    }

    Ok((entry.url, report.check))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use axum::Json;
    use std::sync::atomic::Ordering;

    fn test_config() -> NodeConfig {
        let mut config = NodeConfig::default();
        config.url = "http://127.0.0.1:1".to_string();
        config.probe_timeout_secs = 2;
        config
    }

    #[tokio::test]
    async fn test_unreachable_host_yields_failed_check() {
        let prober = Prober::new(&test_config()).unwrap();

        let before = Utc::now();
        let report = prober.probe("http://127.0.0.1:9").await;

        assert!(!report.check.success);
        assert!(report.check.time >= before);
        assert!(report.check.local_delay_ms.is_none());
        assert!(report.discoveries.is_empty());
    }

    #[tokio::test]
    async fn test_empty_registry_cycle_is_skipped() {
        let config = test_config();
        let prober = Prober::new(&config).unwrap();
        let registry = Registry::new(config.url.clone()).shared();
        let metrics = Metrics::new();

        let result = run_cycle(&prober, &registry, &metrics, config.memory_factor).await;
        assert_eq!(result.unwrap_err(), ScheduleError::EmptyRegistry);
        assert_eq!(metrics.probes_sent.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_failed_cycle_updates_score() {
        let config = test_config();
        let prober = Prober::new(&config).unwrap();
        let mut registry = Registry::new(config.url.clone());
        registry.register("http://127.0.0.1:9");
        let registry = registry.shared();
        let metrics = Metrics::new();

        let (url, check) = run_cycle(&prober, &registry, &metrics, 10).await.unwrap();
        assert_eq!(url, "http://127.0.0.1:9");
        assert!(!check.success);

        let reg = registry.read().await;
        let host = reg.lookup(&url).unwrap();
        assert_eq!(host.checks.size(), 1);
        assert_eq!(host.checks.score(), 0.0);
        assert_eq!(host.priority, -1);
        assert_eq!(metrics.probes_failed.load(Ordering::Relaxed), 1);
    }

    // Responders that answer but break the exchange contract

    fn peers_body() -> Json<serde_json::Value> {
        Json(serde_json::json!({ "status": "OK", "discoveries": ["http://x:1"] }))
    }

    fn fresh_stamp() -> [(&'static str, String); 1] {
        [(types::REQUEST_TIME_HEADER, types::format_request_time(Utc::now()))]
    }

    fn reply_without_stamp() -> Response {
        (StatusCode::OK, peers_body()).into_response()
    }

    fn reply_with_bad_stamp() -> Response {
        (StatusCode::OK, [(types::REQUEST_TIME_HEADER, "yesterday".to_string())], peers_body()).into_response()
    }

    fn reply_with_garbage_body() -> Response {
        (StatusCode::OK, fresh_stamp(), "garbage").into_response()
    }

    fn reply_with_server_error() -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, fresh_stamp(), peers_body()).into_response()
    }

    fn reply_with_empty_object() -> Response {
        (StatusCode::OK, fresh_stamp(), Json(serde_json::json!({}))).into_response()
    }

    async fn spawn_responder(reply: fn() -> Response) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let app = axum::Router::new().route(STATUS_PATH, axum::routing::post(move || async move { reply() }));
        tokio::spawn(async move { axum::serve(listener, app).await });
        url
    }

    async fn assert_rejected(reply: fn() -> Response) {
        let url = spawn_responder(reply).await;
        let config = test_config();
        let prober = Prober::new(&config).unwrap();

        let report = prober.probe(&url).await;
        assert!(!report.check.success);
        assert!(report.check.local_delay_ms.is_none());
        assert!(report.discoveries.is_empty());

        let mut registry = Registry::new(config.url.clone());
        registry.register(&url);
        let registry = registry.shared();
        let metrics = Metrics::new();

        let (probed, check) = run_cycle(&prober, &registry, &metrics, config.memory_factor).await.unwrap();
        assert_eq!(probed, url);
        assert!(!check.success);

        let reg = registry.read().await;
        assert_eq!(reg.snapshot(), vec![url.clone()]);
        assert_eq!(reg.lookup(&url).unwrap().checks.score(), 0.0);
        assert_eq!(metrics.probes_failed.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_missing_request_time_fails_check() {
        assert_rejected(reply_without_stamp).await;
    }

    #[tokio::test]
    async fn test_unparseable_request_time_fails_check() {
        assert_rejected(reply_with_bad_stamp).await;
    }

    #[tokio::test]
    async fn test_undecodable_body_fails_check() {
        assert_rejected(reply_with_garbage_body).await;
    }

    #[tokio::test]
    async fn test_server_error_fails_check() {
        assert_rejected(reply_with_server_error).await;
    }

    #[tokio::test]
    async fn test_body_without_ok_status_fails_check() {
        assert_rejected(reply_with_empty_object).await;
    }
}
