//! HTTP API Module
//!
//! Serves the gossip status exchange (`POST /api/status`) together with
//! liveness, metrics and registry monitoring endpoints.

mod routes;
mod metrics;

pub use routes::run_api_server;
#[cfg(test)]
pub use routes::serve;
pub use metrics::Metrics;
