//! Wire types for the status exchange
//!
//! One HTTP exchange (`POST /api/status`) carries two intents:
//! a health probe that may ask for discoveries, and an optional
//! announcement of the caller's own URL. Both are split out of the
//! raw request so each can be handled on its own.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Path of the status endpoint
pub const STATUS_PATH: &str = "/api/status";

/// Header carrying the responder's UTC time at reply construction
pub const REQUEST_TIME_HEADER: &str = "X-Request-Time";

/// Status value of a healthy reply
pub const STATUS_OK: &str = "OK";

// =============================================================================
// REQUEST
// =============================================================================

/// Body of `POST /api/status`.
///
/// Field names follow the camelCase wire shape; the capitalised names sent
/// by older nodes are accepted as aliases. Missing fields default, so an
/// empty object is a plain probe with no discovery and no announcement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusRequest {
    #[serde(rename = "discovery", alias = "Discovery")]
    pub discovery: bool,

    #[serde(rename = "discoveryLimit", alias = "DiscoveryLimit")]
    pub discovery_limit: i64,

    #[serde(rename = "discoverable", alias = "Discoverable")]
    pub discoverable: bool,

    #[serde(rename = "discoverableURL", alias = "DiscoverableURL")]
    pub discoverable_url: String,
}

impl StatusRequest {
    /// Build the request a prober sends: ask for discoveries and announce `own_url`.
    pub fn probe(discovery_limit: usize, own_url: &str) -> Self {
        Self {
            discovery: true,
            discovery_limit: i64::try_from(discovery_limit).unwrap_or(i64::MAX),
            discoverable: true,
            discoverable_url: own_url.to_string(),
        }
    }

    /// Decode a request body, treating anything malformed as an empty request.
    pub fn from_body(body: &[u8]) -> Self {
        serde_json::from_slice(body).unwrap_or_default()
    }

    /// Probe intent: `Some(limit)` when the caller wants discoveries.
    /// `limit` is `None` when the caller did not bound the reply.
    pub fn discovery_intent(&self) -> Option<Option<usize>> {
        if !self.discovery {
            return None;
        }
        let limit = usize::try_from(self.discovery_limit).ok().filter(|l| *l > 0);
        Some(limit)
    }

    /// Announce intent: the URL the caller wants to be registered under.
    pub fn announcement(&self) -> Option<&str> {
        let url = self.discoverable_url.trim();
        if self.discoverable && !url.is_empty() {
            Some(url)
        } else {
            None
        }
    }
}

// =============================================================================
// RESPONSE
// =============================================================================

/// Body of a status reply
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusResponse {
    #[serde(rename = "status", alias = "Status")]
    pub status: String,

    #[serde(rename = "discoveries", alias = "Discoveries")]
    pub discoveries: Vec<String>,
}

impl StatusResponse {
    pub fn ok(discoveries: Vec<String>) -> Self {
        Self {
            status: STATUS_OK.to_string(),
            discoveries,
        }
    }
}

// =============================================================================
// TIMESTAMPS
// =============================================================================

/// Format a reply timestamp (RFC3339, nanosecond precision, `Z` suffix)
pub fn format_request_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Parse a reply timestamp
pub fn parse_request_time(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
