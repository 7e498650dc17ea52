//! Domain types for the Vigil state store.
//!
//! These types represent the persisted endpoint configurations, the
//! per-endpoint runtime state mutated after every check, and the immutable
//! check-result records. All types are serializable to/from JSON for storage
//! in redb tables.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{StateError, StateResult};

/// Opaque, stable identifier of a monitored endpoint.
pub type EndpointId = String;

/// Smallest check interval accepted when an endpoint is created or updated.
pub const MIN_INTERVAL_SECS: u64 = 10;

/// Smallest per-check timeout accepted.
pub const MIN_TIMEOUT_SECS: u64 = 1;

// ── Endpoint ──────────────────────────────────────────────────────

/// Configuration of one monitored HTTP endpoint.
///
/// The scheduler never caches this across ticks; each tick fetches a fresh
/// snapshot so edits take effect on the next fire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EndpointConfig {
    pub id: EndpointId,
    pub name: String,
    /// Target URL (`http://` or `https://`).
    pub url: String,
    /// HTTP method, e.g. "GET" or "POST".
    #[serde(default = "default_method")]
    pub method: String,
    /// Seconds between checks.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    /// Seconds allowed for the whole request/response cycle.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Extra request headers; these win over the default identifying header.
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    /// Optional JSON request body.
    #[serde(default)]
    pub body: Option<serde_json::Value>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    /// Address that receives up/down alert emails.
    #[serde(default)]
    pub alert_email: Option<String>,
    /// URL that receives up/down alert webhooks.
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Unix timestamp (milliseconds) when this endpoint was created.
    #[serde(default)]
    pub created_at: u64,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_interval() -> u64 {
    60
}

fn default_timeout() -> u64 {
    5
}

fn default_active() -> bool {
    true
}

impl EndpointConfig {
    /// Check interval as a `Duration`.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Per-check timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Validate the rules enforced at creation and update time.
    pub fn validate(&self) -> StateResult<()> {
        validate_id(&self.id)?;
        if self.name.trim().is_empty() {
            return Err(StateError::Invalid("name must not be empty".into()));
        }
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(StateError::Invalid(format!(
                "url must start with http:// or https://, got {}",
                self.url
            )));
        }
        if self.method.is_empty() || !self.method.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(StateError::Invalid(format!("invalid method: {}", self.method)));
        }
        if self.interval_secs < MIN_INTERVAL_SECS {
            return Err(StateError::Invalid(format!(
                "interval must be at least {MIN_INTERVAL_SECS}s, got {}s",
                self.interval_secs
            )));
        }
        if self.timeout_secs < MIN_TIMEOUT_SECS {
            return Err(StateError::Invalid(format!(
                "timeout must be at least {MIN_TIMEOUT_SECS}s, got {}s",
                self.timeout_secs
            )));
        }
        Ok(())
    }
}

/// Endpoint ids become key prefixes in the check-result table, so `/` is reserved.
pub(crate) fn validate_id(id: &str) -> StateResult<()> {
    if id.is_empty() || id.contains('/') {
        return Err(StateError::InvalidKey(format!("endpoint id {id:?}")));
    }
    Ok(())
}

// ── Runtime state ─────────────────────────────────────────────────

/// Mutable fields attached to an endpoint, written after every check.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EndpointRuntimeState {
    /// Unix timestamp (milliseconds) of the last completed check.
    pub last_checked: Option<u64>,
    /// Raw outcome of the last check.
    pub last_success: Option<bool>,
    /// Debounced "currently down" flag as of the last check.
    pub threshold_down: bool,
}

// ── Check results ─────────────────────────────────────────────────

/// One immutable record per probe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckResult {
    pub endpoint_id: EndpointId,
    /// Absent when no response was received.
    pub status_code: Option<u16>,
    /// Always 0 for failed probes.
    pub response_time_ms: u64,
    pub success: bool,
    pub error: Option<String>,
    /// Unix timestamp (milliseconds).
    pub checked_at: u64,
}

impl CheckResult {
    /// A result for a request that produced a response.
    pub fn completed(
        endpoint_id: &str,
        status_code: u16,
        success: bool,
        response_time_ms: u64,
        checked_at: u64,
    ) -> Self {
        Self {
            endpoint_id: endpoint_id.to_string(),
            status_code: Some(status_code),
            response_time_ms,
            success,
            error: None,
            checked_at,
        }
    }

    /// A result for a request that never produced a response.
    pub fn failed(endpoint_id: &str, error: impl Into<String>, checked_at: u64) -> Self {
        Self {
            endpoint_id: endpoint_id.to_string(),
            status_code: None,
            response_time_ms: 0,
            success: false,
            error: Some(error.into()),
            checked_at,
        }
    }

    /// Build the composite key for the check-results table.
    pub fn table_key(&self, seq: u16) -> String {
        format!("{}/{:020}-{:04}", self.endpoint_id, self.checked_at, seq)
    }
}

// ── Stats ─────────────────────────────────────────────────────────

/// Aggregate figures over an endpoint's retained check log.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EndpointStats {
    pub total_checks: u64,
    pub successful_checks: u64,
    /// Mean response time in milliseconds, rounded to two decimals.
    pub average_response_time: f64,
    /// Share of successful checks (0–100), rounded to two decimals.
    pub uptime_percentage: f64,
}

/// Current unix time in milliseconds.
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
