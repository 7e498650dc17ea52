//! Alert payload shared by every channel.

use chrono::{DateTime, Utc};
use serde::Serialize;

use vigil_state::{CheckResult, EndpointConfig};

/// What gets announced for one transition. Serialized as-is for webhooks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    /// Endpoint display name.
    pub endpoint: String,
    pub url: String,
    pub is_up: bool,
    /// Status code as text, `"N/A"` when no response was received.
    pub status_code: String,
    /// Error description, `"None"` when the check completed.
    pub error: String,
    /// RFC 3339 time of the check that caused the transition.
    pub timestamp: String,
}

impl Alert {
    pub fn new(endpoint: &EndpointConfig, result: &CheckResult, is_up: bool) -> Self {
        let timestamp = i64::try_from(result.checked_at)
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();

        Self {
            endpoint: endpoint.name.clone(),
            url: endpoint.url.clone(),
            is_up,
            status_code: result
                .status_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "N/A".to_string()),
            error: result.error.clone().unwrap_or_else(|| "None".to_string()),
            timestamp,
        }
    }

    pub fn state_label(&self) -> &'static str {
        if self.is_up { "UP" } else { "DOWN" }
    }

    pub fn subject(&self) -> String {
        format!("[vigil] {} is {}", self.endpoint, self.state_label())
    }

    /// Plain-text body used by the email channel.
    pub fn text_body(&self) -> String {
        format!(
            "Endpoint: {}\nURL: {}\nStatus: {}\nStatus code: {}\nError: {}\nTime: {}\n",
            self.endpoint,
            self.url,
            self.state_label(),
            self.status_code,
            self.error,
            self.timestamp,
        )
    }
}
