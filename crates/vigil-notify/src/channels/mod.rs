use async_trait::async_trait;
use thiserror::Error;

use vigil_state::EndpointConfig;

use crate::alert::Alert;

pub mod email;
pub mod webhook;

#[derive(Error, Debug)]
pub enum SenderError {
    #[error("failed to send alert: {0}")]
    SendFailed(String),
    #[error("invalid channel configuration: {0}")]
    InvalidConfiguration(String),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("smtp error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// One way of delivering an alert.
///
/// `target` decides whether the channel applies to an endpoint at all;
/// a channel with no target for an endpoint is skipped without logging.
#[async_trait]
pub trait AlertChannel: Send + Sync {
    fn name(&self) -> &'static str;

    fn target(&self, endpoint: &EndpointConfig) -> Option<String>;

    async fn deliver(&self, target: &str, alert: &Alert) -> Result<(), SenderError>;
}
