use async_trait::async_trait;
use reqwest::Client;

use vigil_state::EndpointConfig;

use super::{AlertChannel, SenderError};
use crate::alert::Alert;

/// Pushes the alert as a JSON POST to the endpoint's webhook URL.
#[derive(Clone, Default)]
pub struct WebhookChannel {
    client: Client,
}

impl WebhookChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AlertChannel for WebhookChannel {
    fn name(&self) -> &'static str {
        "webhook"
    }

    fn target(&self, endpoint: &EndpointConfig) -> Option<String> {
        endpoint.webhook_url.clone().filter(|u| !u.is_empty())
    }

    async fn deliver(&self, target: &str, alert: &Alert) -> Result<(), SenderError> {
        let response = self.client.post(target).json(alert).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SenderError::SendFailed(format!(
                "webhook returned non-success status: {status}"
            )));
        }
        Ok(())
    }
}
