use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

use vigil_state::EndpointConfig;

use super::{AlertChannel, SenderError};
use crate::alert::Alert;

/// Process-wide mail transport settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SmtpSettings {
    pub host: Option<String>,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
}

impl SmtpSettings {
    /// Email is only usable when host, user and password are all present.
    pub fn is_complete(&self) -> bool {
        [&self.host, &self.username, &self.password]
            .iter()
            .all(|v| v.as_deref().is_some_and(|s| !s.is_empty()))
    }
}

/// Sends plain-text alert mail over SMTP with STARTTLS.
#[derive(Clone)]
pub struct EmailChannel {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailChannel {
    /// Build the channel, or `None` when the settings leave email disabled.
    pub fn from_settings(settings: &SmtpSettings) -> Result<Option<Self>, SenderError> {
        let (Some(host), Some(username), Some(password)) = (
            settings.host.as_deref(),
            settings.username.as_deref(),
            settings.password.as_deref(),
        ) else {
            return Ok(None);
        };
        if !settings.is_complete() {
            return Ok(None);
        }

        let from: Mailbox = settings
            .from
            .parse()
            .map_err(|e| SenderError::InvalidConfiguration(format!("from address: {e}")))?;
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?
            .port(settings.port)
            .credentials(Credentials::new(username.to_string(), password.to_string()))
            .build();

        info!(host, port = settings.port, "email alerts enabled");
        Ok(Some(Self { transport, from }))
    }
}

/// Assemble the alert mail.
pub fn build_message(from: &Mailbox, to: &str, alert: &Alert) -> Result<Message, SenderError> {
    let to: Mailbox = to
        .parse()
        .map_err(|e| SenderError::InvalidConfiguration(format!("recipient {to:?}: {e}")))?;
    Message::builder()
        .from(from.clone())
        .to(to)
        .subject(alert.subject())
        .header(ContentType::TEXT_PLAIN)
        .body(alert.text_body())
        .map_err(|e| SenderError::SendFailed(e.to_string()))
}

#[async_trait]
impl AlertChannel for EmailChannel {
    fn name(&self) -> &'static str {
        "email"
    }

    fn target(&self, endpoint: &EndpointConfig) -> Option<String> {
        endpoint.alert_email.clone().filter(|a| !a.is_empty())
    }

    async fn deliver(&self, target: &str, alert: &Alert) -> Result<(), SenderError> {
        let message = build_message(&self.from, target, alert)?;
        self.transport.send(message).await?;
        Ok(())
    }
}
