//! Notifier: fans an alert out to every applicable channel without blocking the tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use vigil_health::Transition;
use vigil_state::{CheckResult, EndpointConfig};

use crate::alert::Alert;
use crate::channels::AlertChannel;

/// Upper bound on a single channel delivery.
pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Fans a transition out to every applicable channel.
#[derive(Clone)]
pub struct Notifier {
    channels: Vec<Arc<dyn AlertChannel>>,
    dispatch_timeout: Duration,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(DEFAULT_DISPATCH_TIMEOUT)
    }
}

impl Notifier {
    pub fn new(dispatch_timeout: Duration) -> Self {
        Self {
            channels: Vec::new(),
            dispatch_timeout,
        }
    }

    pub fn with_channel(mut self, channel: Arc<dyn AlertChannel>) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn channel_names(&self) -> Vec<&'static str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    /// Dispatch alerts for `transition` without waiting for them.
    ///
    /// Each delivery runs in its own task bounded by the dispatch timeout.
    /// The handles are returned for callers that want to observe completion;
    /// dropping them detaches the tasks.
    pub fn notify(
        &self,
        transition: Transition,
        endpoint: &EndpointConfig,
        result: &CheckResult,
    ) -> Vec<JoinHandle<()>> {
        let is_up = match transition {
            Transition::None => return Vec::new(),
            Transition::WentDown => false,
            Transition::WentUp => true,
        };
        let alert = Arc::new(Alert::new(endpoint, result, is_up));

        let mut handles = Vec::new();
        for channel in &self.channels {
            let Some(target) = channel.target(endpoint) else {
                debug!(endpoint_id = %endpoint.id, channel = channel.name(), "channel not configured");
                continue;
            };
            let channel = Arc::clone(channel);
            let alert = Arc::clone(&alert);
            let endpoint_id = endpoint.id.clone();
            let timeout = self.dispatch_timeout;

            handles.push(tokio::spawn(async move {
                let name = channel.name();
                match tokio::time::timeout(timeout, channel.deliver(&target, &alert)).await {
                    Ok(Ok(())) => info!(%endpoint_id, channel = name, %transition, "alert sent"),
                    Ok(Err(e)) => {
                        warn!(%endpoint_id, channel = name, error = %e, "alert delivery failed")
                    }
                    Err(_) => warn!(
                        %endpoint_id,
                        channel = name,
                        timeout_secs = timeout.as_secs(),
                        "alert delivery timed out"
                    ),
                }
            }));
        }
        handles
    }
}
