//! Test doubles shared by the pipeline and registry tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use vigil_health::Probe;
use vigil_notify::{Alert, AlertChannel, Notifier, SenderError};
use vigil_state::{CheckResult, EndpointConfig, StateStore};

use crate::pipeline::CheckPipeline;

/// Probe that plays back a list of outcomes (`true` = up), then stays up.
#[derive(Default)]
pub struct ScriptedProbe {
    outcomes: Mutex<VecDeque<bool>>,
    delay: Duration,
    panic_on_first: bool,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedProbe {
    pub fn up() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn scripted(outcomes: &[bool]) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.iter().copied().collect()),
            ..Self::default()
        })
    }

    pub fn slow(outcomes: &[bool], delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.iter().copied().collect()),
            delay,
            ..Self::default()
        })
    }

    pub fn panicking_once() -> Arc<Self> {
        Arc::new(Self {
            panic_on_first: true,
            ..Self::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Probe for ScriptedProbe {
    async fn execute(&self, endpoint: &EndpointConfig) -> CheckResult {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panic_on_first && call == 0 {
            panic!("probe exploded");
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        // Synthetic clock keeps result ordering independent of wall time.
        let checked_at = 1_000_000 + call as u64 * 1_000;
        let up = self.outcomes.lock().unwrap().pop_front().unwrap_or(true);
        if up {
            CheckResult::completed(&endpoint.id, 200, true, 7, checked_at)
        } else {
            CheckResult::failed(&endpoint.id, "Timeout", checked_at)
        }
    }
}

/// Channel that records every alert it receives.
#[derive(Default)]
pub struct RecordingChannel {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingChannel {
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlertChannel for RecordingChannel {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn target(&self, endpoint: &EndpointConfig) -> Option<String> {
        Some(endpoint.id.clone())
    }

    async fn deliver(&self, _target: &str, alert: &Alert) -> Result<(), SenderError> {
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

pub fn endpoint(id: &str, is_active: bool) -> EndpointConfig {
    EndpointConfig {
        id: id.to_string(),
        name: format!("{id}-name"),
        url: format!("http://{id}.internal/health"),
        method: "GET".into(),
        interval_secs: 10,
        timeout_secs: 1,
        headers: None,
        body: None,
        is_active,
        alert_email: None,
        webhook_url: None,
        created_at: 0,
    }
}

/// In-memory store, pipeline around `probe`, and the channel it alerts.
pub fn pipeline_with(
    probe: Arc<ScriptedProbe>,
) -> (StateStore, CheckPipeline, Arc<RecordingChannel>) {
    let store = StateStore::open_in_memory().unwrap();
    let channel = Arc::new(RecordingChannel::default());
    let notifier = Notifier::default().with_channel(channel.clone());
    let pipeline = CheckPipeline::new(store.clone(), probe, notifier);
    (store, pipeline, channel)
}
