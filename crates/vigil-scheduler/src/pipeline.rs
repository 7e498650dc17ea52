//! One tick: fetch config, probe, evaluate, notify.

use std::sync::Arc;

use tracing::debug;

use vigil_health::{Probe, StateEvaluator, Transition};
use vigil_notify::Notifier;
use vigil_state::{StateResult, StateStore};

/// What a tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Endpoint deleted or deactivated since the job was registered.
    Skipped,
    Checked {
        success: bool,
        transition: Transition,
    },
}

/// The per-tick work, independent of any timer.
///
/// Callers must not run two ticks for the same endpoint at once.
pub struct CheckPipeline {
    store: StateStore,
    probe: Arc<dyn Probe>,
    evaluator: StateEvaluator,
    notifier: Notifier,
}

impl CheckPipeline {
    pub fn new(store: StateStore, probe: Arc<dyn Probe>, notifier: Notifier) -> Self {
        let evaluator = StateEvaluator::new(store.clone());
        Self {
            store,
            probe,
            evaluator,
            notifier,
        }
    }

    pub async fn run_tick(&self, endpoint_id: &str) -> StateResult<TickOutcome> {
        let Some(endpoint) = self.store.get_endpoint(endpoint_id)? else {
            debug!(%endpoint_id, "endpoint gone, skipping tick");
            return Ok(TickOutcome::Skipped);
        };
        if !endpoint.is_active {
            debug!(%endpoint_id, "endpoint inactive, skipping tick");
            return Ok(TickOutcome::Skipped);
        }

        let result = self.probe.execute(&endpoint).await;
        let transition = self.evaluator.evaluate(&result)?;
        // Dispatch is detached; the handles are not awaited.
        let _ = self.notifier.notify(transition, &endpoint, &result);

        Ok(TickOutcome::Checked {
            success: result.success,
            transition,
        })
    }
}
