//! Debounced health evaluation.
//!
//! The check log is the only history: the evaluator appends each new result,
//! reads back the most recent window and compares the debounced verdict
//! with the flag stored on the endpoint's runtime state.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use vigil_state::{CheckResult, StateResult, StateStore};

/// Number of most recent results considered.
pub const HISTORY_WINDOW: usize = 5;

/// Failures within the window needed to call an endpoint down.
pub const DOWN_THRESHOLD: usize = 4;

/// Change of debounced state between two consecutive ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    None,
    WentDown,
    WentUp,
}

impl Transition {
    /// Whether this transition should be announced.
    pub fn is_change(self) -> bool {
        !matches!(self, Transition::None)
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Transition::None => "none",
            Transition::WentDown => "went_down",
            Transition::WentUp => "went_up",
        };
        f.write_str(s)
    }
}

/// Count failed results.
pub fn count_failures(results: &[CheckResult]) -> usize {
    results.iter().filter(|r| !r.success).count()
}

/// Debounced verdict for a number of failures inside the window.
pub fn is_debounced_down(failures: usize) -> bool {
    failures >= DOWN_THRESHOLD
}

/// Compare the stored debounced state with the fresh one.
pub fn detect_transition(previously_down: bool, currently_down: bool) -> Transition {
    match (previously_down, currently_down) {
        (false, true) => Transition::WentDown,
        (true, false) => Transition::WentUp,
        _ => Transition::None,
    }
}

/// Store-backed evaluator.
///
/// Callers must serialize `evaluate` per endpoint; the read of the previous
/// flag and the write of the new one are not atomic on their own.
#[derive(Clone)]
pub struct StateEvaluator {
    store: StateStore,
}

impl StateEvaluator {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    /// Persist `result`, update the endpoint's runtime state and report
    /// whether its debounced state changed.
    pub fn evaluate(&self, result: &CheckResult) -> StateResult<Transition> {
        let endpoint_id = result.endpoint_id.as_str();
        self.store.append_check_result(result)?;

        let recent = self.store.query_recent_results(endpoint_id, HISTORY_WINDOW)?;
        let failures = count_failures(&recent);
        let currently_down = is_debounced_down(failures);

        let previous = self.store.get_runtime_state(endpoint_id)?;
        let transition = detect_transition(previous.threshold_down, currently_down);

        let recorded = self.store.update_runtime_state(
            endpoint_id,
            result.checked_at,
            result.success,
            currently_down,
        )?;
        if !recorded {
            debug!(%endpoint_id, "endpoint deleted during check, state not updated");
            return Ok(Transition::None);
        }

        match transition {
            Transition::WentDown => warn!(
                %endpoint_id,
                failures,
                window = recent.len(),
                "endpoint went down"
            ),
            Transition::WentUp => info!(%endpoint_id, failures, "endpoint recovered"),
            Transition::None => debug!(%endpoint_id, failures, currently_down, "no state change"),
        }
        Ok(transition)
    }
}
