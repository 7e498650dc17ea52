//! Daily deletion of old check results.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info};

use vigil_state::{StateResult, StateStore, epoch_millis};

pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);
pub const DEFAULT_SWEEP_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

/// Removes results older than `max_age` every `period`.
///
/// A result exactly `max_age` old is kept.
#[derive(Clone)]
pub struct RetentionSweeper {
    store: StateStore,
    max_age: Duration,
    period: Duration,
}

impl RetentionSweeper {
    pub fn new(store: StateStore) -> Self {
        Self {
            store,
            max_age: DEFAULT_MAX_AGE,
            period: DEFAULT_SWEEP_PERIOD,
        }
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Sweep as if the current time were `now_ms`.
    pub fn sweep_at(&self, now_ms: u64) -> StateResult<u32> {
        let cutoff = now_ms.saturating_sub(self.max_age.as_millis() as u64);
        self.store.delete_results_older_than(cutoff)
    }

    /// Sweep every period until shutdown. The first sweep happens one
    /// period after start.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        debug!(period_secs = self.period.as_secs(), "retention sweeper starting");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.period) => {
                    match self.sweep_at(epoch_millis()) {
                        Ok(deleted) => info!(deleted, "retention sweep complete"),
                        Err(e) => error!(error = %e, "retention sweep failed"),
                    }
                }
                _ = shutdown.changed() => {
                    debug!("retention sweeper shutting down");
                    break;
                }
            }
        }
    }
}
