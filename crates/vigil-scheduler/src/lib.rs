//! vigil-scheduler: per-endpoint check timers.
//!
//! Holds one recurring timer per active endpoint and drives the tick
//! pipeline (probe, evaluate, notify) on each fire. Jobs can be added,
//! replaced and removed while the process runs.
//!
//! # Architecture
//!
//! ```text
//! MonitorScheduler
//!   ├── jobs: endpoint_id → ScheduledJob (timer task + cancel signal)
//!   ├── gates: endpoint_id → tick gate (serializes ticks per endpoint)
//!   ├── CheckPipeline
//!   │     ├── StateStore (fresh config snapshot per tick)
//!   │     ├── Probe
//!   │     ├── StateEvaluator
//!   │     └── Notifier (detached dispatch)
//!   └── RetentionSweeper (own timer, outlives reloads)
//! ```

pub mod error;
pub mod pipeline;
pub mod registry;
pub mod retention;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{SchedulerError, SchedulerResult};
pub use pipeline::{CheckPipeline, TickOutcome};
pub use registry::MonitorScheduler;
pub use retention::{DEFAULT_MAX_AGE, DEFAULT_SWEEP_PERIOD, RetentionSweeper};
