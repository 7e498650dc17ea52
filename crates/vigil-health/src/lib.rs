//! vigil-health: check execution and debounced health evaluation.
//!
//! Each tick of an endpoint's schedule runs one probe and feeds its result
//! to the evaluator, which persists it and decides whether the endpoint's
//! debounced state changed.
//!
//! # Architecture
//!
//! ```text
//! Probe (trait)
//!   └── HttpChecker ── reqwest ──▶ target endpoint
//!         └── CheckResult (never an error)
//!
//! StateEvaluator
//!   ├── append CheckResult to the log
//!   ├── read the last HISTORY_WINDOW results (newest first)
//!   ├── down = failures >= DOWN_THRESHOLD
//!   └── compare with stored threshold_down → Transition
//! ```
//!
//! A 4-of-5 majority rule tolerates a single transient blip while still
//! reacting within four ticks of a real outage.

pub mod checker;
pub mod evaluator;

pub use checker::{HttpChecker, Probe, USER_AGENT, is_success_status};
pub use evaluator::{DOWN_THRESHOLD, HISTORY_WINDOW, StateEvaluator, Transition};
