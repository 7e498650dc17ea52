//! vigil-notify: alert dispatch for debounced state transitions.
//!
//! A `Notifier` owns a set of `AlertChannel`s. On `WentDown` / `WentUp` it
//! spawns one detached, time-bounded task per channel that applies to the
//! endpoint. Failures are logged and never reach the caller.

pub mod alert;
pub mod channels;
pub mod notifier;

pub use alert::Alert;
pub use channels::email::{EmailChannel, SmtpSettings};
pub use channels::webhook::WebhookChannel;
pub use channels::{AlertChannel, SenderError};
pub use notifier::{DEFAULT_DISPATCH_TIMEOUT, Notifier};
