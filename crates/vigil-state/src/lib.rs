//! vigil-state: embedded state store for Vigil.
//!
//! Backed by [redb](https://docs.rs/redb), holds the monitored endpoint
//! configurations, each endpoint's mutable runtime state, and the
//! append-only log of check results.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Check results are keyed `{endpoint_id}/{checked_at_ms:020}-{n:04}` so a
//! reverse range scan over one endpoint's prefix yields its history
//! most-recent-first.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
