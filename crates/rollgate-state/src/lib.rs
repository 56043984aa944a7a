//! rollgate-state: embedded state store for Rollgate.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! state management for rollouts, their transition history, health rules,
//! metric snapshots, health events, and lock leases.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Composite keys (`{release_id}:{metric_id}`, `{platform_id}/{rule_id}`)
//! enable prefix scans for related records.
//!
//! Rollout writes go through [`StateStore::commit_rollout`], a
//! compare-and-swap on the record's `version` executed inside a single
//! write transaction. Health events are insert-if-absent on their
//! (release, rule, metric) key.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::{CommitOutcome, StateStore};
pub use types::*;
