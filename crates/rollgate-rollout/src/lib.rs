//! Rollgate staged rollouts: state machine, controller, scheduler, halts.
//!
//! A rollout moves one build from 0% to 100% exposure on one store channel.
//! The transition table is pure; the controller executes it against a
//! [`StoreClient`](rollgate_storefront::StoreClient) under the account
//! scope's lock and commits each transition with a version
//! compare-and-swap.
//!
//! # Components
//!
//! - **`stages`**: stage arithmetic (`reached_last_stage`, next percentage)
//! - **`machine`**: transition table: (record, command) → plan or skip
//! - **`controller`**: lock, store call, commit, parent notifications
//! - **`registry`**: store client per store family
//! - **`parent`**: the owning release's lifecycle contract
//! - **`scheduler`**: automatic stage advancement
//! - **`halt`**: halt signals from health evaluation

pub mod controller;
pub mod error;
pub mod halt;
pub mod machine;
pub mod parent;
pub mod registry;
pub mod scheduler;
pub mod stages;

pub use controller::{LockMode, NewRollout, Outcome, RolloutController};
pub use error::{RolloutError, RolloutResult};
pub use halt::HaltWorker;
pub use machine::{plan, Command, Effect, Plan, SkipReason};
pub use parent::{DetachedParent, ParentRelease};
pub use registry::ClientRegistry;
pub use scheduler::{RolloutScheduler, TickReport};
pub use stages::{validate_stages, StageProgress, FULL_ROLLOUT};
