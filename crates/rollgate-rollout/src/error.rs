//! Rollout error types.
//!
//! Store failures below the controller never show up here: they are
//! recorded on the rollout and returned as [`Outcome::Failed`]. These
//! errors are the ones a caller has to act on.
//!
//! [`Outcome::Failed`]: crate::Outcome::Failed

use thiserror::Error;

use rollgate_guard::LockError;
use rollgate_state::{StateError, StoreFamily};
use rollgate_storefront::StoreError;

/// Result type alias for rollout operations.
pub type RolloutResult<T> = Result<T, RolloutError>;

#[derive(Debug, Error)]
pub enum RolloutError {
    #[error("rollout not found: {0}")]
    NotFound(String),

    #[error("invalid rollout: {0}")]
    Invalid(String),

    #[error("no store client registered for {0:?}")]
    NoClient(StoreFamily),

    /// The account scope stayed locked for the whole acquisition window.
    /// Only raised in [`LockMode::Strict`](crate::LockMode::Strict).
    #[error("store busy: {0}")]
    LockContention(LockError),

    #[error("lock backend: {0}")]
    Lock(LockError),

    /// A read-only store query failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    State(#[from] StateError),
}
