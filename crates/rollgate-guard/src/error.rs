//! Guard error types.

use thiserror::Error;

use rollgate_storefront::StoreError;

/// Errors from the distributed lock.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LockError {
    /// Someone else held the lock for the whole acquisition window.
    #[error("lock {key} is busy after {attempts} attempt(s)")]
    Contended { key: String, attempts: u32 },

    #[error("lock backend error: {0}")]
    Backend(String),
}

impl From<rollgate_state::StateError> for LockError {
    fn from(e: rollgate_state::StateError) -> Self {
        Self::Backend(e.to_string())
    }
}

/// Errors from a shell-wrapped store call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ShellError {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("store call failed after {attempts} attempt(s): {source}")]
    Store {
        #[source]
        source: StoreError,
        attempts: u32,
    },
}
