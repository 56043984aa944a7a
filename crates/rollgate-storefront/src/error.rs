//! Categorized store errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for store client calls.
pub type StoreResult<T> = Result<T, StoreError>;

/// Coarse failure category every store family maps its errors onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Credentials lack access to the resource.
    Permission,
    /// The resource is not in a state that allows the operation.
    Precondition,
    /// Temporary conflict or outage; the same call may succeed later.
    Transient,
    /// The store wants a manual review before accepting the change.
    ReviewBlocked,
    NotFound,
    /// The change was already applied (e.g. a version code reused).
    Duplicate,
}

impl ErrorCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Permission => "permission",
            Self::Precondition => "precondition",
            Self::Transient => "transient",
            Self::ReviewBlocked => "review_blocked",
            Self::NotFound => "not_found",
            Self::Duplicate => "duplicate",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A store failure with its category, the resource it concerns, and the
/// store's own message.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{category} error on {resource}: {message}")]
pub struct StoreError {
    pub category: ErrorCategory,
    pub resource: String,
    pub message: String,
}

impl StoreError {
    pub fn new(
        category: ErrorCategory,
        resource: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// The operation is not offered by this store family.
    pub fn unsupported(resource: impl Into<String>, operation: &str) -> Self {
        Self::new(
            ErrorCategory::Precondition,
            resource,
            format!("{operation} is not supported by this store"),
        )
    }
}
