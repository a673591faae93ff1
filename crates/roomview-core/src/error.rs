use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Broad error category used for user-facing handling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ViewErrorCategory {
    /// Invalid input or configuration issue.
    Config,
    /// Transient network or transport failure.
    Network,
    /// A referenced room or event does not exist.
    NotFound,
    /// Internal invariant break.
    Internal,
}

/// Stable error payload crossing the view/collaborator boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[error("{category:?}:{code}: {message}")]
pub struct ViewError {
    /// High-level error category.
    pub category: ViewErrorCategory,
    /// Stable machine-readable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl ViewError {
    /// Construct a new view error.
    pub fn new(
        category: ViewErrorCategory,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Build a standard not-found error for a room or event reference.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::new(
            ViewErrorCategory::NotFound,
            "not_found",
            format!("{} was not found", what.into()),
        )
    }

    /// Build a standard backfill failure error.
    pub fn backfill_failed(message: impl Into<String>) -> Self {
        Self::new(ViewErrorCategory::Network, "backfill_failed", message)
    }
}
