// Error types for tractography configuration and setup

use thiserror::Error;

/// Hard failures surfaced to the caller.
///
/// Only configuration and setup problems end up here. Per-seed skips and
/// per-run degeneracy are logged and contained within the run that hit them.
#[derive(Debug, Error)]
pub enum TractographyError {
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("dimension mismatch for {what}: expected {expected}, found {found}")]
    DimensionMismatch {
        what: &'static str,
        expected: String,
        found: String,
    },

    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TractographyError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        TractographyError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TractographyError>;
