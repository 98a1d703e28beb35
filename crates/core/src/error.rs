//! Domain error model.

use thiserror::Error;

/// Domain-level error.
///
/// Deterministic failures only (malformed values, unknown states). Storage and
/// transport failures have their own error types in `jobgate-infra`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A state name did not match any known state.
    #[error("unknown state: {0}")]
    UnknownState(String),
}

impl DomainError {
    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn unknown_state(msg: impl Into<String>) -> Self {
        Self::UnknownState(msg.into())
    }
}
