//! Error kinds shared across every Memento service.
//!
//! One variant per failure mode in the design's error-handling section so
//! callers (in particular the ingestion pipeline) can match on the variant
//! to decide retry vs. dead-letter instead of string-matching messages.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MementoError {
    #[error("invalid input: {0}")]
    InputValidation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("queue overflow on partition {partition}: {current}/{limit}")]
    QueueOverflow {
        partition: String,
        current: usize,
        limit: usize,
    },

    #[error("operation timed out")]
    Timeout,

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("embedding provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("invalid session transition: {0}")]
    InvalidTransition(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, MementoError>;

impl MementoError {
    /// Whether the ingestion pipeline should requeue a task that failed
    /// with this error, as opposed to dead-lettering it immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MementoError::QueueOverflow { .. }
                | MementoError::Timeout
                | MementoError::StoreUnavailable(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds_match_error_handling_design() {
        assert!(MementoError::Timeout.is_retryable());
        assert!(MementoError::StoreUnavailable("down".into()).is_retryable());
        assert!(MementoError::QueueOverflow {
            partition: "p0".into(),
            current: 10,
            limit: 10
        }
        .is_retryable());

        assert!(!MementoError::NotFound("x".into()).is_retryable());
        assert!(!MementoError::InputValidation("bad".into()).is_retryable());
        assert!(!MementoError::InvalidTransition("broke->completed".into()).is_retryable());
    }
}
