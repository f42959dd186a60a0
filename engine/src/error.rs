//! Error types for the Tandem engine.

use crate::{LifecycleState, Version};
use thiserror::Error;

/// All possible errors from the Tandem engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Offset errors
    #[error("offset {offset} is out of range for text of length {len}")]
    OffsetOutOfRange { offset: usize, len: usize },

    #[error("byte offset {0} does not fall on a character boundary")]
    NotCharBoundary(usize),

    #[error("malformed operation: {0}")]
    MalformedOperation(String),

    // Sync errors
    #[error("version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: Version, actual: Version },

    #[error("document is {0}, not joined")]
    NotJoined(LifecycleState),

    #[error("local content diverged from server content and unacknowledged operations")]
    Diverged,

    #[error("no operation in flight")]
    NothingInFlight,

    #[error("cannot {action} while {from}")]
    InvalidTransition {
        from: LifecycleState,
        action: &'static str,
    },

    // State errors
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

impl Error {
    /// Whether this error means an operation does not fit the text it was
    /// applied to. Such errors are resolved by resynchronizing.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Error::OffsetOutOfRange { .. } | Error::NotCharBoundary(_) | Error::MalformedOperation(_)
        )
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::OffsetOutOfRange { offset: 12, len: 5 };
        assert_eq!(
            err.to_string(),
            "offset 12 is out of range for text of length 5"
        );

        let err = Error::VersionMismatch {
            expected: 1,
            actual: 2,
        };
        assert_eq!(err.to_string(), "version mismatch: expected 1, got 2");

        let err = Error::NotJoined(LifecycleState::Rejoining { attempt: 2 });
        assert_eq!(err.to_string(), "document is rejoining (attempt 2), not joined");

        let err = Error::InvalidTransition {
            from: LifecycleState::Joining,
            action: "rejoin",
        };
        assert_eq!(err.to_string(), "cannot rejoin while joining");
    }

    #[test]
    fn malformed_classification() {
        assert!(Error::NotCharBoundary(3).is_malformed());
        assert!(Error::MalformedOperation("x".into()).is_malformed());
        assert!(!Error::NothingInFlight.is_malformed());
        assert!(!Error::VersionMismatch {
            expected: 0,
            actual: 1
        }
        .is_malformed());
    }
}
