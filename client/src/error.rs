//! Unified error handling for the client.

use tandem_engine::DocId;

/// Errors reported by a [`Transport`](crate::Transport).
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("document not found: {0}")]
    NotFound(DocId),

    #[error("request timed out")]
    Timeout,

    #[error("rejected by server: {0}")]
    Rejected(String),

    #[error("disconnected: {0}")]
    Disconnected(String),
}

impl TransportError {
    /// Whether the whole connection is gone rather than one request failing.
    pub fn is_connection_level(&self) -> bool {
        matches!(self, TransportError::Disconnected(_))
    }
}

/// Client error type.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Engine error: {0}")]
    Engine(#[from] tandem_engine::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Unknown document: {0}")]
    UnknownDocument(DocId),

    #[error("Document closed: {0}")]
    DocumentClosed(DocId),
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SyncError::from(TransportError::NotFound("doc-1".to_string()));
        assert_eq!(err.to_string(), "Transport error: document not found: doc-1");

        let err = SyncError::from(tandem_engine::Error::NothingInFlight);
        assert_eq!(err.to_string(), "Engine error: no operation in flight");
    }

    #[test]
    fn test_connection_level() {
        assert!(TransportError::Disconnected("socket closed".into()).is_connection_level());
        assert!(!TransportError::Timeout.is_connection_level());
        assert!(!TransportError::Rejected("stale".into()).is_connection_level());
    }
}
