//! Connection to the authoritative server.

use async_trait::async_trait;
use tandem_engine::{DocId, DocSnapshot, SubmitAck, Submission};

use crate::TransportError;

/// Request/response side of a server connection.
///
/// Pushed events arrive separately as [`InboundEvent`](crate::InboundEvent)s.
/// Implementations must deliver pushes for a document in commit order, must
/// not push a client's own operations back to it, and must resolve a
/// submission only after every push committed before it has been delivered.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Subscribe to a document and fetch its current snapshot.
    async fn join_doc(&self, doc_id: &DocId) -> Result<DocSnapshot, TransportError>;

    /// Unsubscribe from a document. Failures are not reported.
    async fn leave_doc(&self, doc_id: &DocId);

    /// Submit an operation. The ack carries the version it was committed at.
    async fn submit_operation(&self, submission: Submission) -> Result<SubmitAck, TransportError>;
}
