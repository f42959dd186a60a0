//! In-memory authoritative server.
//!
//! Keeps every document's full history, transforms stale submissions
//! against what was committed since their base version, and pushes each
//! commit to the other connections subscribed to the document. Used by the
//! demo binary and the integration tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::mpsc;

use tandem_engine::{
    transform_ops, DocId, DocSnapshot, Operation, Side, SubmitAck, Submission, Version,
};

use crate::{InboundEvent, Transport, TransportError, UpdateMeta};

/// Sender for pushed events.
pub type EventSender = mpsc::UnboundedSender<InboundEvent>;

/// Server-side document: the text at every version.
#[derive(Debug)]
struct ServerDocument {
    /// `texts[v]` is the text at version `v`
    texts: Vec<String>,
    /// `history[v]` took the text from version `v` to `v + 1`
    history: Vec<Operation>,
}

impl ServerDocument {
    fn new(text: String) -> Self {
        Self {
            texts: vec![text],
            history: Vec::new(),
        }
    }

    fn version(&self) -> Version {
        self.history.len() as Version
    }

    fn text(&self) -> &str {
        self.texts.last().map(String::as_str).unwrap_or_default()
    }
}

/// A single client connection.
#[derive(Debug)]
struct Connection {
    sender: EventSender,
    docs: HashSet<DocId>,
}

/// Manages documents and the connections subscribed to them.
///
/// Thread-safe and can be shared across tasks via `Arc`.
#[derive(Debug, Default)]
pub struct LoopbackServer {
    documents: DashMap<DocId, ServerDocument>,
    connections: DashMap<String, Connection>,
    offline: AtomicBool,
}

impl LoopbackServer {
    /// Create an empty server.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty server wrapped in Arc for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Create a document at version 0, replacing any existing one.
    pub fn create_document(&self, doc_id: impl Into<DocId>, text: impl Into<String>) {
        let doc_id = doc_id.into();
        tracing::info!(doc_id = %doc_id, "Created document");
        self.documents.insert(doc_id, ServerDocument::new(text.into()));
    }

    /// Current text of a document.
    pub fn text(&self, doc_id: &str) -> Option<String> {
        self.documents.get(doc_id).map(|doc| doc.text().to_string())
    }

    /// Current version of a document.
    pub fn version(&self, doc_id: &str) -> Option<Version> {
        self.documents.get(doc_id).map(|doc| doc.version())
    }

    /// While offline, joins time out and submissions fail as disconnected.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
        tracing::info!(offline, "Loopback server connectivity changed");
    }

    fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    /// Open a connection. Events pushed to it arrive on the receiver.
    pub fn connect(self: &Arc<Self>) -> (LoopbackTransport, mpsc::UnboundedReceiver<InboundEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn_id = self.register(tx);
        let transport = LoopbackTransport {
            server: Arc::clone(self),
            conn_id,
        };
        (transport, rx)
    }

    fn register(&self, sender: EventSender) -> String {
        let conn_id = uuid::Uuid::new_v4().to_string();
        self.connections.insert(
            conn_id.clone(),
            Connection {
                sender,
                docs: HashSet::new(),
            },
        );
        tracing::info!(conn_id = %conn_id, "Loopback connection registered");
        conn_id
    }

    fn unregister(&self, conn_id: &str) {
        if self.connections.remove(conn_id).is_some() {
            tracing::info!(conn_id = %conn_id, "Loopback connection unregistered");
        }
    }

    /// Get the number of open connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn join(&self, conn_id: &str, doc_id: &DocId) -> Result<DocSnapshot, TransportError> {
        if self.is_offline() {
            return Err(TransportError::Timeout);
        }
        let doc = self
            .documents
            .get(doc_id)
            .ok_or_else(|| TransportError::NotFound(doc_id.clone()))?;

        let mut conn = self
            .connections
            .get_mut(conn_id)
            .ok_or_else(|| TransportError::Disconnected("connection closed".to_string()))?;
        conn.docs.insert(doc_id.clone());

        tracing::debug!(conn_id = %conn_id, doc_id = %doc_id, version = doc.version(), "Joined");
        Ok(DocSnapshot::new(doc.text(), doc.version()))
    }

    fn leave(&self, conn_id: &str, doc_id: &DocId) {
        if let Some(mut conn) = self.connections.get_mut(conn_id) {
            conn.docs.remove(doc_id);
        }
    }

    fn submit(&self, conn_id: &str, submission: Submission) -> Result<SubmitAck, TransportError> {
        if self.is_offline() {
            return Err(TransportError::Disconnected("server unreachable".to_string()));
        }
        let Submission {
            doc_id,
            op,
            version,
            baseline,
        } = submission;

        let mut doc = self
            .documents
            .get_mut(&doc_id)
            .ok_or_else(|| TransportError::NotFound(doc_id.clone()))?;

        let current = doc.version();
        let base = usize::try_from(version)
            .ok()
            .and_then(|v| doc.texts.get(v))
            .ok_or_else(|| {
                TransportError::Rejected(format!("version {version} is ahead of {current}"))
            })?;
        if *base != baseline {
            return Err(TransportError::Rejected(format!(
                "baseline does not match the text at version {version}"
            )));
        }
        op.apply(&baseline)
            .map_err(|e| TransportError::Rejected(e.to_string()))?;

        let op = doc.history[version as usize..]
            .iter()
            .fold(op, |op, committed| transform_ops(&op, committed, Side::Left));
        let text = op
            .apply(doc.text())
            .map_err(|e| TransportError::Rejected(e.to_string()))?;

        doc.texts.push(text);
        doc.history.push(op.clone());

        let meta = UpdateMeta {
            source: conn_id.to_string(),
            ts: Utc::now(),
        };
        let event = InboundEvent::remote_operation(doc_id.clone(), op, current, Some(meta));
        let recipients = self.broadcast_except(conn_id, &doc_id, event);

        tracing::debug!(
            doc_id = %doc_id,
            version = current,
            rebased_from = version,
            recipients,
            "Committed operation"
        );
        Ok(SubmitAck { version: current })
    }

    /// Push an event to every connection subscribed to `doc_id` except the
    /// sender.
    ///
    /// Returns the number of connections that received the event.
    fn broadcast_except(&self, sender_conn_id: &str, doc_id: &DocId, event: InboundEvent) -> usize {
        let mut sent_count = 0;

        for entry in self.connections.iter() {
            let conn = entry.value();
            if entry.key() != sender_conn_id
                && conn.docs.contains(doc_id)
                && conn.sender.send(event.clone()).is_ok()
            {
                sent_count += 1;
            }
        }

        sent_count
    }
}

/// One client's connection to a [`LoopbackServer`].
///
/// Dropping it closes the connection.
#[derive(Debug)]
pub struct LoopbackTransport {
    server: Arc<LoopbackServer>,
    conn_id: String,
}

impl LoopbackTransport {
    /// Get the connection ID, as reported in [`UpdateMeta::source`].
    pub fn conn_id(&self) -> &str {
        &self.conn_id
    }
}

impl Drop for LoopbackTransport {
    fn drop(&mut self) {
        self.server.unregister(&self.conn_id);
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn join_doc(&self, doc_id: &DocId) -> Result<DocSnapshot, TransportError> {
        self.server.join(&self.conn_id, doc_id)
    }

    async fn leave_doc(&self, doc_id: &DocId) {
        self.server.leave(&self.conn_id, doc_id)
    }

    async fn submit_operation(&self, submission: Submission) -> Result<SubmitAck, TransportError> {
        self.server.submit(&self.conn_id, submission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission(doc_id: &str, op: Operation, version: Version, baseline: &str) -> Submission {
        Submission {
            doc_id: doc_id.to_string(),
            op,
            version,
            baseline: baseline.to_string(),
        }
    }

    #[tokio::test]
    async fn test_connect_and_drop() {
        let server = LoopbackServer::new_shared();
        let (transport, _rx) = server.connect();
        assert_eq!(server.connection_count(), 1);

        drop(transport);
        assert_eq!(server.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_join_unknown_document() {
        let server = LoopbackServer::new_shared();
        let (transport, _rx) = server.connect();
        let err = transport.join_doc(&"missing".to_string()).await.unwrap_err();
        assert_eq!(err, TransportError::NotFound("missing".to_string()));
    }

    #[tokio::test]
    async fn test_broadcast_reaches_other_subscribers_only() {
        let server = LoopbackServer::new_shared();
        server.create_document("doc", "abc");
        let doc_id = "doc".to_string();

        let (a, mut rx_a) = server.connect();
        let (b, mut rx_b) = server.connect();
        let (_c, mut rx_c) = server.connect();
        a.join_doc(&doc_id).await.unwrap();
        b.join_doc(&doc_id).await.unwrap();

        let ack = a
            .submit_operation(submission("doc", Operation::insert(3, "d"), 0, "abc"))
            .await
            .unwrap();
        assert_eq!(ack, SubmitAck { version: 0 });
        assert_eq!(server.text("doc").as_deref(), Some("abcd"));
        assert_eq!(server.version("doc"), Some(1));

        assert!(rx_a.try_recv().is_err());
        assert!(rx_c.try_recv().is_err());
        match rx_b.try_recv().unwrap() {
            InboundEvent::RemoteOperationApplied {
                op, version, meta, ..
            } => {
                assert_eq!(op, Operation::insert(3, "d"));
                assert_eq!(version, 0);
                assert_eq!(meta.unwrap().source, a.conn_id());
            }
            other => panic!("Expected RemoteOperationApplied, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stale_submission_is_transformed() {
        let server = LoopbackServer::new_shared();
        server.create_document("doc", "Hello World");
        let (a, _rx_a) = server.connect();
        let (b, _rx_b) = server.connect();

        a.submit_operation(submission("doc", Operation::insert(5, "!"), 0, "Hello World"))
            .await
            .unwrap();
        let ack = b
            .submit_operation(submission(
                "doc",
                Operation::insert(5, " Beautiful"),
                0,
                "Hello World",
            ))
            .await
            .unwrap();

        assert_eq!(ack.version, 1);
        assert_eq!(server.text("doc").as_deref(), Some("Hello Beautiful! World"));
    }

    #[tokio::test]
    async fn test_baseline_mismatch_is_rejected() {
        let server = LoopbackServer::new_shared();
        server.create_document("doc", "abc");
        let (a, _rx) = server.connect();

        let err = a
            .submit_operation(submission("doc", Operation::insert(0, "x"), 0, "abd"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Rejected(_)));

        let err = a
            .submit_operation(submission("doc", Operation::insert(0, "x"), 4, "abc"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Rejected(_)));
        assert_eq!(server.version("doc"), Some(0));
    }

    #[tokio::test]
    async fn test_operation_outside_baseline_is_rejected() {
        let server = LoopbackServer::new_shared();
        server.create_document("doc", "abc");
        let (a, _rx_a) = server.connect();
        let (b, _rx_b) = server.connect();

        a.submit_operation(submission("doc", Operation::insert(0, "y"), 0, "abc"))
            .await
            .unwrap();
        let err = b
            .submit_operation(submission(
                "doc",
                Operation::insert(usize::MAX, "x"),
                0,
                "abc",
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Rejected(_)));
        assert_eq!(server.version("doc"), Some(1));
        assert_eq!(server.text("doc").as_deref(), Some("yabc"));
    }

    #[tokio::test]
    async fn test_offline() {
        let server = LoopbackServer::new_shared();
        server.create_document("doc", "");
        let (a, _rx) = server.connect();
        server.set_offline(true);

        let doc_id = "doc".to_string();
        assert_eq!(a.join_doc(&doc_id).await, Err(TransportError::Timeout));
        let err = a
            .submit_operation(submission("doc", Operation::insert(0, "x"), 0, ""))
            .await
            .unwrap_err();
        assert!(err.is_connection_level());

        server.set_offline(false);
        assert!(a.join_doc(&doc_id).await.is_ok());
    }
}
