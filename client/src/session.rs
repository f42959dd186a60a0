//! Session: the set of documents open over one transport.
//!
//! Tracks open documents and routes inbound events to them.

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tandem_engine::{DocId, RemoteUpdate};

use crate::{
    DocumentHandle, InboundEvent, Notice, Renderer, Result, SyncConfig, SyncError, Transport,
};

/// Owns the documents open over one transport.
///
/// Thread-safe and can be shared across tasks via `Arc`.
pub struct Session {
    transport: Arc<dyn Transport>,
    config: Arc<SyncConfig>,
    documents: DashMap<DocId, DocumentHandle>,
    notices: mpsc::UnboundedSender<Notice>,
}

impl Session {
    /// Create a session. Notices from every document arrive on the returned
    /// receiver.
    pub fn new(
        transport: Arc<dyn Transport>,
        config: SyncConfig,
    ) -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (notices, rx) = mpsc::unbounded_channel();
        let session = Self {
            transport,
            config: Arc::new(config),
            documents: DashMap::new(),
            notices,
        };
        (session, rx)
    }

    /// Open and join a document.
    ///
    /// If the join fails the document stays registered and detached, so the
    /// caller can retry with [`DocumentHandle::rejoin`] or close it. Opening
    /// a document twice returns the existing handle.
    pub async fn open_document<R: Renderer>(
        &self,
        doc_id: impl Into<DocId>,
        renderer: R,
    ) -> Result<DocumentHandle> {
        let doc_id = doc_id.into();

        let handle = match self.documents.entry(doc_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => {
                debug!(doc_id = %doc_id, "Document already open");
                return Ok(entry.get().clone());
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let handle = DocumentHandle::spawn(
                    doc_id.clone(),
                    Arc::clone(&self.transport),
                    renderer,
                    Arc::clone(&self.config),
                    self.notices.clone(),
                );
                entry.insert(handle.clone());
                handle
            }
        };

        if let Err(e) = handle.join().await {
            warn!(doc_id = %doc_id, error = %e, "Document opened detached");
            return Err(e);
        }
        Ok(handle)
    }

    /// Get the handle of an open document.
    pub fn document(&self, doc_id: &str) -> Option<DocumentHandle> {
        self.documents.get(doc_id).map(|entry| entry.value().clone())
    }

    /// Get the number of open documents.
    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    /// Leave a document and forget it.
    pub async fn close_document(&self, doc_id: &str) -> Result<()> {
        let (_, handle) = self
            .documents
            .remove(doc_id)
            .ok_or_else(|| SyncError::UnknownDocument(doc_id.to_string()))?;
        handle.leave().await
    }

    /// Leave every open document.
    pub async fn close_all(&self) {
        let doc_ids: Vec<DocId> = self.documents.iter().map(|e| e.key().clone()).collect();
        let handles: Vec<DocumentHandle> = doc_ids
            .iter()
            .filter_map(|doc_id| self.documents.remove(doc_id).map(|(_, handle)| handle))
            .collect();

        let results = join_all(handles.iter().map(|handle| handle.leave())).await;
        let closed = results.iter().filter(|r| r.is_ok()).count();
        info!(closed, "Closed all documents");
    }

    /// Route an inbound event to its document.
    ///
    /// Returns whether a document took the event.
    pub fn dispatch(&self, event: InboundEvent) -> bool {
        let Some(handle) = self.document(event.doc_id()) else {
            debug!(doc_id = %event.doc_id(), "Dropping event for unknown document");
            return false;
        };

        let delivered = match event {
            InboundEvent::RemoteOperationApplied { op, version, .. } => {
                handle.remote_operation(RemoteUpdate { op, version })
            }
            InboundEvent::OperationRejected { message, .. } => handle.operation_rejected(message),
        };

        match delivered {
            Ok(()) => true,
            Err(e) => {
                warn!(doc_id = %handle.doc_id(), error = %e, "Could not deliver event");
                false
            }
        }
    }

    /// Forward a transport's event stream into [`Session::dispatch`] until
    /// the stream ends.
    pub fn spawn_inbound(
        self: &Arc<Self>,
        mut events: mpsc::UnboundedReceiver<InboundEvent>,
    ) -> JoinHandle<()> {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                session.dispatch(event);
            }
            debug!("Inbound event stream ended");
        })
    }
}
