//! Inbound event definitions.
//!
//! Events are JSON-encoded with a `type` tag and camelCase field names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tandem_engine::{DocId, Operation, Version};

/// Events pushed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum InboundEvent {
    /// Another participant's operation was committed.
    RemoteOperationApplied {
        doc_id: DocId,
        op: Operation,
        /// Version the operation was committed at
        version: Version,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        meta: Option<UpdateMeta>,
    },

    /// The server refused an operation from this client.
    OperationRejected { doc_id: DocId, message: String },
}

/// Origin of a committed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMeta {
    /// Connection that submitted the operation
    pub source: String,
    /// Commit time
    pub ts: DateTime<Utc>,
}

impl InboundEvent {
    /// Create a remote operation event.
    pub fn remote_operation(
        doc_id: impl Into<DocId>,
        op: Operation,
        version: Version,
        meta: Option<UpdateMeta>,
    ) -> Self {
        InboundEvent::RemoteOperationApplied {
            doc_id: doc_id.into(),
            op,
            version,
            meta,
        }
    }

    /// Create a rejection event.
    pub fn rejected(doc_id: impl Into<DocId>, message: impl Into<String>) -> Self {
        InboundEvent::OperationRejected {
            doc_id: doc_id.into(),
            message: message.into(),
        }
    }

    /// Document the event is about.
    pub fn doc_id(&self) -> &DocId {
        match self {
            InboundEvent::RemoteOperationApplied { doc_id, .. }
            | InboundEvent::OperationRejected { doc_id, .. } => doc_id,
        }
    }
}
