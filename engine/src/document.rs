//! Per-document synchronization state.
//!
//! A [`Document`] mirrors one server document. It holds the version the
//! server has acknowledged, the text at that version, and the local edits
//! the server has not confirmed yet: at most one operation in flight and the
//! pending edits composed behind it.
//!
//! The state machine does no IO. Every transition is a method call that
//! returns what the caller has to do next: send a [`Submission`], render an
//! operation, or resynchronize when an error comes back.
//!
//! ```text
//! Detached -> Joining -> Joined <-> Rejoining
//! ```
//!
//! Version, contents and queues only exist inside the `Joined` phase, so a
//! document that is joining or rejoining has nothing stale to expose.

use crate::transform::transform_x;
use crate::{error::Result, DocId, DocSnapshot, Error, Operation, Version};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Observable lifecycle state of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum LifecycleState {
    Detached,
    Joining,
    Joined,
    Rejoining { attempt: u32 },
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Detached => write!(f, "detached"),
            LifecycleState::Joining => write!(f, "joining"),
            LifecycleState::Joined => write!(f, "joined"),
            LifecycleState::Rejoining { attempt } => write!(f, "rejoining (attempt {attempt})"),
        }
    }
}

/// An operation ready to be sent to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    /// Target document
    pub doc_id: DocId,
    /// The operation, expressed against `baseline`
    pub op: Operation,
    /// Version the operation is based on
    pub version: Version,
    /// Server text at `version`, for integrity checks by the transport
    pub baseline: String,
}

/// Server acknowledgement of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAck {
    /// Version at which the server committed the operation
    pub version: Version,
}

/// An operation some other participant committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteUpdate {
    /// The committed operation
    pub op: Operation,
    /// Version the operation was committed at
    pub version: Version,
}

/// Result of applying a remote update.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteApplied {
    /// The remote operation transformed to apply to the local view
    pub render: Operation,
    /// The next submission, released because the in-flight operation was
    /// confirmed while applying the update
    pub resubmit: Option<Submission>,
}

#[derive(Debug, Clone)]
struct Mirror {
    version: Version,
    server_content: String,
    content: String,
    inflight: Option<Operation>,
    pending: Option<Operation>,
    /// Acknowledgement that arrived before the remote updates preceding it.
    early_ack: Option<Version>,
    /// Versions of in-flight operations confirmed by a later remote update
    /// before their acknowledgements arrived, oldest first.
    implicit_acks: VecDeque<Version>,
}

impl Mirror {
    fn from_snapshot(snapshot: &DocSnapshot) -> Self {
        Self {
            version: snapshot.version,
            server_content: snapshot.text.clone(),
            content: snapshot.text.clone(),
            inflight: None,
            pending: None,
            early_ack: None,
            implicit_acks: VecDeque::new(),
        }
    }

    fn confirm_inflight(&mut self) -> Result<()> {
        let inflight = self.inflight.as_ref().ok_or(Error::NothingInFlight)?;
        self.server_content = inflight.apply(&self.server_content)?;
        self.version += 1;
        self.inflight = None;
        self.early_ack = None;
        Ok(())
    }

    fn take_submission(&mut self, doc_id: &DocId) -> Option<Submission> {
        if self.inflight.is_some() {
            return None;
        }
        let op = self.pending.take()?;
        self.inflight = Some(op.clone());
        Some(Submission {
            doc_id: doc_id.clone(),
            op,
            version: self.version,
            baseline: self.server_content.clone(),
        })
    }
}

#[derive(Debug, Clone)]
enum Phase {
    Detached,
    Joining,
    Joined(Mirror),
    Rejoining { attempt: u32 },
}

/// Synchronization state of one open document.
#[derive(Debug, Clone)]
pub struct Document {
    doc_id: DocId,
    phase: Phase,
    ranges: serde_json::Value,
}

impl Document {
    /// Create a detached document.
    pub fn new(doc_id: impl Into<DocId>) -> Self {
        Self {
            doc_id: doc_id.into(),
            phase: Phase::Detached,
            ranges: serde_json::Value::Null,
        }
    }

    /// Get the document ID.
    pub fn doc_id(&self) -> &DocId {
        &self.doc_id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        match self.phase {
            Phase::Detached => LifecycleState::Detached,
            Phase::Joining => LifecycleState::Joining,
            Phase::Joined(_) => LifecycleState::Joined,
            Phase::Rejoining { attempt } => LifecycleState::Rejoining { attempt },
        }
    }

    /// Check if the document is joined.
    pub fn is_joined(&self) -> bool {
        matches!(self.phase, Phase::Joined(_))
    }

    fn mirror(&self) -> Option<&Mirror> {
        match &self.phase {
            Phase::Joined(mirror) => Some(mirror),
            _ => None,
        }
    }

    /// Server-acknowledged version.
    pub fn version(&self) -> Option<Version> {
        self.mirror().map(|m| m.version)
    }

    /// Optimistic local text, including unacknowledged edits.
    pub fn content(&self) -> Option<&str> {
        self.mirror().map(|m| m.content.as_str())
    }

    /// Server text at [`Document::version`].
    pub fn server_content(&self) -> Option<&str> {
        self.mirror().map(|m| m.server_content.as_str())
    }

    /// The submitted but unacknowledged operation.
    pub fn inflight(&self) -> Option<&Operation> {
        self.mirror().and_then(|m| m.inflight.as_ref())
    }

    /// Local edits waiting for the in-flight operation to be acknowledged.
    pub fn pending(&self) -> Option<&Operation> {
        self.mirror().and_then(|m| m.pending.as_ref())
    }

    /// Auxiliary ranges from the last snapshot.
    pub fn ranges(&self) -> &serde_json::Value {
        &self.ranges
    }

    /// Start joining: `Detached -> Joining`.
    pub fn begin_join(&mut self) -> Result<()> {
        match self.phase {
            Phase::Detached => {
                self.phase = Phase::Joining;
                Ok(())
            }
            _ => Err(Error::InvalidTransition {
                from: self.state(),
                action: "join",
            }),
        }
    }

    /// The join request failed: back to `Detached`.
    pub fn fail_join(&mut self) {
        if matches!(self.phase, Phase::Joining) {
            self.phase = Phase::Detached;
        }
    }

    /// Install a fresh snapshot after joining or rejoining.
    pub fn complete_join(&mut self, snapshot: DocSnapshot) -> Result<()> {
        match self.phase {
            Phase::Joining | Phase::Rejoining { .. } => {
                self.phase = Phase::Joined(Mirror::from_snapshot(&snapshot));
                self.ranges = snapshot.ranges;
                Ok(())
            }
            _ => Err(Error::InvalidTransition {
                from: self.state(),
                action: "install a snapshot",
            }),
        }
    }

    /// Record a local edit the editor has already applied to its view.
    ///
    /// The edit is applied to the local content and composed onto the
    /// pending operation. If it does not apply, nothing changes.
    pub fn submit_local_edit(&mut self, op: Operation) -> Result<()> {
        let Phase::Joined(mirror) = &mut self.phase else {
            return Err(Error::NotJoined(self.state()));
        };
        if op.is_empty() {
            return Ok(());
        }

        mirror.content = op.apply(&mirror.content)?;
        mirror.pending = Some(match mirror.pending.take() {
            Some(pending) => pending.compose(op),
            None => op,
        });
        Ok(())
    }

    /// Move the pending edits in flight.
    ///
    /// Returns `None` when not joined, when an operation is already in
    /// flight, or when there is nothing pending.
    pub fn flush(&mut self) -> Option<Submission> {
        match &mut self.phase {
            Phase::Joined(mirror) => mirror.take_submission(&self.doc_id),
            _ => None,
        }
    }

    /// The server committed the in-flight operation.
    ///
    /// Returns the next submission if edits were pending. An acknowledgement
    /// for a version ahead of ours is held until the remote updates before it
    /// have been applied.
    pub fn acknowledge(&mut self, ack: SubmitAck) -> Result<Option<Submission>> {
        let Phase::Joined(mirror) = &mut self.phase else {
            return Err(Error::NotJoined(self.state()));
        };
        if let Some(index) = mirror.implicit_acks.iter().position(|&v| v == ack.version) {
            mirror.implicit_acks.remove(index);
            return Ok(None);
        }
        if mirror.inflight.is_none() {
            return Err(Error::NothingInFlight);
        }
        if ack.version > mirror.version {
            mirror.early_ack = Some(ack.version);
            return Ok(None);
        }
        if ack.version < mirror.version {
            return Err(Error::VersionMismatch {
                expected: mirror.version,
                actual: ack.version,
            });
        }

        mirror.confirm_inflight()?;
        Ok(mirror.take_submission(&self.doc_id))
    }

    /// Apply an operation committed by another participant.
    ///
    /// The update is transformed against the in-flight and pending edits,
    /// which are rewritten in turn so they stay valid once the server applies
    /// them after it. Local edits win insert ties.
    ///
    /// Updates never include our own operations, so an update one version
    /// ahead while an operation is in flight means the server committed ours
    /// first. It is confirmed on the spot and its acknowledgement, when it
    /// arrives, is ignored.
    ///
    /// All of it is computed on a copy: on error the document is unchanged
    /// and the caller is expected to rejoin.
    pub fn apply_remote(&mut self, update: RemoteUpdate) -> Result<RemoteApplied> {
        let Phase::Joined(mirror) = &mut self.phase else {
            return Err(Error::NotJoined(self.state()));
        };

        let mut next = mirror.clone();
        let mut confirmed = false;
        if next.inflight.is_some() && update.version == next.version + 1 {
            next.confirm_inflight()?;
            next.implicit_acks.push_back(mirror.version);
            confirmed = true;
        }
        if update.version != next.version {
            return Err(Error::VersionMismatch {
                expected: mirror.version,
                actual: update.version,
            });
        }

        next.server_content = update.op.apply(&next.server_content)?;

        let mut render = update.op;
        if let Some(inflight) = next.inflight.take() {
            let (inflight, transformed) = transform_x(&inflight, &render);
            next.inflight = Some(inflight);
            render = transformed;
        }
        if let Some(pending) = next.pending.take() {
            let (pending, transformed) = transform_x(&pending, &render);
            next.pending = Some(pending);
            render = transformed;
        }

        next.version += 1;
        next.content = render.apply(&next.content)?;

        if next.early_ack == Some(next.version) {
            next.confirm_inflight()?;
            confirmed = true;
        }

        *mirror = next;
        let resubmit = if confirmed {
            mirror.take_submission(&self.doc_id)
        } else {
            None
        };

        Ok(RemoteApplied { render, resubmit })
    }

    /// Enter `Rejoining`, dropping every unacknowledged edit.
    ///
    /// Returns `false` without doing anything when a first attempt is
    /// requested while a rejoin is already under way.
    pub fn begin_rejoin(&mut self, attempt: u32) -> Result<bool> {
        match self.phase {
            Phase::Rejoining { .. } if attempt <= 1 => Ok(false),
            Phase::Joining => Err(Error::InvalidTransition {
                from: LifecycleState::Joining,
                action: "rejoin",
            }),
            _ => {
                self.phase = Phase::Rejoining {
                    attempt: attempt.max(1),
                };
                Ok(true)
            }
        }
    }

    /// Drop all state and return to `Detached`.
    pub fn detach(&mut self) {
        self.phase = Phase::Detached;
    }

    /// Verify that the local content equals the server content with the
    /// in-flight and pending operations applied.
    pub fn check_invariants(&self) -> Result<()> {
        let Some(mirror) = self.mirror() else {
            return Ok(());
        };
        let mut expected = mirror.server_content.clone();
        if let Some(inflight) = &mirror.inflight {
            expected = inflight.apply(&expected)?;
        }
        if let Some(pending) = &mirror.pending {
            expected = pending.apply(&expected)?;
        }
        if expected != mirror.content {
            return Err(Error::Diverged);
        }
        Ok(())
    }
}
