//! # Tandem Engine
//!
//! Operational transformation core for collaborative plain-text editing.
//!
//! This crate provides the pure logic behind a Tandem client: applying and
//! transforming text operations at codepoint precision, and tracking the
//! synchronization state of one document against an authoritative server.
//!
//! ## Design Principles
//!
//! - **No IO**: Engine has no knowledge of sockets, timers or editors
//! - **Deterministic**: Same inputs always produce same outputs
//! - **Codepoint precise**: Positions count Unicode scalar values, never bytes
//! - **Never panics on input**: Bad offsets are errors, not slicing panics
//!
//! ## Core Concepts
//!
//! ### Operations
//!
//! An [`Operation`] is an ordered list of [`Component`]s, each an insert or
//! a delete at a codepoint position. Components apply one after another,
//! each against the text produced by those before it.
//!
//! ### Transformation
//!
//! [`transform_ops`] rewrites an operation so it applies after a concurrent
//! one. Ties between inserts at the same position go to the [`Side::Left`]
//! operation. Local edits always take the left side against remote ones.
//!
//! ### Documents
//!
//! A [`Document`] mirrors one server document: the acknowledged version and
//! text, the local view, at most one operation in flight and the edits
//! pending behind it. It moves through [`LifecycleState`]s
//! `Detached -> Joining -> Joined <-> Rejoining`.
//!
//! ## Quick Start
//!
//! ```rust
//! use tandem_engine::{DocSnapshot, Document, Operation, RemoteUpdate, SubmitAck};
//!
//! // 1. Join with the server snapshot
//! let mut doc = Document::new("notes");
//! doc.begin_join().unwrap();
//! doc.complete_join(DocSnapshot::new("Hello World", 0)).unwrap();
//!
//! // 2. Record a local edit and send it
//! doc.submit_local_edit(Operation::insert(5, " Beautiful")).unwrap();
//! let submission = doc.flush().unwrap();
//! assert_eq!(submission.version, 0);
//!
//! // 3. A concurrent remote edit arrives before the ack
//! let applied = doc
//!     .apply_remote(RemoteUpdate { op: Operation::insert(5, "!"), version: 0 })
//!     .unwrap();
//! assert_eq!(applied.render, Operation::insert(15, "!"));
//!
//! // 4. The server commits our edit after the remote one
//! doc.acknowledge(SubmitAck { version: 1 }).unwrap();
//! assert_eq!(doc.version(), Some(2));
//! assert_eq!(doc.content(), doc.server_content());
//! ```
//!
//! ## Wire Format
//!
//! Components serialize as `{"p": 5, "i": "text"}` or `{"p": 5, "d": "text"}`
//! and operations as JSON arrays of them. [`DocSnapshot`] carries the text,
//! version and opaque auxiliary ranges delivered on join.

pub mod component;
pub mod document;
pub mod error;
pub mod operation;
pub mod snapshot;
pub mod text;
pub mod transform;

// Re-export main types at crate root
pub use component::Component;
pub use document::{
    Document, LifecycleState, RemoteApplied, RemoteUpdate, SubmitAck, Submission,
};
pub use error::Error;
pub use operation::Operation;
pub use snapshot::DocSnapshot;
pub use text::{byte_to_codepoint, codepoint_len, codepoint_to_byte};
pub use transform::{transform_component, transform_ops, transform_x, Side};

/// Type aliases for clarity
pub type DocId = String;
pub type Version = u64;
