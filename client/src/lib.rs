//! # Tandem Client
//!
//! Async document sync for collaborative text editing, built on
//! [`tandem_engine`].
//!
//! A [`Session`] owns the documents open over one [`Transport`]. Each
//! document runs as its own actor task that batches local edits, keeps at
//! most one operation in flight, transforms incoming remote operations
//! against local edits and resynchronizes with backoff when the server and
//! the client disagree. Views are updated through a [`Renderer`].
//!
//! [`LoopbackServer`] is an in-memory server for demos and tests.

pub mod config;
pub mod error;
pub mod logging;
pub mod loopback;
pub mod protocol;
pub mod render;
pub mod session;
pub mod sync;
pub mod transport;

pub use config::{ConfigError, SyncConfig};
pub use error::{Result, SyncError, TransportError};
pub use loopback::{LoopbackServer, LoopbackTransport};
pub use protocol::{InboundEvent, UpdateMeta};
pub use render::{Renderer, SharedBuffer};
pub use session::Session;
pub use sync::{DocumentHandle, DocumentView, Notice};
pub use transport::Transport;
