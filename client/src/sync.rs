//! Per-document sync actors.
//!
//! Each open document runs in its own task that owns the engine
//! [`Document`], the renderer and the timers. Everything else talks to it
//! through a [`DocumentHandle`]. Transport calls and timers run in helper
//! tasks that report back over the same command channel, tagged with the
//! epoch they started in; a rejoin or detach bumps the epoch so results
//! that arrive late are dropped.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use tandem_engine::{
    DocId, DocSnapshot, Document, LifecycleState, Operation, RemoteUpdate, SubmitAck,
    Submission, Version,
};

use crate::{Renderer, Result, SyncConfig, SyncError, Transport, TransportError};

/// Conditions reported to the owner of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Every rejoin attempt failed; the document is detached.
    RejoinExhausted { doc_id: DocId, attempts: u32 },
    /// The connection failed while submitting; the document is detached.
    ConnectionLost { doc_id: DocId, reason: String },
    /// A rejoin installed a fresh snapshot.
    Resynchronized { doc_id: DocId, version: Version },
}

/// Serializable snapshot of a document's sync state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentView {
    pub doc_id: DocId,
    pub state: LifecycleState,
    pub version: Option<Version>,
    pub content: Option<String>,
    pub server_content: Option<String>,
    pub inflight: Option<Operation>,
    pub pending: Option<Operation>,
    /// Auxiliary ranges from the last snapshot, for presentation layers.
    pub ranges: serde_json::Value,
}

impl DocumentView {
    fn of(document: &Document) -> Self {
        Self {
            doc_id: document.doc_id().clone(),
            state: document.state(),
            version: document.version(),
            content: document.content().map(str::to_string),
            server_content: document.server_content().map(str::to_string),
            inflight: document.inflight().cloned(),
            pending: document.pending().cloned(),
            ranges: document.ranges().clone(),
        }
    }
}

enum Command {
    Join(oneshot::Sender<Result<()>>),
    LocalEdit {
        op: Operation,
        echo: bool,
        reply: oneshot::Sender<Result<()>>,
    },
    Flush,
    Rejoin,
    Remote(RemoteUpdate),
    Rejected(String),
    Inspect(oneshot::Sender<DocumentView>),
    Leave(oneshot::Sender<()>),
    FlushDue,
    SubmitFinished {
        epoch: u64,
        result: std::result::Result<SubmitAck, TransportError>,
    },
    /// `attempt` is 0 for the initial join.
    JoinFinished {
        epoch: u64,
        attempt: u32,
        result: std::result::Result<DocSnapshot, TransportError>,
    },
}

/// Handle to a document's sync actor.
///
/// Cheap to clone. The actor stops when the document is left or when every
/// handle has been dropped.
#[derive(Debug, Clone)]
pub struct DocumentHandle {
    doc_id: DocId,
    commands: mpsc::UnboundedSender<Command>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Command::Join(_) => "Join",
            Command::LocalEdit { .. } => "LocalEdit",
            Command::Flush => "Flush",
            Command::Rejoin => "Rejoin",
            Command::Remote(_) => "Remote",
            Command::Rejected(_) => "Rejected",
            Command::Inspect(_) => "Inspect",
            Command::Leave(_) => "Leave",
            Command::FlushDue => "FlushDue",
            Command::SubmitFinished { .. } => "SubmitFinished",
            Command::JoinFinished { .. } => "JoinFinished",
        };
        f.write_str(name)
    }
}

impl DocumentHandle {
    /// Start the actor for a detached document.
    pub fn spawn<R: Renderer>(
        doc_id: impl Into<DocId>,
        transport: Arc<dyn Transport>,
        renderer: R,
        config: Arc<SyncConfig>,
        notices: mpsc::UnboundedSender<Notice>,
    ) -> Self {
        let doc_id = doc_id.into();
        let (tx, rx) = mpsc::unbounded_channel();

        let actor = DocumentActor {
            document: Document::new(doc_id.clone()),
            transport,
            renderer: Box::new(renderer),
            config,
            notices,
            commands: tx.downgrade(),
            epoch: 0,
            flush_timer: None,
            submit_task: None,
            join_task: None,
            join_reply: None,
        };
        tokio::spawn(actor.run(rx));

        Self {
            doc_id,
            commands: tx,
        }
    }

    /// Get the document ID.
    pub fn doc_id(&self) -> &DocId {
        &self.doc_id
    }

    /// Whether the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| SyncError::DocumentClosed(self.doc_id.clone()))
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.send(command(reply))?;
        response
            .await
            .map_err(|_| SyncError::DocumentClosed(self.doc_id.clone()))
    }

    /// Fetch the snapshot and start syncing. Resolves once joined.
    pub async fn join(&self) -> Result<()> {
        self.request(Command::Join).await?
    }

    /// Record an edit the editor has already applied to its view.
    pub async fn submit_local_edit(&self, op: Operation) -> Result<()> {
        self.request(|reply| Command::LocalEdit {
            op,
            echo: false,
            reply,
        })
        .await?
    }

    /// Record an edit and apply it to the view through the renderer.
    pub async fn edit(&self, op: Operation) -> Result<()> {
        self.request(|reply| Command::LocalEdit {
            op,
            echo: true,
            reply,
        })
        .await?
    }

    /// Submit pending edits now instead of waiting for the flush delay.
    pub fn flush(&self) -> Result<()> {
        self.send(Command::Flush)
    }

    /// Drop local state and fetch a fresh snapshot.
    pub fn rejoin(&self) -> Result<()> {
        self.send(Command::Rejoin)
    }

    /// Deliver an operation another participant committed.
    pub fn remote_operation(&self, update: RemoteUpdate) -> Result<()> {
        self.send(Command::Remote(update))
    }

    /// Deliver a rejection of one of this client's operations.
    pub fn operation_rejected(&self, message: impl Into<String>) -> Result<()> {
        self.send(Command::Rejected(message.into()))
    }

    /// Current sync state.
    pub async fn view(&self) -> Result<DocumentView> {
        self.request(Command::Inspect).await
    }

    /// Leave the document and stop the actor.
    pub async fn leave(&self) -> Result<()> {
        self.request(Command::Leave).await
    }
}

struct DocumentActor {
    document: Document,
    transport: Arc<dyn Transport>,
    renderer: Box<dyn Renderer>,
    config: Arc<SyncConfig>,
    notices: mpsc::UnboundedSender<Notice>,
    commands: mpsc::WeakUnboundedSender<Command>,
    epoch: u64,
    flush_timer: Option<JoinHandle<()>>,
    submit_task: Option<JoinHandle<()>>,
    join_task: Option<JoinHandle<()>>,
    join_reply: Option<oneshot::Sender<Result<()>>>,
}

impl DocumentActor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            if let Command::Leave(reply) = command {
                self.leave();
                let _ = reply.send(());
                return;
            }
            self.handle(command);
        }
        self.cancel_tasks();
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Join(reply) => self.join(reply),
            Command::LocalEdit { op, echo, reply } => {
                let _ = reply.send(self.local_edit(op, echo));
            }
            Command::Flush => {
                if let Some(timer) = self.flush_timer.take() {
                    timer.abort();
                }
                self.flush();
            }
            Command::FlushDue => {
                self.flush_timer = None;
                self.flush();
            }
            Command::Rejoin => self.rejoin(1),
            Command::Remote(update) => self.remote(update),
            Command::Rejected(message) => {
                self.submit_rejected(TransportError::Rejected(message));
            }
            Command::Inspect(reply) => {
                let _ = reply.send(DocumentView::of(&self.document));
            }
            Command::SubmitFinished { epoch, result } => {
                if epoch != self.epoch {
                    debug!(doc_id = %self.document.doc_id(), "Dropping stale submit result");
                    return;
                }
                self.submit_task = None;
                match result {
                    Ok(ack) => self.acknowledged(ack),
                    Err(e) => self.submit_rejected(e),
                }
            }
            Command::JoinFinished {
                epoch,
                attempt,
                result,
            } => {
                if epoch != self.epoch {
                    debug!(doc_id = %self.document.doc_id(), "Dropping stale join result");
                    return;
                }
                self.join_task = None;
                self.join_finished(attempt, result);
            }
            Command::Leave(_) => {}
        }
    }

    /// Send a command to ourselves from a helper task.
    fn reporter(&self) -> impl Fn(Command) + Send + 'static {
        let commands = self.commands.clone();
        move |command| {
            if let Some(tx) = commands.upgrade() {
                let _ = tx.send(command);
            }
        }
    }

    fn cancel_tasks(&mut self) {
        for task in [
            self.flush_timer.take(),
            self.submit_task.take(),
            self.join_task.take(),
        ]
        .into_iter()
        .flatten()
        {
            task.abort();
        }
    }

    fn join(&mut self, reply: oneshot::Sender<Result<()>>) {
        if let Err(e) = self.document.begin_join() {
            let _ = reply.send(Err(e.into()));
            return;
        }
        info!(doc_id = %self.document.doc_id(), "Joining document");

        self.epoch += 1;
        self.join_reply = Some(reply);
        self.spawn_join(0, Duration::ZERO);
    }

    fn spawn_join(&mut self, attempt: u32, delay: Duration) {
        let transport = Arc::clone(&self.transport);
        let doc_id = self.document.doc_id().clone();
        let epoch = self.epoch;
        let report = self.reporter();

        self.join_task = Some(tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let result = transport.join_doc(&doc_id).await;
            report(Command::JoinFinished {
                epoch,
                attempt,
                result,
            });
        }));
    }

    fn join_finished(
        &mut self,
        attempt: u32,
        result: std::result::Result<DocSnapshot, TransportError>,
    ) {
        let doc_id = self.document.doc_id().clone();
        match result {
            Ok(snapshot) => {
                let version = snapshot.version;
                let text = snapshot.text.clone();
                if let Err(e) = self.document.complete_join(snapshot) {
                    warn!(doc_id = %doc_id, error = %e, "Snapshot arrived in the wrong state");
                    return;
                }
                self.renderer.replace_all(&text);

                if attempt == 0 {
                    info!(doc_id = %doc_id, version, "Joined document");
                    if let Some(reply) = self.join_reply.take() {
                        let _ = reply.send(Ok(()));
                    }
                } else {
                    info!(doc_id = %doc_id, version, attempt, "Rejoined document");
                    let _ = self.notices.send(Notice::Resynchronized { doc_id, version });
                }
            }
            Err(e) if attempt == 0 => {
                warn!(doc_id = %doc_id, error = %e, "Join failed");
                self.document.fail_join();
                if let Some(reply) = self.join_reply.take() {
                    let _ = reply.send(Err(e.into()));
                }
            }
            Err(e) => {
                warn!(doc_id = %doc_id, attempt, error = %e, "Rejoin attempt failed");
                self.rejoin(attempt + 1);
            }
        }
    }

    fn local_edit(&mut self, op: Operation, echo: bool) -> Result<()> {
        match self.document.submit_local_edit(op.clone()) {
            Ok(()) => {
                if echo {
                    self.render(&op);
                }
                self.schedule_flush();
                Ok(())
            }
            Err(e) => {
                if e.is_malformed() {
                    warn!(
                        doc_id = %self.document.doc_id(),
                        error = %e,
                        "Local edit does not match the document, resynchronizing"
                    );
                    self.rejoin(1);
                }
                Err(e.into())
            }
        }
    }

    fn render(&mut self, op: &Operation) {
        if let Err(e) = self.renderer.apply_transformed(op) {
            warn!(
                doc_id = %self.document.doc_id(),
                error = %e,
                "View rejected operation, redrawing"
            );
            if let Some(content) = self.document.content() {
                self.renderer.replace_all(content);
            }
        }
    }

    fn schedule_flush(&mut self) {
        if self
            .flush_timer
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
        {
            return;
        }

        let delay = self.config.flush_delay;
        let report = self.reporter();
        self.flush_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            report(Command::FlushDue);
        }));
    }

    fn flush(&mut self) {
        if let Some(submission) = self.document.flush() {
            self.submit(submission);
        }
    }

    fn submit(&mut self, submission: Submission) {
        debug!(
            doc_id = %submission.doc_id,
            version = submission.version,
            components = submission.op.len(),
            "Submitting operation"
        );

        let transport = Arc::clone(&self.transport);
        let epoch = self.epoch;
        let report = self.reporter();
        self.submit_task = Some(tokio::spawn(async move {
            let result = transport.submit_operation(submission).await;
            report(Command::SubmitFinished { epoch, result });
        }));
    }

    fn acknowledged(&mut self, ack: SubmitAck) {
        let doc_id = self.document.doc_id().clone();
        match self.document.acknowledge(ack) {
            Ok(next) => {
                debug!(doc_id = %doc_id, version = ack.version, "Operation acknowledged");
                if let Some(submission) = next {
                    self.submit(submission);
                }
            }
            Err(e) => {
                warn!(doc_id = %doc_id, error = %e, "Unexpected acknowledgement, resynchronizing");
                self.rejoin(1);
            }
        }
    }

    fn submit_rejected(&mut self, e: TransportError) {
        let doc_id = self.document.doc_id().clone();
        if !self.document.is_joined() {
            debug!(doc_id = %doc_id, error = %e, "Ignoring rejection while not joined");
            return;
        }

        if e.is_connection_level() {
            warn!(doc_id = %doc_id, error = %e, "Connection lost, detaching");
            self.detach();
            let _ = self.notices.send(Notice::ConnectionLost {
                doc_id,
                reason: e.to_string(),
            });
        } else {
            warn!(doc_id = %doc_id, error = %e, "Operation rejected, resynchronizing");
            self.rejoin(1);
        }
    }

    fn remote(&mut self, update: RemoteUpdate) {
        let doc_id = self.document.doc_id().clone();
        if !self.document.is_joined() {
            debug!(
                doc_id = %doc_id,
                state = %self.document.state(),
                version = update.version,
                "Dropping remote operation while not joined"
            );
            return;
        }

        let version = update.version;
        match self.document.apply_remote(update) {
            Ok(applied) => {
                debug!(doc_id = %doc_id, version, "Applied remote operation");
                self.render(&applied.render);
                if let Some(submission) = applied.resubmit {
                    self.submit(submission);
                }
            }
            Err(e) if e.is_malformed() => {
                error!(doc_id = %doc_id, version, error = %e, "Malformed remote operation");
                self.rejoin(1);
            }
            Err(e) => {
                warn!(doc_id = %doc_id, version, error = %e, "Remote operation out of order");
                self.rejoin(1);
            }
        }
    }

    fn rejoin(&mut self, attempt: u32) {
        let doc_id = self.document.doc_id().clone();
        let max_attempts = self.config.max_rejoin_attempts;

        if attempt > max_attempts {
            error!(doc_id = %doc_id, attempts = max_attempts, "Giving up on rejoining");
            self.detach();
            let _ = self.notices.send(Notice::RejoinExhausted {
                doc_id,
                attempts: max_attempts,
            });
            return;
        }

        match self.document.begin_rejoin(attempt) {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                warn!(doc_id = %doc_id, error = %e, "Cannot rejoin");
                return;
            }
        }

        self.epoch += 1;
        self.cancel_tasks();

        let delay = self.config.backoff_for(attempt);
        info!(doc_id = %doc_id, attempt, delay_ms = delay.as_millis() as u64, "Rejoining document");
        self.spawn_join(attempt, delay);
    }

    fn detach(&mut self) {
        self.epoch += 1;
        self.cancel_tasks();
        self.document.detach();
    }

    fn leave(&mut self) {
        let doc_id = self.document.doc_id().clone();
        self.detach();
        if let Some(reply) = self.join_reply.take() {
            let _ = reply.send(Err(SyncError::DocumentClosed(doc_id.clone())));
        }

        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            transport.leave_doc(&doc_id).await;
        });
        info!(doc_id = %self.document.doc_id(), "Left document");
    }
}
