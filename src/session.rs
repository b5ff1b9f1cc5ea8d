//! One client bridged to one backend.
//!
//! A running session is four tasks:
//!
//! * `client_read` decodes client frames onto the backend queue
//! * `backend_write` drains that queue through the adapter to the backend
//! * `backend_read` decodes backend frames through the adapter onto the client queue
//! * `client_write` drains the client queue to the client
//!
//! Queues are bounded, so a slow side stalls the reader feeding it. The first
//! task to stop decides the [`SessionExit`]; the others are cancelled.

use crate::adapter::{Adapter, Inbound};
use crate::codec::FrameCodec;
use crate::config::RelayConfig;
use crate::connection::{ConnectionHandle, Frame};
use crate::error::{ConnectError, SessionError};
use crate::queue::EventQueue;
use crate::sequence::SequenceTracker;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use voice_relay_types::{BackendType, ControlKind, ErrorCause, InternalEvent, Protocol};

pub type SessionId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    Closing,
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Connecting => "connecting",
            SessionState::Active => "active",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionExit {
    /// A session end was delivered.
    Finished,
    ClientClosed,
    BackendClosed,
    /// Closed from outside through [`Session::close`].
    Cancelled,
    Failed(SessionError),
}

impl SessionExit {
    /// The error the client is told about before the session closes.
    fn client_error(&self) -> Option<InternalEvent> {
        match self {
            SessionExit::BackendClosed => Some(InternalEvent::error(
                ErrorCause::Transport,
                "backend closed the connection",
            )),
            SessionExit::Failed(e) => Some(InternalEvent::error(ErrorCause::Transport, e.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for SessionExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionExit::Finished => f.write_str("finished"),
            SessionExit::ClientClosed => f.write_str("client closed"),
            SessionExit::BackendClosed => f.write_str("backend closed"),
            SessionExit::Cancelled => f.write_str("cancelled"),
            SessionExit::Failed(e) => write!(f, "failed: {}", e),
        }
    }
}

pub struct Session {
    id: SessionId,
    created_at: SystemTime,
    client: Arc<dyn ConnectionHandle>,
    adapter: Arc<dyn Adapter>,
    backend: OnceLock<Arc<dyn ConnectionHandle>>,
    codec: FrameCodec,
    to_backend: Arc<EventQueue<InternalEvent>>,
    to_client: Arc<EventQueue<InternalEvent>>,
    cancel: CancellationToken,
    state: watch::Sender<SessionState>,
    shutdown_grace: Duration,
    started: AtomicBool,
    released: AtomicBool,
}

impl Session {
    /// The session id is the client connection id.
    pub fn new(client: Arc<dyn ConnectionHandle>, adapter: Arc<dyn Adapter>, config: &RelayConfig) -> Self {
        let (state, _) = watch::channel(SessionState::Connecting);
        Self {
            id: client.id().to_string(),
            created_at: SystemTime::now(),
            client,
            adapter,
            backend: OnceLock::new(),
            codec: FrameCodec::from_config(&config.adapter),
            to_backend: Arc::new(EventQueue::new(config.queue_capacity)),
            to_client: Arc::new(EventQueue::new(config.queue_capacity)),
            cancel: CancellationToken::new(),
            state,
            shutdown_grace: config.shutdown_grace,
            started: AtomicBool::new(false),
            released: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    pub fn backend(&self) -> BackendType {
        self.adapter.backend()
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: SessionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!(session = %self.id, from = %previous, to = %state, "session state change");
        }
    }

    /// Connects the backend. On failure the session stays unusable and the
    /// caller is responsible for telling the client.
    pub async fn connect(&self) -> Result<(), ConnectError> {
        let backend = self.adapter.connect().await?;
        if self.backend.set(backend).is_err() {
            tracing::warn!(session = %self.id, "backend connected twice");
        }
        Ok(())
    }

    /// Runs the pipeline until the session ends, then releases both
    /// connections. Only the first call runs anything.
    pub async fn run(&self) -> SessionExit {
        if self.started.swap(true, Ordering::SeqCst) {
            return SessionExit::Cancelled;
        }
        let backend = match self.backend.get() {
            Some(backend) => backend.clone(),
            None => {
                self.release().await;
                return SessionExit::Failed(SessionError::Closed);
            }
        };
        if self.cancel.is_cancelled() {
            self.release().await;
            return SessionExit::Cancelled;
        }

        self.set_state(SessionState::Active);
        tracing::info!(session = %self.id, backend = %self.adapter.backend(), "session started");

        let pipeline = Pipeline {
            session: self.id.clone(),
            client: self.client.clone(),
            backend,
            adapter: self.adapter.clone(),
            codec: self.codec,
            to_backend: self.to_backend.clone(),
            to_client: self.to_client.clone(),
            cancel: self.cancel.clone(),
        };
        let start = InternalEvent::control_with(ControlKind::SessionStart, self.id.clone());
        pipeline.enqueue(&pipeline.to_client, start).await;

        let mut tasks = JoinSet::new();
        tasks.spawn(pipeline.clone().client_read());
        tasks.spawn(pipeline.clone().backend_write());
        tasks.spawn(pipeline.clone().backend_read());
        tasks.spawn(pipeline.client_write());

        let exit = match tasks.join_next().await {
            Some(Ok(exit)) => exit,
            Some(Err(e)) => SessionExit::Failed(SessionError::Task(e.to_string())),
            None => SessionExit::Cancelled,
        };
        self.shutdown(&exit, tasks).await;
        exit
    }

    async fn shutdown(&self, exit: &SessionExit, mut tasks: JoinSet<SessionExit>) {
        self.set_state(SessionState::Closing);
        match exit {
            SessionExit::Failed(_) | SessionExit::BackendClosed => {
                tracing::warn!(session = %self.id, "session ending: {}", exit)
            }
            _ => tracing::info!(session = %self.id, "session ending: {}", exit),
        }

        self.cancel.cancel();
        self.to_backend.close();
        self.to_client.close();
        let drained = tokio::time::timeout(self.shutdown_grace, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!(session = %self.id, "session tasks did not stop in time, aborting");
            tasks.shutdown().await;
        }

        if let Some(error) = exit.client_error() {
            self.notify_client(&error).await;
        }
        self.release().await;
    }

    /// Best effort: the client may already be gone.
    async fn notify_client(&self, event: &InternalEvent) {
        let frames = match self.codec.encode(event, Protocol::Client) {
            Ok(frames) => frames,
            Err(e) => {
                tracing::warn!(session = %self.id, "failed to encode error for client: {}", e);
                return;
            }
        };
        for frame in frames {
            match tokio::time::timeout(self.shutdown_grace, self.client.send(frame)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::debug!(session = %self.id, "could not notify client: {}", e);
                    return;
                }
                Err(_) => {
                    tracing::debug!(session = %self.id, "timed out notifying client");
                    return;
                }
            }
        }
    }

    async fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        self.adapter.close().await;
        self.client.close().await;
        self.set_state(SessionState::Closed);
        tracing::info!(session = %self.id, "session closed");
    }

    /// Closes the session and waits until it is [`SessionState::Closed`].
    /// Safe to call any number of times, from any task.
    pub async fn close(&self) {
        self.cancel.cancel();
        if !self.started.load(Ordering::SeqCst) {
            self.release().await;
        }
        let mut state = self.state.subscribe();
        let _ = state.wait_for(|s| *s == SessionState::Closed).await;
    }
}

/// What the four session tasks share.
#[derive(Clone)]
struct Pipeline {
    session: SessionId,
    client: Arc<dyn ConnectionHandle>,
    backend: Arc<dyn ConnectionHandle>,
    adapter: Arc<dyn Adapter>,
    codec: FrameCodec,
    to_backend: Arc<EventQueue<InternalEvent>>,
    to_client: Arc<EventQueue<InternalEvent>>,
    cancel: CancellationToken,
}

impl Pipeline {
    /// Waits for room in `queue`. False when the session is going away.
    async fn enqueue(&self, queue: &EventQueue<InternalEvent>, event: InternalEvent) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            pushed = queue.push(event) => pushed.is_ok(),
        }
    }

    /// A reader that queued a session end stops reading and leaves the exit
    /// to the writer delivering it.
    async fn park(&self) -> SessionExit {
        self.cancel.cancelled().await;
        SessionExit::Finished
    }

    async fn send(&self, connection: &dyn ConnectionHandle, frame: Frame) -> Option<Result<(), SessionError>> {
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            sent = connection.send(frame) => Some(sent),
        }
    }

    async fn client_read(self) -> SessionExit {
        let mut sequence = SequenceTracker::new("client");
        loop {
            let received = tokio::select! {
                _ = self.cancel.cancelled() => return SessionExit::Cancelled,
                received = self.client.receive() => received,
            };
            let frame = match received {
                None => return SessionExit::ClientClosed,
                Some(Err(e)) => return SessionExit::Failed(e),
                Some(Ok(frame)) => frame,
            };
            let mut event = match self.codec.decode(&frame, Protocol::Client) {
                Ok(Some(event)) => event,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(session = %self.session, "dropping client frame: {}", e);
                    continue;
                }
            };
            sequence.observe(&mut event);

            if event.is_interrupt() {
                let dropped = self.to_client.discard_for_interrupt();
                tracing::debug!(session = %self.session, dropped, "client interrupt");
            }
            let end = event.is_session_end();
            if !self.enqueue(&self.to_backend, event).await {
                return SessionExit::Cancelled;
            }
            if end {
                tracing::debug!(session = %self.session, "client ended the session");
                return self.park().await;
            }
        }
    }

    async fn backend_write(self) -> SessionExit {
        loop {
            let popped = tokio::select! {
                _ = self.cancel.cancelled() => return SessionExit::Cancelled,
                popped = self.to_backend.pop() => popped,
            };
            let Some(event) = popped else {
                return SessionExit::Cancelled;
            };
            let end = event.is_session_end();
            match self.adapter.translate_outbound(&event) {
                Ok(frames) => {
                    for frame in frames {
                        match self.send(self.backend.as_ref(), frame).await {
                            None => return SessionExit::Cancelled,
                            Some(Err(SessionError::Closed)) => return SessionExit::BackendClosed,
                            Some(Err(e)) => return SessionExit::Failed(e),
                            Some(Ok(())) => {}
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(session = %self.session, event = event.kind_name(), "dropping event for backend: {}", e)
                }
            }
            if end {
                return SessionExit::Finished;
            }
        }
    }

    async fn backend_read(self) -> SessionExit {
        let mut sequence = SequenceTracker::new("backend");
        loop {
            let received = tokio::select! {
                _ = self.cancel.cancelled() => return SessionExit::Cancelled,
                received = self.backend.receive() => received,
            };
            let frame = match received {
                None => return SessionExit::BackendClosed,
                Some(Err(e)) => return SessionExit::Failed(e),
                Some(Ok(frame)) => frame,
            };
            let mut event = match self.adapter.translate_inbound(frame) {
                Ok(Inbound::Forward(event)) => event,
                Ok(Inbound::Reply(reply)) => {
                    match self.send(self.backend.as_ref(), reply).await {
                        None => return SessionExit::Cancelled,
                        Some(Err(e)) => return SessionExit::Failed(e),
                        Some(Ok(())) => {}
                    }
                    continue;
                }
                Ok(Inbound::Ignore) => continue,
                Err(e) => {
                    tracing::warn!(session = %self.session, "dropping backend frame: {}", e);
                    continue;
                }
            };
            sequence.observe(&mut event);

            if event.is_interrupt() {
                let dropped = self.to_backend.discard_for_interrupt();
                tracing::debug!(session = %self.session, dropped, "backend interrupt");
            }
            let end = event.is_session_end();
            if !self.enqueue(&self.to_client, event).await {
                return SessionExit::Cancelled;
            }
            if end {
                tracing::debug!(session = %self.session, "backend ended the session");
                return self.park().await;
            }
        }
    }

    async fn client_write(self) -> SessionExit {
        loop {
            let popped = tokio::select! {
                _ = self.cancel.cancelled() => return SessionExit::Cancelled,
                popped = self.to_client.pop() => popped,
            };
            let Some(event) = popped else {
                return SessionExit::Cancelled;
            };
            let end = event.is_session_end();
            match self.codec.encode(&event, Protocol::Client) {
                Ok(frames) => {
                    for frame in frames {
                        match self.send(self.client.as_ref(), frame).await {
                            None => return SessionExit::Cancelled,
                            Some(Err(e)) => {
                                tracing::debug!(session = %self.session, "client send failed: {}", e);
                                return SessionExit::ClientClosed;
                            }
                            Some(Ok(())) => {}
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(session = %self.session, event = event.kind_name(), "dropping event for client: {}", e)
                }
            }
            if end {
                return SessionExit::Finished;
            }
        }
    }
}
