use crate::adapter::{connect_within, Adapter, AdapterState, Inbound, Lifecycle};
use crate::codec::{voiceflow, FrameCodec};
use crate::config::AdapterConfig;
use crate::connection::{ConnectionHandle, Frame};
use crate::consts::{AUTHORIZATION_HEADER, VOICEFLOW_VERSION_HEADER};
use crate::error::{ConnectCause, ConnectError, DecodeError, EncodeError, SessionError};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use voice_relay_types::voiceflow::{InteractRequest, Trace};
use voice_relay_types::{BackendType, InternalEvent, Protocol};

const BACKEND: BackendType = BackendType::VoiceFlow;
const TRACE_BUFFER: usize = 256;

/// The VoiceFlow dialog runtime behind a [`ConnectionHandle`].
///
/// Every sent frame is one `interact` request. The traces in the answer are
/// coalesced, queued as one text frame each and handed out by `receive`.
/// A failed request is answered with the configured apology instead of
/// ending the conversation.
pub struct VoiceflowConnection {
    id: String,
    http: reqwest::Client,
    endpoint: String,
    api_key: SecretString,
    version_id: String,
    error_reply: String,
    traces_tx: mpsc::Sender<Frame>,
    traces_rx: Mutex<mpsc::Receiver<Frame>>,
    closed: AtomicBool,
    cancel: CancellationToken,
}

impl VoiceflowConnection {
    pub fn new(config: &AdapterConfig) -> Result<Self, SessionError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(SessionError::transport)?;
        let user_id = format!("user-{}", uuid::Uuid::new_v4());
        let (traces_tx, traces_rx) = mpsc::channel(TRACE_BUFFER);
        Ok(Self {
            id: format!("voiceflow-{}", user_id),
            http,
            endpoint: format!(
                "{}/state/user/{}/interact",
                config.voiceflow_url.trim_end_matches('/'),
                user_id
            ),
            api_key: SecretString::from(config.api_key.expose_secret().to_string()),
            version_id: config.version_id.clone(),
            error_reply: config.error_reply.clone(),
            traces_tx,
            traces_rx: Mutex::new(traces_rx),
            closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Posts one request body and returns the traces of the answer.
    /// Elements that are not traces are skipped.
    pub async fn interact(&self, body: String) -> Result<Vec<Trace>, SessionError> {
        let response = self
            .http
            .post(&self.endpoint)
            .header(AUTHORIZATION_HEADER, self.api_key.expose_secret())
            .header(VOICEFLOW_VERSION_HEADER, &self.version_id)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(SessionError::transport)?;

        let status = response.status();
        let body = response.text().await.map_err(SessionError::transport)?;
        if !status.is_success() {
            return Err(SessionError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let raw: Vec<serde_json::Value> = serde_json::from_str(&body).map_err(SessionError::transport)?;
        Ok(raw
            .into_iter()
            .filter_map(|value| match serde_json::from_value::<Trace>(value) {
                Ok(trace) => Some(trace),
                Err(e) => {
                    tracing::warn!(connection = %self.id, "skipping malformed trace: {}", e);
                    None
                }
            })
            .collect())
    }

    async fn enqueue(&self, traces: Vec<Trace>) -> Result<(), SessionError> {
        for trace in traces {
            let frame = serde_json::to_string(&trace).map_err(SessionError::transport)?;
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(SessionError::Closed),
                sent = self.traces_tx.send(Frame::Text(frame)) => {
                    sent.map_err(|_| SessionError::Closed)?;
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ConnectionHandle for VoiceflowConnection {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send(&self, frame: Frame) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed);
        }
        let body = match frame {
            Frame::Text(body) => body,
            Frame::Binary(_) => {
                return Err(SessionError::Transport(
                    "binary frames are not supported by the dialog runtime".to_string(),
                ))
            }
        };
        let answer = tokio::select! {
            _ = self.cancel.cancelled() => return Err(SessionError::Closed),
            answer = self.interact(body) => answer,
        };
        let traces = match answer {
            Ok(traces) => {
                tracing::debug!(connection = %self.id, traces = traces.len(), "interact answered");
                voiceflow::coalesce(traces)
            }
            Err(SessionError::Closed) => return Err(SessionError::Closed),
            Err(e) => {
                tracing::warn!(connection = %self.id, "interact failed, sending apology: {}", e);
                vec![Trace::text(&self.error_reply)]
            }
        };
        self.enqueue(traces).await
    }

    async fn receive(&self) -> Option<Result<Frame, SessionError>> {
        let mut rx = self.traces_rx.lock().await;
        tokio::select! {
            biased;
            frame = rx.recv() => frame.map(Ok),
            _ = self.cancel.cancelled() => None,
        }
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.cancel.cancel();
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Drives a VoiceFlow agent over its HTTP dialog runtime.
pub struct VoiceflowAdapter {
    config: Arc<AdapterConfig>,
    codec: FrameCodec,
    lifecycle: Lifecycle,
}

impl VoiceflowAdapter {
    pub fn new(config: Arc<AdapterConfig>) -> Self {
        let codec = FrameCodec::from_config(&config);
        Self {
            config,
            codec,
            lifecycle: Lifecycle::new(BACKEND),
        }
    }

    /// Launches the dialog. The launch traces are the first frames the
    /// session reads; the greeting stands in when they contain no text.
    async fn open(&self) -> Result<Arc<dyn ConnectionHandle>, ConnectError> {
        let connection = Arc::new(
            VoiceflowConnection::new(&self.config)
                .map_err(|e| ConnectError::new(BACKEND, ConnectCause::Transport(e.to_string())))?,
        );
        self.lifecycle.attach(connection.clone());
        self.lifecycle
            .transition(AdapterState::Handshaking)
            .map_err(|e| ConnectError::new(BACKEND, ConnectCause::Rejected(e.to_string())))?;

        let launch = serde_json::to_string(&InteractRequest::launch())
            .map_err(|e| ConnectError::new(BACKEND, ConnectCause::Rejected(e.to_string())))?;
        let traces = connection.interact(launch).await.map_err(launch_error)?;

        let mut queued = voiceflow::coalesce(traces);
        if !queued.iter().any(|trace| trace.message().is_some()) {
            let at = queued.iter().position(|trace| *trace == Trace::End).unwrap_or(queued.len());
            queued.insert(at, Trace::text(&self.config.greeting));
        }
        tracing::debug!(connection = connection.id(), traces = queued.len(), "dialog launched");
        connection
            .enqueue(queued)
            .await
            .map_err(|e| ConnectError::new(BACKEND, ConnectCause::Transport(e.to_string())))?;

        Ok(connection)
    }
}

fn launch_error(e: SessionError) -> ConnectError {
    let cause = match e {
        SessionError::Status { status: 401 | 403, body } => ConnectCause::Authentication(body),
        SessionError::Status { status, body } => ConnectCause::Rejected(format!("status {}: {}", status, body)),
        other => ConnectCause::Transport(other.to_string()),
    };
    ConnectError::new(BACKEND, cause)
}

#[async_trait]
impl Adapter for VoiceflowAdapter {
    fn backend(&self) -> BackendType {
        BACKEND
    }

    fn state(&self) -> AdapterState {
        self.lifecycle.state()
    }

    async fn connect(&self) -> Result<Arc<dyn ConnectionHandle>, ConnectError> {
        connect_within(&self.lifecycle, BACKEND, self.config.connect_timeout, self.open()).await
    }

    fn translate_outbound(&self, event: &InternalEvent) -> Result<Vec<Frame>, EncodeError> {
        self.codec.encode(event, Protocol::VoiceFlow)
    }

    fn translate_inbound(&self, frame: Frame) -> Result<Inbound, DecodeError> {
        self.codec.decode(&frame, Protocol::VoiceFlow).map(Inbound::from)
    }

    async fn close(&self) {
        self.lifecycle.close().await;
    }
}
