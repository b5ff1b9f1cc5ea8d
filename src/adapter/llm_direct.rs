use crate::adapter::{connect_within, ws_connect_error, Adapter, AdapterState, Inbound, Lifecycle};
use crate::codec::{realtime, FrameCodec};
use crate::config::AdapterConfig;
use crate::connection::{ConnectionHandle, Frame, WsConnection};
use crate::consts::{AUTHORIZATION_HEADER, OPENAI_BETA_HEADER, OPENAI_BETA_REALTIME};
use crate::error::{ConnectCause, ConnectError, DecodeError, EncodeError};
use async_trait::async_trait;
use secrecy::ExposeSecret;
use std::sync::Arc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use voice_relay_types::realtime::ServerEvent;
use voice_relay_types::{BackendType, InternalEvent, Protocol};

const BACKEND: BackendType = BackendType::LlmDirect;

/// Talks to an LLM realtime websocket API directly.
pub struct LlmDirectAdapter {
    config: Arc<AdapterConfig>,
    codec: FrameCodec,
    lifecycle: Lifecycle,
}

impl LlmDirectAdapter {
    pub fn new(config: Arc<AdapterConfig>) -> Self {
        let codec = FrameCodec::from_config(&config);
        Self {
            config,
            codec,
            lifecycle: Lifecycle::new(BACKEND),
        }
    }

    async fn open(&self) -> Result<Arc<dyn ConnectionHandle>, ConnectError> {
        let request = build_request(&self.config)
            .map_err(|e| ConnectError::new(BACKEND, ConnectCause::Transport(e.to_string())))?;
        let (ws_stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| ws_connect_error(BACKEND, e))?;

        let connection: Arc<dyn ConnectionHandle> =
            Arc::new(WsConnection::new(format!("llm-{}", uuid::Uuid::new_v4()), ws_stream));
        self.lifecycle.attach(connection.clone());
        self.lifecycle
            .transition(AdapterState::Handshaking)
            .map_err(|e| ConnectError::new(BACKEND, ConnectCause::Rejected(e.to_string())))?;

        let prompt = Some(self.config.system_prompt.as_str()).filter(|p| !p.is_empty());
        let update = realtime::session_update(prompt)
            .map_err(|e| ConnectError::new(BACKEND, ConnectCause::Rejected(e.to_string())))?;
        connection
            .send(update)
            .await
            .map_err(|e| ConnectError::new(BACKEND, ConnectCause::Transport(e.to_string())))?;

        await_session(connection.as_ref()).await?;
        Ok(connection)
    }
}

/// Waits until the backend acknowledges the session.
async fn await_session(connection: &dyn ConnectionHandle) -> Result<(), ConnectError> {
    loop {
        let frame = match connection.receive().await {
            None => {
                return Err(ConnectError::new(
                    BACKEND,
                    ConnectCause::Rejected("connection closed during handshake".to_string()),
                ))
            }
            Some(Err(e)) => return Err(ConnectError::new(BACKEND, ConnectCause::Transport(e.to_string()))),
            Some(Ok(frame)) => frame,
        };
        let text = match frame {
            Frame::Text(text) => text,
            Frame::Binary(_) => continue,
        };
        match serde_json::from_str::<ServerEvent>(&text) {
            Ok(ServerEvent::SessionCreated(_)) | Ok(ServerEvent::SessionUpdated(_)) => return Ok(()),
            Ok(ServerEvent::Error(e)) => {
                return Err(ConnectError::new(
                    BACKEND,
                    ConnectCause::Rejected(e.error().message().to_string()),
                ))
            }
            Ok(_) => continue,
            Err(e) => {
                let err = DecodeError::new(Protocol::LlmDirect, e.to_string(), text.as_bytes());
                return Err(ConnectError::new(BACKEND, ConnectCause::Rejected(err.to_string())));
            }
        }
    }
}

pub fn build_request(config: &AdapterConfig) -> tokio_tungstenite::tungstenite::Result<Request> {
    let mut request = format!("{}/realtime?model={}", config.llm_url, config.llm_model).into_client_request()?;
    request.headers_mut().insert(
        AUTHORIZATION_HEADER,
        format!("Bearer {}", config.api_key.expose_secret()).as_str().parse()?,
    );
    request.headers_mut().insert(OPENAI_BETA_HEADER, OPENAI_BETA_REALTIME.parse()?);
    Ok(request)
}

#[async_trait]
impl Adapter for LlmDirectAdapter {
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
        self.codec.encode(event, Protocol::LlmDirect)
    }

    fn translate_inbound(&self, frame: Frame) -> Result<Inbound, DecodeError> {
        self.codec.decode(&frame, Protocol::LlmDirect).map(Inbound::from)
    }

    async fn close(&self) {
        self.lifecycle.close().await;
    }
}
