use crate::adapter::{connect_within, Adapter, AdapterState, Inbound, Lifecycle};
use crate::codec::{retell, to_json};
use crate::config::AdapterConfig;
use crate::connection::{ConnectionHandle, Frame, WsConnection};
use crate::error::{ConnectCause, ConnectError, DecodeError, EncodeError};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use voice_relay_types::retell::{RetellConfig, RetellRequest, RetellResponse};
use voice_relay_types::{BackendType, ControlKind, InternalEvent, Protocol};

const BACKEND: BackendType = BackendType::Retell;

/// The port Retell calls into. One listener is shared by every Retell
/// adapter of the process and each `connect` takes the next inbound call.
pub struct RetellListener {
    addr: SocketAddr,
    listener: tokio::sync::Mutex<Option<TcpListener>>,
}

impl RetellListener {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            listener: tokio::sync::Mutex::new(None),
        }
    }

    /// Binds the port if it is not bound yet and returns the bound address.
    pub async fn bind(&self) -> std::io::Result<SocketAddr> {
        let mut slot = self.listener.lock().await;
        Self::ensure_bound(&mut slot, self.addr).await?.local_addr()
    }

    async fn ensure_bound(slot: &mut Option<TcpListener>, addr: SocketAddr) -> std::io::Result<&TcpListener> {
        let listener = match slot.take() {
            Some(listener) => listener,
            None => {
                let listener = TcpListener::bind(addr).await?;
                tracing::info!("waiting for Retell on ws://{}", listener.local_addr()?);
                listener
            }
        };
        Ok(slot.insert(listener))
    }

    /// Waits for Retell to dial in and completes the websocket upgrade.
    pub async fn accept(&self) -> Result<WebSocketStream<TcpStream>, ConnectError> {
        let transport = |e: std::io::Error| ConnectError::new(BACKEND, ConnectCause::Transport(e.to_string()));
        let (tcp, peer) = {
            let mut slot = self.listener.lock().await;
            let listener = Self::ensure_bound(&mut slot, self.addr).await.map_err(transport)?;
            listener.accept().await.map_err(transport)?
        };
        tracing::debug!(peer = %peer, "Retell connected");
        tokio_tungstenite::accept_async(tcp)
            .await
            .map_err(|e| ConnectError::new(BACKEND, ConnectCause::Transport(e.to_string())))
    }
}

/// Speaks Retell's custom LLM websocket protocol on a call accepted from
/// the shared [`RetellListener`].
///
/// Retell asks for answers with a `response_id`; the next assistant text
/// answers it. Text sent while nothing is pending goes out as an agent
/// interrupt instead.
pub struct RetellAdapter {
    config: Arc<AdapterConfig>,
    listener: Arc<RetellListener>,
    lifecycle: Lifecycle,
    pending_response: Mutex<Option<i64>>,
}

impl RetellAdapter {
    pub fn new(config: Arc<AdapterConfig>, listener: Arc<RetellListener>) -> Self {
        Self {
            config,
            listener,
            lifecycle: Lifecycle::new(BACKEND),
            pending_response: Mutex::new(None),
        }
    }

    pub fn pending_response(&self) -> Option<i64> {
        *self.pending_response.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn open(&self) -> Result<Arc<dyn ConnectionHandle>, ConnectError> {
        let transport = |e: String| ConnectError::new(BACKEND, ConnectCause::Transport(e));

        let ws_stream = self.listener.accept().await?;

        let connection: Arc<dyn ConnectionHandle> =
            Arc::new(WsConnection::new(format!("retell-{}", uuid::Uuid::new_v4()), ws_stream));
        self.lifecycle.attach(connection.clone());
        self.lifecycle
            .transition(AdapterState::Handshaking)
            .map_err(|e| ConnectError::new(BACKEND, ConnectCause::Rejected(e.to_string())))?;

        let config = to_json(
            &RetellResponse::Config {
                config: RetellConfig::default(),
            },
            Protocol::Retell,
        )
        .map_err(|e| ConnectError::new(BACKEND, ConnectCause::Rejected(e.to_string())))?;
        connection.send(config).await.map_err(|e| transport(e.to_string()))?;
        Ok(connection)
    }
}

#[async_trait]
impl Adapter for RetellAdapter {
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
        let answers = matches!(event, InternalEvent::TextMessage(_))
            || matches!(event.control_kind(), Some(ControlKind::SessionEnd));
        let pending = if answers {
            self.pending_response.lock().unwrap_or_else(PoisonError::into_inner).take()
        } else {
            None
        };
        retell::encode(event, pending)
    }

    fn translate_inbound(&self, frame: Frame) -> Result<Inbound, DecodeError> {
        let text = match frame {
            Frame::Binary(data) => return Ok(Inbound::Forward(InternalEvent::audio(data, 0, self.config.sample_rate))),
            Frame::Text(text) => text,
        };
        let request = retell::parse(&text)?;
        if let RetellRequest::PingPong { .. } = request {
            let pong = retell::ping_pong(retell::now_millis())
                .map_err(|e| DecodeError::new(Protocol::Retell, e.to_string(), text.as_bytes()))?;
            return Ok(Inbound::Reply(pong));
        }
        if let Some(response_id) = request.response_id() {
            *self.pending_response.lock().unwrap_or_else(PoisonError::into_inner) = Some(response_id);
        }
        Ok(retell::request_event(&request).into())
    }

    async fn close(&self) {
        self.lifecycle.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use std::time::Duration;
    use tokio_tungstenite::tungstenite::Message;
    use voice_relay_types::Role;

    fn adapter() -> RetellAdapter {
        let config = AdapterConfig::new(BackendType::Retell, "");
        let listener = Arc::new(RetellListener::new(config.retell_listen));
        RetellAdapter::new(Arc::new(config), listener)
    }

    fn json(frame: &Frame) -> serde_json::Value {
        match frame {
            Frame::Text(text) => serde_json::from_str(text).unwrap(),
            other => panic!("expected text, got {:?}", other),
        }
    }

    #[test]
    fn ping_is_answered_directly() {
        let inbound = adapter()
            .translate_inbound(Frame::text(r#"{"interaction_type":"ping_pong","timestamp":1}"#))
            .unwrap();
        match inbound {
            Inbound::Reply(frame) => assert_eq!(json(&frame)["response_type"], "ping_pong"),
            other => panic!("expected a reply, got {:?}", other),
        }
    }

    #[test]
    fn response_id_is_answered_once() {
        // --- Arrange ---
        let adapter = adapter();
        let request = Frame::text(
            r#"{"interaction_type":"response_required","response_id":12,"transcript":[{"role":"user","content":"hello?"}]}"#,
        );

        // --- Act ---
        let inbound = adapter.translate_inbound(request).unwrap();
        let first = adapter
            .translate_outbound(&InternalEvent::text(Role::Assistant, "Hi!"))
            .unwrap();
        let second = adapter
            .translate_outbound(&InternalEvent::text(Role::Assistant, "Anything else?"))
            .unwrap();

        // --- Assert ---
        assert_eq!(inbound, Inbound::Forward(InternalEvent::text(Role::User, "hello?")));
        assert_eq!(json(&first[0])["response_id"], 12);
        assert_eq!(json(&second[0])["response_type"], "agent_interrupt");
        assert_eq!(adapter.pending_response(), None);
    }

    #[test]
    fn audio_does_not_consume_pending_response() {
        let adapter = adapter();
        adapter
            .translate_inbound(Frame::text(
                r#"{"interaction_type":"reminder_required","response_id":3,"transcript":[]}"#,
            ))
            .unwrap();
        let frames = adapter
            .translate_outbound(&InternalEvent::audio(vec![9u8; 4], 1, 16000))
            .unwrap();
        assert_eq!(frames, vec![Frame::binary(vec![9u8; 4])]);
        assert_eq!(adapter.pending_response(), Some(3));
    }

    #[tokio::test]
    async fn inbound_call_gets_config_first() {
        // --- Arrange ---
        let listener = Arc::new(RetellListener::new("127.0.0.1:0".parse().unwrap()));
        let addr = listener.bind().await.unwrap();
        let adapter = Arc::new(RetellAdapter::new(
            Arc::new(AdapterConfig::new(BackendType::Retell, "").with_connect_timeout(Duration::from_secs(2))),
            listener,
        ));
        let connecting = {
            let adapter = adapter.clone();
            tokio::spawn(async move { adapter.connect().await.map(|_| ()) })
        };

        // --- Act ---
        let (mut retell, _) = tokio_tungstenite::connect_async(format!("ws://{}/llm-websocket/call-1", addr))
            .await
            .unwrap();
        let first = retell.next().await.unwrap().unwrap();

        // --- Assert ---
        match first {
            Message::Text(text) => {
                let config: serde_json::Value = serde_json::from_str(&text).unwrap();
                assert_eq!(config["response_type"], "config");
            }
            other => panic!("unexpected message {:?}", other),
        }
        connecting.await.unwrap().unwrap();
        assert_eq!(adapter.state(), AdapterState::Streaming);
        adapter.close().await;
        assert_eq!(adapter.state(), AdapterState::Closed);
    }

    #[tokio::test]
    async fn no_inbound_call_times_out() {
        let listener = Arc::new(RetellListener::new("127.0.0.1:0".parse().unwrap()));
        listener.bind().await.unwrap();
        let adapter = RetellAdapter::new(
            Arc::new(AdapterConfig::new(BackendType::Retell, "").with_connect_timeout(Duration::from_millis(50))),
            listener.clone(),
        );

        let err = adapter.connect().await.err().unwrap();

        assert_eq!(err.cause, ConnectCause::Timeout);
        assert_eq!(adapter.state(), AdapterState::Closed);
        // The port stays open for the next session.
        let addr = listener.bind().await.unwrap();
        assert!(TcpStream::connect(addr).await.is_ok());
    }
}
