//! Live sockets as seen by the session pipeline.
//!
//! A [`ConnectionHandle`] is shared (`Arc`) between the read loop and the
//! writer of one session and between the session and its adapter, so every
//! method takes `&self`. `close()` is idempotent on every implementation.

pub mod memory;

use crate::error::SessionError;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// One message on a socket, independent of the websocket library.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
}

impl Frame {
    pub fn text(text: impl Into<String>) -> Self {
        Frame::Text(text.into())
    }

    pub fn binary(data: impl Into<Bytes>) -> Self {
        Frame::Binary(data.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Frame::Text(text) => text.as_bytes(),
            Frame::Binary(data) => data,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
pub trait ConnectionHandle: Send + Sync {
    /// Stable identifier of this connection, unique for the process lifetime.
    fn id(&self) -> &str;

    async fn send(&self, frame: Frame) -> Result<(), SessionError>;

    /// Waits for the next frame. Returns `None` once the connection is closed,
    /// by either side.
    async fn receive(&self) -> Option<Result<Frame, SessionError>>;

    /// Closes the connection. Calling it again is a no-op.
    async fn close(&self);

    fn is_closed(&self) -> bool;
}

/// What a websocket message means for the relay.
pub enum Incoming {
    Frame(Frame),
    Close,
    /// Ping, pong and raw frames are handled by the websocket library.
    Skip,
}

/// Conversion between a websocket library's message type and [`Frame`].
pub trait WireMessage: Sized {
    fn classify(self) -> Incoming;
    fn from_frame(frame: Frame) -> Self;
    fn close_frame() -> Self;
}

impl WireMessage for tokio_tungstenite::tungstenite::Message {
    fn classify(self) -> Incoming {
        use tokio_tungstenite::tungstenite::Message;
        match self {
            Message::Text(text) => Incoming::Frame(Frame::Text(text)),
            Message::Binary(data) => Incoming::Frame(Frame::Binary(Bytes::from(data))),
            Message::Close(_) => Incoming::Close,
            _ => Incoming::Skip,
        }
    }

    fn from_frame(frame: Frame) -> Self {
        use tokio_tungstenite::tungstenite::Message;
        match frame {
            Frame::Text(text) => Message::Text(text),
            Frame::Binary(data) => Message::Binary(data.to_vec()),
        }
    }

    fn close_frame() -> Self {
        tokio_tungstenite::tungstenite::Message::Close(None)
    }
}

impl WireMessage for axum::extract::ws::Message {
    fn classify(self) -> Incoming {
        use axum::extract::ws::Message;
        match self {
            Message::Text(text) => Incoming::Frame(Frame::Text(text.as_str().to_owned())),
            Message::Binary(data) => Incoming::Frame(Frame::Binary(data)),
            Message::Close(_) => Incoming::Close,
            _ => Incoming::Skip,
        }
    }

    fn from_frame(frame: Frame) -> Self {
        use axum::extract::ws::Message;
        match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(data) => Message::Binary(data),
        }
    }

    fn close_frame() -> Self {
        axum::extract::ws::Message::Close(None)
    }
}

/// A websocket split into independently locked halves so that a read loop
/// blocked in `receive` never holds up a writer.
///
/// `close` gives up on the closing handshake after `close_timeout`; a peer
/// that stopped reading cannot hold a shutdown.
pub struct WsConnection<S, M>
where
    S: Sink<M>,
{
    id: String,
    sink: Mutex<SplitSink<S, M>>,
    stream: Mutex<SplitStream<S>>,
    closing: AtomicBool,
    peer_closed: AtomicBool,
    cancel: CancellationToken,
    close_timeout: Duration,
}

impl<S, M, E> WsConnection<S, M>
where
    S: Stream<Item = Result<M, E>> + Sink<M> + Send + 'static,
{
    pub fn new(id: impl Into<String>, socket: S) -> Self {
        let (sink, stream) = socket.split();
        Self {
            id: id.into(),
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            closing: AtomicBool::new(false),
            peer_closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            close_timeout: crate::consts::DEFAULT_SHUTDOWN_GRACE,
        }
    }

    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }
}

#[async_trait]
impl<S, M, E> ConnectionHandle for WsConnection<S, M>
where
    S: Stream<Item = Result<M, E>> + Sink<M> + Send + 'static,
    <S as Sink<M>>::Error: Display + Send,
    M: WireMessage + Send + Sync + 'static,
    E: Display + Send,
{
    fn id(&self) -> &str {
        &self.id
    }

    async fn send(&self, frame: Frame) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed);
        }
        let mut sink = self.sink.lock().await;
        sink.send(M::from_frame(frame)).await.map_err(SessionError::transport)
    }

    async fn receive(&self) -> Option<Result<Frame, SessionError>> {
        let mut stream = self.stream.lock().await;
        loop {
            if self.is_closed() {
                return None;
            }
            let next = tokio::select! {
                _ = self.cancel.cancelled() => return None,
                next = stream.next() => next,
            };
            match next {
                None => {
                    self.peer_closed.store(true, Ordering::SeqCst);
                    return None;
                }
                Some(Err(e)) => return Some(Err(SessionError::transport(e))),
                Some(Ok(message)) => match message.classify() {
                    Incoming::Frame(frame) => return Some(Ok(frame)),
                    Incoming::Close => {
                        tracing::debug!(connection = %self.id, "peer sent close frame");
                        self.peer_closed.store(true, Ordering::SeqCst);
                        return None;
                    }
                    Incoming::Skip => continue,
                },
            }
        }
    }

    async fn close(&self) {
        if self.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        let handshake = async {
            let mut sink = self.sink.lock().await;
            if !self.peer_closed.load(Ordering::SeqCst) {
                if let Err(e) = sink.send(M::close_frame()).await {
                    tracing::debug!(connection = %self.id, "failed to send close frame: {}", e);
                }
            }
            if let Err(e) = sink.close().await {
                tracing::debug!(connection = %self.id, "failed to close sink: {}", e);
            }
        };
        if tokio::time::timeout(self.close_timeout, handshake).await.is_err() {
            tracing::debug!(connection = %self.id, "close handshake timed out, dropping it");
        }
    }

    fn is_closed(&self) -> bool {
        self.closing.load(Ordering::SeqCst) || self.peer_closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio_tungstenite::tungstenite::Message;

    /// A socket whose peer never reads or writes again.
    struct Stalled;

    impl Stream for Stalled {
        type Item = Result<Message, Infallible>;

        fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            Poll::Pending
        }
    }

    impl Sink<Message> for Stalled {
        type Error = Infallible;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Infallible>> {
            Poll::Pending
        }

        fn start_send(self: Pin<&mut Self>, _item: Message) -> Result<(), Infallible> {
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Infallible>> {
            Poll::Pending
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Infallible>> {
            Poll::Pending
        }
    }

    #[tokio::test]
    async fn close_gives_up_on_a_stalled_peer() {
        // --- Arrange ---
        let connection: WsConnection<Stalled, Message> =
            WsConnection::new("stalled", Stalled).with_close_timeout(Duration::from_millis(50));

        // --- Act ---
        let closed = tokio::time::timeout(Duration::from_secs(1), connection.close()).await;

        // --- Assert ---
        assert!(closed.is_ok(), "close waited on a peer that never reads");
        assert!(connection.is_closed());
        assert!(connection.receive().await.is_none());
        // A second close is a no-op and returns at once.
        connection.close().await;
    }

    #[test]
    fn tungstenite_messages_map_to_frames() {
        match Message::Binary(vec![1, 2, 3]).classify() {
            Incoming::Frame(frame) => assert_eq!(frame, Frame::binary(vec![1u8, 2, 3])),
            _ => panic!("binary message should become a frame"),
        }
        assert!(matches!(Message::Ping(vec![]).classify(), Incoming::Skip));
        assert!(matches!(Message::Close(None).classify(), Incoming::Close));
        assert_eq!(Message::from_frame(Frame::text("hi")), Message::Text("hi".to_string()));
    }

    #[test]
    fn axum_messages_map_to_frames() {
        use axum::extract::ws::Message as AxumMessage;
        match AxumMessage::Text("hello".into()).classify() {
            Incoming::Frame(frame) => assert_eq!(frame, Frame::text("hello")),
            _ => panic!("text message should become a frame"),
        }
        let audio = Bytes::from_static(&[7, 7, 7]);
        match AxumMessage::from_frame(Frame::Binary(audio.clone())) {
            AxumMessage::Binary(data) => assert_eq!(data, audio),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn websocket_pair_exchanges_frames_and_closes_once() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            let conn = WsConnection::new("server", ws);
            let frame = conn.receive().await.unwrap().unwrap();
            conn.send(frame).await.unwrap();
            // The client closes; the server sees the end of the stream.
            assert!(conn.receive().await.is_none());
        });

        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{}", addr)).await.unwrap();
        let conn = WsConnection::new("client", ws);
        conn.send(Frame::binary(vec![1u8, 2, 3])).await.unwrap();
        assert_eq!(conn.receive().await.unwrap().unwrap(), Frame::binary(vec![1u8, 2, 3]));

        conn.close().await;
        conn.close().await;
        assert!(conn.is_closed());
        assert_eq!(conn.send(Frame::text("late")).await, Err(SessionError::Closed));
        server.await.unwrap();
    }
}
