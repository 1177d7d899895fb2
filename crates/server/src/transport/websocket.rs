//! Websocket transport and listener
//!
//! [`WebSocketTransport`] adapts one upgraded websocket to the [`Transport`]
//! contract. [`WebSocketServer`] accepts TCP connections, performs the
//! handshake and hands each connection to a [`Registry`].

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use sockets_protocol::{Frame, FrameKind, Session, TransportError, TransportResult as Result};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{accept_async_with_config, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::Transport;
use crate::config::{PayloadFrame, WebSocketConfig};
use crate::registry::Registry;

/// Upper bound on the closing handshake once the connection is torn down
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// [`Transport`] over an upgraded websocket
pub struct WebSocketTransport<S = TcpStream> {
    sink: Mutex<SplitSink<WebSocketStream<S>, Message>>,
    stream: Mutex<SplitStream<WebSocketStream<S>>>,
    payload_frame: PayloadFrame,
    closed: AtomicBool,
    close_sent: AtomicBool,
    shutdown: CancellationToken,
}

impl<S> WebSocketTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Wraps an already upgraded websocket
    pub fn new(socket: WebSocketStream<S>, payload_frame: PayloadFrame) -> Self {
        let (sink, stream) = socket.split();
        Self {
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            payload_frame,
            closed: AtomicBool::new(false),
            close_sent: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        }
    }

    /// Performs the server side of the websocket handshake on `stream`
    pub async fn accept(
        stream: S,
        config: &WebSocketConfig,
    ) -> std::result::Result<Self, WebSocketServerError> {
        let socket = accept_async_with_config(stream, Some(config.protocol_config()))
            .await
            .map_err(|e| WebSocketServerError::Handshake(e.to_string()))?;
        Ok(Self::new(socket, config.payload_frame))
    }

    fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.shutdown.cancel();
    }

    fn classify(&self, message: Message) -> Result<Frame> {
        let frame = match (message, self.payload_frame) {
            (Message::Text(text), PayloadFrame::Text) => Frame::Message(Bytes::from(text)),
            (Message::Binary(data), PayloadFrame::Binary) => Frame::Message(Bytes::from(data)),
            (Message::Text(_), _) => Frame::Unsupported(FrameKind::Text),
            (Message::Binary(_), _) => Frame::Unsupported(FrameKind::Binary),
            (Message::Ping(_), _) => Frame::Unsupported(FrameKind::Ping),
            (Message::Pong(_), _) => Frame::Unsupported(FrameKind::Pong),
            (Message::Frame(_), _) => Frame::Unsupported(FrameKind::Continuation),
            (Message::Close(_), _) => {
                self.mark_closed();
                return Err(TransportError::Closed);
            }
        };
        Ok(frame)
    }

    fn message(&self, frame: Bytes) -> Result<Message> {
        match self.payload_frame {
            PayloadFrame::Binary => Ok(Message::Binary(frame.to_vec())),
            PayloadFrame::Text => String::from_utf8(frame.to_vec())
                .map(Message::Text)
                .map_err(|_| TransportError::WebSocket("text frame payload is not valid UTF-8".into())),
        }
    }
}

#[async_trait]
impl<S> Transport for WebSocketTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn write(&self, frame: Bytes) -> Result<()> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        let message = self.message(frame)?;
        let sent = tokio::select! {
            biased;

            _ = self.shutdown.cancelled() => return Err(TransportError::Closed),

            sent = async {
                let mut sink = self.sink.lock().await;
                sink.send(message).await
            } => sent,
        };

        sent.map_err(|e| {
            self.mark_closed();
            match e {
                tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                    TransportError::Closed
                }
                tungstenite::Error::Io(io) => TransportError::Io(io.to_string()),
                other => TransportError::WebSocket(other.to_string()),
            }
        })
    }

    async fn read(&self) -> Result<Frame> {
        let mut stream = self.stream.lock().await;

        let next = tokio::select! {
            biased;

            _ = self.shutdown.cancelled() => return Err(TransportError::Closed),

            next = stream.next() => next,
        };

        match next {
            Some(Ok(message)) => self.classify(message),
            Some(Err(e)) => {
                self.mark_closed();
                Err(TransportError::WebSocket(e.to_string()))
            }
            None => {
                self.mark_closed();
                Err(TransportError::Closed)
            }
        }
    }

    async fn close(&self) -> Result<()> {
        self.mark_closed();
        if self.close_sent.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        // A peer that stopped reading never drains the close frame
        let closed = tokio::time::timeout(CLOSE_TIMEOUT, async {
            let mut sink = self.sink.lock().await;
            sink.close().await
        })
        .await;

        match closed {
            Ok(Ok(())) => Ok(()),
            Ok(Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed)) => Ok(()),
            Ok(Err(e)) => Err(TransportError::WebSocket(e.to_string())),
            Err(_) => {
                tracing::debug!("Closing handshake timed out");
                Ok(())
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Accepts websocket connections into a [`Registry`]
pub struct WebSocketServer {
    listener: TcpListener,
    config: WebSocketConfig,
}

impl WebSocketServer {
    /// Binds a listener with the default [`WebSocketConfig`]
    pub async fn bind(addr: impl ToSocketAddrs) -> std::result::Result<Self, WebSocketServerError> {
        Self::bind_with_config(addr, WebSocketConfig::default()).await
    }

    pub async fn bind_with_config(
        addr: impl ToSocketAddrs,
        config: WebSocketConfig,
    ) -> std::result::Result<Self, WebSocketServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| WebSocketServerError::Bind(e.to_string()))?;
        Ok(Self { listener, config })
    }

    pub fn local_addr(&self) -> std::result::Result<SocketAddr, WebSocketServerError> {
        self.listener
            .local_addr()
            .map_err(|e| WebSocketServerError::Io(e.to_string()))
    }

    /// Accepts connections until the task is dropped
    pub async fn serve<F, S>(self, registry: Registry, sessions: F) -> std::result::Result<(), WebSocketServerError>
    where
        F: FnMut() -> S,
        S: Session,
    {
        self.serve_until(registry, sessions, std::future::pending()).await
    }

    /// Accepts connections until `shutdown` resolves, then closes every client
    ///
    /// `sessions` builds the session of each accepted connection. A failed
    /// handshake only drops that connection. Text payload frames require a
    /// codec whose output is always UTF-8.
    pub async fn serve_until<F, S, Sh>(
        self,
        registry: Registry,
        mut sessions: F,
        shutdown: Sh,
    ) -> std::result::Result<(), WebSocketServerError>
    where
        F: FnMut() -> S,
        S: Session,
        Sh: Future<Output = ()>,
    {
        let codec = registry.codec();
        if self.config.payload_frame == PayloadFrame::Text && !codec.emits_text() {
            return Err(WebSocketServerError::IncompatibleCodec(codec.name()));
        }

        let addr = self.local_addr()?;
        tracing::info!(%addr, "WebSocket server listening");

        let cancel = CancellationToken::new();
        let mut handshakes = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => break,

                Some(joined) = handshakes.join_next(), if !handshakes.is_empty() => {
                    if let Err(e) = joined {
                        tracing::warn!(error = %e, "Handshake task failed");
                    }
                }

                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to accept connection");
                            continue;
                        }
                    };

                    tracing::debug!(%peer, "New TCP connection");
                    let session = sessions();
                    let config = self.config.clone();
                    let registry = registry.clone();
                    let cancelled = cancel.child_token();

                    handshakes.spawn(async move {
                        let upgraded = tokio::select! {
                            _ = cancelled.cancelled() => return,
                            upgraded = WebSocketTransport::accept(stream, &config) => upgraded,
                        };

                        let transport = match upgraded {
                            Ok(transport) => transport,
                            Err(e) => {
                                tracing::warn!(%peer, error = %e, "WebSocket handshake failed");
                                return;
                            }
                        };

                        if cancelled.is_cancelled() {
                            let _ = transport.close().await;
                            return;
                        }
                        let ident = registry.accept(transport, session);
                        tracing::debug!(%peer, ident = %ident, "WebSocket handshake completed");
                    });
                }
            }
        }

        cancel.cancel();
        while handshakes.join_next().await.is_some() {}

        let closed = registry.close_all().await;
        tracing::info!(%addr, closed, "WebSocket server stopped");
        Ok(())
    }
}

/// WebSocket server errors
#[derive(Debug, thiserror::Error)]
pub enum WebSocketServerError {
    #[error("Failed to bind to address: {0}")]
    Bind(String),

    #[error("WebSocket handshake failed: {0}")]
    Handshake(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Codec `{0}` can produce non-UTF-8 output and cannot use text frames")]
    IncompatibleCodec(&'static str),
}
