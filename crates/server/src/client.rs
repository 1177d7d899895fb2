//! One accepted connection
//!
//! A [`Client`] binds a transport, a caller-supplied session and an identity.
//! It owns the connection's receive loop ([`Client::listen`]) and serializes
//! writes so envelopes sent concurrently never interleave.

use std::fmt;
use std::ptr;
use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use sockets_protocol::{
    encode_data, ClientState, CodecError, Envelope, EnvelopeCodec, Frame, Session, Transport,
    TransportError,
};

use crate::handler::{Dispatcher, Fault};
use crate::registry::{Registry, Shared};

/// Client errors
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Client is closed")]
    Closed,

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// A connection accepted by a [`Registry`]
pub struct Client {
    ident: String,
    transport: Box<dyn Transport>,
    session: Box<dyn Session>,
    codec: Arc<dyn EnvelopeCodec>,
    registry: Weak<Shared>,
    state: Mutex<ClientState>,
    write_lock: tokio::sync::Mutex<()>,
}

impl Client {
    /// Creates a client that belongs to no registry
    ///
    /// Closing it only closes the transport.
    pub fn new(
        ident: impl Into<String>,
        transport: impl Transport,
        session: impl Session,
        codec: Arc<dyn EnvelopeCodec>,
    ) -> Self {
        Self::attached(
            ident.into(),
            Box::new(transport),
            Box::new(session),
            codec,
            Weak::new(),
        )
    }

    pub(crate) fn attached(
        ident: String,
        transport: Box<dyn Transport>,
        session: Box<dyn Session>,
        codec: Arc<dyn EnvelopeCodec>,
        registry: Weak<Shared>,
    ) -> Self {
        Self {
            ident,
            transport,
            session,
            codec,
            registry,
            state: Mutex::new(ClientState::Open),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Identity this client is registered under
    pub fn ident(&self) -> &str {
        &self.ident
    }

    /// Session supplied when the connection was accepted
    pub fn session(&self) -> &dyn Session {
        self.session.as_ref()
    }

    pub fn state(&self) -> ClientState {
        *self.state.lock()
    }

    pub fn is_open(&self) -> bool {
        self.state().is_open()
    }

    pub fn is_closed(&self) -> bool {
        self.state().is_closed()
    }

    /// Registry this client was accepted by, if it is still alive
    pub fn registry(&self) -> Option<Registry> {
        self.registry.upgrade().map(Registry::from_shared)
    }

    /// Encodes an envelope stamped with the current time and writes it
    ///
    /// Writes are serialized per connection. A write error closes the client
    /// and is returned unchanged; nothing is retried.
    pub async fn send(&self, method: &str, data: impl Into<Bytes>) -> Result<(), ClientError> {
        if !self.is_open() {
            return Err(ClientError::Closed);
        }

        let envelope = Envelope::new(method, data, now_nanos());
        let frame = self.codec.encode(&envelope)?;

        let written = {
            let _guard = self.write_lock.lock().await;
            self.transport.write(frame).await
        };

        if let Err(e) = written {
            tracing::debug!(ident = %self.ident, method, error = %e, "Write failed, closing client");
            if let Err(close_err) = self.close().await {
                tracing::debug!(ident = %self.ident, error = %close_err, "Close after failed write failed");
            }
            return Err(ClientError::Transport(e));
        }

        Ok(())
    }

    /// Serializes `value` as a JSON payload and sends it
    pub async fn send_json<T: Serialize + ?Sized>(
        &self,
        method: &str,
        value: &T,
    ) -> Result<(), ClientError> {
        let data = encode_data(value)?;
        self.send(method, data).await
    }

    /// Runs the receive loop until the transport is closed or fails
    ///
    /// Each decoded envelope is handed to `dispatcher` and awaited before the
    /// next read. Undecodable frames are reported through
    /// [`Dispatcher::reject`] and unsupported frames are skipped; neither ends
    /// the loop. The client is closed before this returns.
    pub async fn listen<D>(self: &Arc<Self>, dispatcher: &D)
    where
        D: Dispatcher + ?Sized,
    {
        tracing::debug!(ident = %self.ident, "Receive loop started");

        while !self.transport.is_closed() {
            let frame = match self.transport.read().await {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::debug!(ident = %self.ident, error = %e, "Receive loop stopped");
                    break;
                }
            };

            let bytes = match frame {
                Frame::Message(bytes) => bytes,
                Frame::Unsupported(kind) => {
                    tracing::debug!(ident = %self.ident, ?kind, "Ignoring unsupported frame");
                    continue;
                }
            };

            match self.codec.decode(&bytes) {
                Ok(envelope) => dispatcher.dispatch(self, envelope).await,
                Err(e) => dispatcher.reject(self, Fault::Decode(e)).await,
            }
        }

        if let Err(e) = self.close().await {
            tracing::debug!(ident = %self.ident, error = %e, "Transport close failed");
        }
    }

    /// Closes the transport and leaves the registry
    ///
    /// Only the first call has an effect; later calls return `Ok(())`.
    pub async fn close(&self) -> Result<(), ClientError> {
        let began = self.state.lock().transition_to(ClientState::Closing).is_ok();
        if !began {
            return Ok(());
        }

        let closed = self.transport.close().await;

        *self.state.lock() = ClientState::Closed;
        if let Some(shared) = self.registry.upgrade() {
            shared.deregister(&self.ident, self);
        }

        tracing::debug!(ident = %self.ident, "Client closed");
        closed.map_err(ClientError::Transport)
    }

    pub(crate) fn is(&self, other: &Client) -> bool {
        ptr::eq(self, other)
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("ident", &self.ident)
            .field("state", &self.state())
            .field("codec", &self.codec.name())
            .finish()
    }
}

fn now_nanos() -> i64 {
    chrono::Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or(i64::MAX)
}
