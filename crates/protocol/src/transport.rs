//! Transport layer abstraction
//!
//! This module defines the contract a connection must satisfy to be accepted
//! by the router. A transport delivers one complete encoded envelope per
//! successful [`Transport::read`] and writes one envelope per
//! [`Transport::write`]; framing beyond that is the transport's business
//! (websocket frames, in-memory channels, ...).
//!
//! # Example: Implementing a custom transport
//!
//! ```no_run
//! use async_trait::async_trait;
//! use bytes::Bytes;
//! use sockets_protocol::transport::{Frame, Transport};
//! use sockets_protocol::TransportError;
//!
//! struct MyCustomTransport {
//!     // Your transport-specific fields
//! }
//!
//! #[async_trait]
//! impl Transport for MyCustomTransport {
//!     async fn write(&self, frame: Bytes) -> Result<(), TransportError> {
//!         Ok(())
//!     }
//!
//!     async fn read(&self) -> Result<Frame, TransportError> {
//!         Err(TransportError::Closed)
//!     }
//!
//!     async fn close(&self) -> Result<(), TransportError> {
//!         Ok(())
//!     }
//!
//!     fn is_closed(&self) -> bool {
//!         true
//!     }
//! }
//! ```

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::TransportResult as Result;

/// Kind of a frame the transport received but cannot turn into an envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Text,
    Binary,
    Ping,
    Pong,
    Continuation,
}

/// One successful read from a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// The encoded bytes of one envelope
    Message(Bytes),

    /// A frame of a kind that carries no envelope; the connection stays usable
    Unsupported(FrameKind),
}

/// Bidirectional, frame-delimited connection to one peer
///
/// Implementations must tolerate one concurrent reader and one concurrent
/// writer. `read` returning an error (including end-of-stream) is the only
/// signal that ends a connection's receive loop, and `close` must wake a
/// reader blocked in `read`.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Writes the bytes of one envelope as a single frame
    async fn write(&self, frame: Bytes) -> Result<()>;

    /// Waits for the next frame from the peer
    async fn read(&self) -> Result<Frame>;

    /// Closes the connection; closing twice is not an error
    async fn close(&self) -> Result<()>;

    /// Returns true once `close` has been called or the peer went away
    fn is_closed(&self) -> bool;
}
