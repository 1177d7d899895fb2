//! # Sockets Protocol
//!
//! Wire and contract types for the sockets message router.
//!
//! This crate provides:
//! - `Envelope`: the message unit (method, opaque payload, timestamp)
//! - `EnvelopeCodec`: pluggable envelope encoding (`JsonCodec`, `BinaryCodec`)
//! - `Transport`: the contract a connection must satisfy to be accepted
//! - `Session`: per-connection key/value storage supplied by the caller
//! - `ClientState`: the connection lifecycle state machine
//! - Error types for codecs and transports
//!
//! ## Example
//!
//! ```
//! use sockets_protocol::{Envelope, EnvelopeCodec, JsonCodec};
//! use bytes::Bytes;
//!
//! let envelope = Envelope::new("echo", Bytes::from_static(b"\"hi\""), 1);
//!
//! let bytes = JsonCodec.encode(&envelope).unwrap();
//! let received = JsonCodec.decode(&bytes).unwrap();
//! assert_eq!(received.data, Bytes::from_static(b"\"hi\""));
//! ```

pub mod codec;
pub mod envelope;
pub mod error;
pub mod session;
pub mod state;
pub mod transport;

pub use codec::{decode_data, encode_data, BinaryCodec, EnvelopeCodec, JsonCodec};
pub use envelope::{Envelope, ENVELOPE_HEADER_SIZE, MAX_METHOD_LEN};
pub use error::{CodecError, CodecResult, StateError, TransportError, TransportResult};
pub use session::{MemorySession, Session, SessionValue};
pub use state::ClientState;
pub use transport::{Frame, FrameKind, Transport};
