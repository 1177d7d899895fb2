use thiserror::Error;

use crate::state::ClientState;

/// Errors produced while encoding or decoding an envelope.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("Buffer too short: need {need} bytes, have {have}")]
    BufferTooShort { need: usize, have: usize },

    #[error("Envelope has no method")]
    MissingMethod,

    #[error("Method name is not valid UTF-8")]
    InvalidUtf8,

    #[error("Unexpected {0} trailing bytes after envelope")]
    TrailingBytes(usize),

    #[error("Method name too long: {0} bytes")]
    MethodTooLong(usize),

    #[error("Payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    #[error("JSON error: {0}")]
    Json(String),
}

/// Errors reported by a [`Transport`](crate::Transport) implementation.
///
/// Any of these is terminal for the connection that produced it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Transport is closed")]
    Closed,

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Rejected [`ClientState`] transition.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Invalid state transition: {from:?} -> {to:?}")]
pub struct StateError {
    pub from: ClientState,
    pub to: ClientState,
}

pub type CodecResult<T> = std::result::Result<T, CodecError>;
pub type TransportResult<T> = std::result::Result<T, TransportError>;
