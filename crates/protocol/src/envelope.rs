use crate::error::{CodecError, CodecResult as Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Message unit exchanged with a peer
///
/// The envelope names the handler to run (`method`), carries an opaque
/// payload that the router never inspects (`data`) and the sender's
/// wall-clock time in nanoseconds (`timestamp`).
///
/// Binary wire format (big-endian), used by [`BinaryCodec`](crate::BinaryCodec):
/// ```text
/// ┌─────────────┬───────┬────────────┐
/// │ method_len  │ u16   │  2 bytes   │
/// ├─────────────┼───────┼────────────┤
/// │ method      │ utf-8 │  M bytes   │
/// ├─────────────┼───────┼────────────┤
/// │ timestamp   │ i64   │  8 bytes   │
/// ├─────────────┼───────┼────────────┤
/// │ data_len    │ u32   │  4 bytes   │
/// ├─────────────┼───────┼────────────┤
/// │ data        │ [u8]  │  N bytes   │
/// └─────────────┴───────┴────────────┘
/// Fixed overhead: 14 bytes
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Handler name the envelope is routed by
    pub method: String,

    /// Opaque payload, handed to the handler untouched
    pub data: Bytes,

    /// Send time in nanoseconds since the Unix epoch
    pub timestamp: i64,
}

/// Fixed size of the binary envelope framing (excluding method and data)
pub const ENVELOPE_HEADER_SIZE: usize = 14;

/// Longest method name the binary format can carry
pub const MAX_METHOD_LEN: usize = u16::MAX as usize;

impl Envelope {
    /// Creates a new envelope
    pub fn new(method: impl Into<String>, data: impl Into<Bytes>, timestamp: i64) -> Self {
        Self {
            method: method.into(),
            data: data.into(),
            timestamp,
        }
    }

    /// Returns true if the envelope names a method
    #[inline]
    pub fn is_routable(&self) -> bool {
        !self.method.is_empty()
    }

    /// Returns the size of the binary encoding
    #[inline]
    pub fn total_size(&self) -> usize {
        ENVELOPE_HEADER_SIZE + self.method.len() + self.data.len()
    }

    /// Serializes the envelope to bytes (big-endian)
    pub fn to_bytes(&self) -> Result<Bytes> {
        if !self.is_routable() {
            return Err(CodecError::MissingMethod);
        }
        if self.method.len() > MAX_METHOD_LEN {
            return Err(CodecError::MethodTooLong(self.method.len()));
        }
        let data_len = u32::try_from(self.data.len())
            .map_err(|_| CodecError::PayloadTooLarge(self.data.len()))?;

        let mut buf = BytesMut::with_capacity(self.total_size());

        buf.put_u16(self.method.len() as u16);
        buf.put_slice(self.method.as_bytes());
        buf.put_i64(self.timestamp);
        buf.put_u32(data_len);
        buf.put_slice(&self.data);

        Ok(buf.freeze())
    }

    /// Deserializes an envelope from bytes (big-endian)
    ///
    /// The returned payload shares the input buffer.
    pub fn from_bytes(mut data: Bytes) -> Result<Self> {
        if data.len() < 2 {
            return Err(CodecError::BufferTooShort {
                need: ENVELOPE_HEADER_SIZE,
                have: data.len(),
            });
        }

        let method_len = data.get_u16() as usize;
        let need = method_len + ENVELOPE_HEADER_SIZE - 2;
        if data.len() < need {
            return Err(CodecError::BufferTooShort {
                need,
                have: data.len(),
            });
        }

        let method = data.copy_to_bytes(method_len);
        let method = std::str::from_utf8(&method)
            .map_err(|_| CodecError::InvalidUtf8)?
            .to_owned();
        let timestamp = data.get_i64();
        let data_len = data.get_u32() as usize;

        if data.len() < data_len {
            return Err(CodecError::BufferTooShort {
                need: data_len,
                have: data.len(),
            });
        }

        let payload = data.copy_to_bytes(data_len);

        if data.has_remaining() {
            return Err(CodecError::TrailingBytes(data.remaining()));
        }
        if method.is_empty() {
            return Err(CodecError::MissingMethod);
        }

        Ok(Self {
            method,
            data: payload,
            timestamp,
        })
    }
}
