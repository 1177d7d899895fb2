//! Envelope codecs
//!
//! A codec turns an [`Envelope`] into the bytes of one transport frame and
//! back. Codecs are stateless and shared by every connection of a registry.
//!
//! - [`JsonCodec`]: `{"method": .., "data": <sub-document>, "timestamp": ..}`
//! - [`BinaryCodec`]: length-prefixed big-endian framing, see [`Envelope`]
//!
//! # Usage
//!
//! ```
//! use sockets_protocol::codec::{EnvelopeCodec, JsonCodec};
//! use sockets_protocol::Envelope;
//! use bytes::Bytes;
//!
//! let codec = JsonCodec;
//! let envelope = Envelope::new("chat", Bytes::from_static(b"{\"text\":\"hi\"}"), 7);
//!
//! let bytes = codec.encode(&envelope).unwrap();
//! let decoded = codec.decode(&bytes).unwrap();
//! assert_eq!(envelope, decoded);
//! ```

use bytes::Bytes;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::envelope::Envelope;
use crate::error::{CodecError, CodecResult as Result};

/// Envelope serialization contract
///
/// Implementations must be thread-safe (Send + Sync) as they are shared
/// across every connection of a registry. Decoding must never panic on
/// malformed input.
pub trait EnvelopeCodec: Send + Sync + 'static {
    /// Returns a human-readable name for this codec
    fn name(&self) -> &'static str;

    /// Encodes an envelope into the bytes of one frame
    fn encode(&self, envelope: &Envelope) -> Result<Bytes>;

    /// Decodes the bytes of one frame into an envelope
    fn decode(&self, bytes: &Bytes) -> Result<Envelope>;

    /// Returns true if every encoded envelope is valid UTF-8
    fn emits_text(&self) -> bool {
        false
    }
}

/// JSON envelope codec
///
/// The payload is embedded verbatim as a JSON sub-document, so it must itself
/// be valid JSON. An empty payload is written as `null`, and `null` or a
/// missing `data` field decodes to an empty payload. The capitalised field
/// names `Method`, `Data` and `Timestamp` are accepted on decode.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[derive(Serialize)]
struct WireEnvelopeRef<'a> {
    method: &'a str,
    data: Option<&'a RawValue>,
    timestamp: i64,
}

#[derive(Deserialize)]
struct WireEnvelope<'a> {
    #[serde(default, alias = "Method")]
    method: Option<String>,
    #[serde(default, borrow, alias = "Data")]
    data: Option<&'a RawValue>,
    #[serde(default, alias = "Timestamp")]
    timestamp: i64,
}

impl EnvelopeCodec for JsonCodec {
    fn name(&self) -> &'static str {
        "JSON"
    }

    fn emits_text(&self) -> bool {
        true
    }

    fn encode(&self, envelope: &Envelope) -> Result<Bytes> {
        if !envelope.is_routable() {
            return Err(CodecError::MissingMethod);
        }

        let text = std::str::from_utf8(&envelope.data)
            .map_err(|_| CodecError::Json("payload is not UTF-8".into()))?;
        let data = if envelope.data.is_empty() {
            None
        } else {
            Some(
                serde_json::from_str::<&RawValue>(text)
                    .map_err(|e| CodecError::Json(format!("payload is not a JSON document: {}", e)))?,
            )
        };

        let wire = WireEnvelopeRef {
            method: &envelope.method,
            data,
            timestamp: envelope.timestamp,
        };
        let vec = serde_json::to_vec(&wire)
            .map_err(|e| CodecError::Json(format!("encode failed: {}", e)))?;
        Ok(Bytes::from(vec))
    }

    fn decode(&self, bytes: &Bytes) -> Result<Envelope> {
        let wire: WireEnvelope<'_> = serde_json::from_slice(bytes)
            .map_err(|e| CodecError::Json(format!("decode failed: {}", e)))?;

        let method = match wire.method {
            Some(method) if !method.is_empty() => method,
            _ => return Err(CodecError::MissingMethod),
        };
        let data = wire
            .data
            .map(|raw| Bytes::copy_from_slice(raw.get().as_bytes()))
            .unwrap_or_default();

        Ok(Envelope {
            method,
            data,
            timestamp: wire.timestamp,
        })
    }
}

/// Binary envelope codec
///
/// Carries arbitrary payload bytes. See [`Envelope`] for the layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCodec;

impl EnvelopeCodec for BinaryCodec {
    fn name(&self) -> &'static str {
        "Binary"
    }

    fn encode(&self, envelope: &Envelope) -> Result<Bytes> {
        envelope.to_bytes()
    }

    fn decode(&self, bytes: &Bytes) -> Result<Envelope> {
        Envelope::from_bytes(bytes.clone())
    }
}

/// Serializes a value into a JSON payload
pub fn encode_data<T: Serialize + ?Sized>(value: &T) -> Result<Bytes> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| CodecError::Json(format!("payload encode failed: {}", e)))
}

/// Deserializes a JSON payload into a value
pub fn decode_data<T: DeserializeOwned>(data: &Bytes) -> Result<T> {
    serde_json::from_slice(data)
        .map_err(|e| CodecError::Json(format!("payload decode failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct ChatLine {
        room: String,
        text: String,
    }

    #[test]
    fn test_json_codec_roundtrip() {
        let codec = JsonCodec;
        assert_eq!(codec.name(), "JSON");

        let envelope = Envelope::new("chat", Bytes::from_static(br#"{"text":"hi","n":[1,2]}"#), 1_700_000_000_000_000_000);
        let bytes = codec.encode(&envelope).unwrap();
        let decoded = codec.decode(&bytes).unwrap();

        assert_eq!(envelope, decoded);
    }

    #[test]
    fn test_json_codec_wire_shape() {
        let envelope = Envelope::new("echo", Bytes::from_static(b"\"hi\""), 5);
        let bytes = JsonCodec.encode(&envelope).unwrap();

        assert_eq!(&bytes[..], br#"{"method":"echo","data":"hi","timestamp":5}"#);
    }

    #[test]
    fn test_json_codec_empty_payload() {
        let envelope = Envelope::new("ping", Bytes::new(), 3);
        let bytes = JsonCodec.encode(&envelope).unwrap();
        assert_eq!(&bytes[..], br#"{"method":"ping","data":null,"timestamp":3}"#);

        let decoded = JsonCodec.decode(&bytes).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_json_codec_accepts_capitalised_fields() {
        let bytes = Bytes::from_static(br#"{"Method":"join","Data":{"room":"a"},"Unique":0,"Timestamp":99}"#);
        let decoded = JsonCodec.decode(&bytes).unwrap();

        assert_eq!(decoded.method, "join");
        assert_eq!(decoded.data, Bytes::from_static(br#"{"room":"a"}"#));
        assert_eq!(decoded.timestamp, 99);
    }

    #[test]
    fn test_json_codec_missing_method() {
        let no_method = Bytes::from_static(br#"{"data":1,"timestamp":1}"#);
        assert_eq!(JsonCodec.decode(&no_method), Err(CodecError::MissingMethod));

        let empty_method = Bytes::from_static(br#"{"method":"","timestamp":1}"#);
        assert_eq!(JsonCodec.decode(&empty_method), Err(CodecError::MissingMethod));
    }

    #[test]
    fn test_json_codec_malformed_input() {
        for input in [&b"not json"[..], b"{\"method\":\"x\"", b"", b"[1,2]", b"{\"method\":5}"] {
            let result = JsonCodec.decode(&Bytes::copy_from_slice(input));
            assert!(matches!(result, Err(CodecError::Json(_))), "input {:?}", input);
        }
    }

    #[test]
    fn test_json_codec_rejects_non_json_payload() {
        let envelope = Envelope::new("blob", Bytes::from_static(b"\x00\x01"), 0);
        assert!(matches!(JsonCodec.encode(&envelope), Err(CodecError::Json(_))));

        let envelope = Envelope::new("text", Bytes::from_static(b"plain words"), 0);
        assert!(matches!(JsonCodec.encode(&envelope), Err(CodecError::Json(_))));
    }

    #[test]
    fn test_binary_codec_roundtrip() {
        let codec = BinaryCodec;
        assert_eq!(codec.name(), "Binary");

        let envelope = Envelope::new("blob", Bytes::from_static(b"\x00\x01\x02\xff"), 11);
        let decoded = codec.decode(&codec.encode(&envelope).unwrap()).unwrap();
        assert_eq!(envelope, decoded);
    }

    #[test]
    fn test_payload_helpers() {
        let line = ChatLine {
            room: "lobby".into(),
            text: "hello".into(),
        };

        let data = encode_data(&line).unwrap();
        let decoded: ChatLine = decode_data(&data).unwrap();
        assert_eq!(line, decoded);

        let bad: Result<ChatLine> = decode_data(&Bytes::from_static(b"{}"));
        assert!(bad.is_err());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;
        use serde_json::Value;

        fn json_value() -> impl Strategy<Value = Value> {
            let leaf = prop_oneof![
                Just(Value::Null),
                any::<bool>().prop_map(Value::Bool),
                any::<i64>().prop_map(Value::from),
                ".{0,12}".prop_map(Value::String),
            ];
            leaf.prop_recursive(3, 24, 4, |inner| {
                prop_oneof![
                    prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                    prop::collection::hash_map(".{0,6}", inner, 0..4)
                        .prop_map(|fields| Value::Object(fields.into_iter().collect())),
                ]
            })
        }

        // A bare `null` payload is the wire form of an empty payload
        fn json_payload() -> impl Strategy<Value = Bytes> {
            json_value()
                .prop_filter("null encodes as empty", |value| !value.is_null())
                .prop_map(|value| Bytes::from(serde_json::to_vec(&value).unwrap()))
        }

        fn binary_envelope() -> impl Strategy<Value = Envelope> {
            (".{1,32}", prop::collection::vec(any::<u8>(), 0..256), any::<i64>())
                .prop_map(|(method, data, timestamp)| Envelope::new(method, data, timestamp))
        }

        proptest! {
            #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]

            #[test]
            fn binary_codec_roundtrip(envelope in binary_envelope()) {
                let bytes = BinaryCodec.encode(&envelope).unwrap();
                let decoded = BinaryCodec.decode(&bytes).unwrap();
                prop_assert_eq!(decoded, envelope);
            }

            #[test]
            fn json_codec_roundtrip(method in ".{1,32}", data in json_payload(), timestamp in any::<i64>()) {
                let envelope = Envelope::new(method, data, timestamp);
                let bytes = JsonCodec.encode(&envelope).unwrap();
                let decoded = JsonCodec.decode(&bytes).unwrap();
                prop_assert_eq!(decoded, envelope);
            }

            #[test]
            fn binary_codec_rejects_truncated(envelope in binary_envelope(), cut in any::<prop::sample::Index>()) {
                let bytes = BinaryCodec.encode(&envelope).unwrap();
                let truncated = bytes.slice(..cut.index(bytes.len()));
                prop_assert!(BinaryCodec.decode(&truncated).is_err());
            }

            #[test]
            fn json_codec_rejects_truncated(method in ".{1,16}", data in json_payload(), cut in any::<prop::sample::Index>()) {
                let bytes = JsonCodec.encode(&Envelope::new(method, data, 1)).unwrap();
                let truncated = bytes.slice(..cut.index(bytes.len()));
                prop_assert!(JsonCodec.decode(&truncated).is_err());
            }

            #[test]
            fn binary_codec_rejects_trailing_bytes(envelope in binary_envelope(), extra in prop::collection::vec(any::<u8>(), 1..8)) {
                let mut bytes = BinaryCodec.encode(&envelope).unwrap().to_vec();
                bytes.extend_from_slice(&extra);
                prop_assert_eq!(
                    BinaryCodec.decode(&Bytes::from(bytes)),
                    Err(CodecError::TrailingBytes(extra.len()))
                );
            }

            #[test]
            fn decoders_never_panic_on_garbage(bytes in prop::collection::vec(any::<u8>(), 0..128)) {
                let bytes = Bytes::from(bytes);
                let _ = BinaryCodec.decode(&bytes);
                let _ = JsonCodec.decode(&bytes);
            }
        }
    }
}
