//! Registry and listener configuration

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use sockets_protocol::{EnvelopeCodec, JsonCodec};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig as ProtocolConfig;

/// How a registry names newly accepted connections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdentityStrategy {
    /// Decimal counter starting at 1, unique for the registry's lifetime
    #[default]
    Sequential,

    /// Random v4 UUID
    Uuid,
}

impl IdentityStrategy {
    pub(crate) fn generate(&self, counter: &AtomicU64) -> String {
        match self {
            IdentityStrategy::Sequential => (counter.fetch_add(1, Ordering::Relaxed) + 1).to_string(),
            IdentityStrategy::Uuid => uuid::Uuid::new_v4().to_string(),
        }
    }
}

/// Registry settings
///
/// ```
/// use sockets_server::config::{IdentityStrategy, RegistryConfig};
/// use sockets_protocol::BinaryCodec;
///
/// let config = RegistryConfig::default()
///     .with_codec(BinaryCodec)
///     .with_identity(IdentityStrategy::Uuid);
/// assert_eq!(config.codec.name(), "Binary");
/// ```
#[derive(Clone)]
pub struct RegistryConfig {
    /// Codec shared by every accepted connection
    pub codec: Arc<dyn EnvelopeCodec>,

    /// Identity source for accepted connections
    pub identity: IdentityStrategy,
}

impl RegistryConfig {
    pub fn with_codec(mut self, codec: impl EnvelopeCodec) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    pub fn with_identity(mut self, identity: IdentityStrategy) -> Self {
        self.identity = identity;
        self
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            codec: Arc::new(JsonCodec),
            identity: IdentityStrategy::default(),
        }
    }
}

impl fmt::Debug for RegistryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryConfig")
            .field("codec", &self.codec.name())
            .field("identity", &self.identity)
            .finish()
    }
}

/// Websocket frame type that carries envelopes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadFrame {
    #[default]
    Text,
    Binary,
}

/// Websocket transport settings
#[derive(Debug, Clone, Default)]
pub struct WebSocketConfig {
    /// Frame type envelopes are read from and written as; frames of the
    /// other data type are reported as unsupported
    pub payload_frame: PayloadFrame,

    /// Largest accepted incoming message, `None` keeps the tungstenite default
    pub max_message_size: Option<usize>,
}

impl WebSocketConfig {
    pub(crate) fn protocol_config(&self) -> ProtocolConfig {
        let mut config = ProtocolConfig::default();
        if let Some(max) = self.max_message_size {
            config.max_message_size = Some(max);
            config.max_frame_size = Some(max);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_identities() {
        let counter = AtomicU64::new(0);
        let strategy = IdentityStrategy::Sequential;

        assert_eq!(strategy.generate(&counter), "1");
        assert_eq!(strategy.generate(&counter), "2");
        assert_eq!(strategy.generate(&counter), "3");
    }

    #[test]
    fn test_uuid_identities_are_distinct() {
        let counter = AtomicU64::new(0);
        let a = IdentityStrategy::Uuid.generate(&counter);
        let b = IdentityStrategy::Uuid.generate(&counter);

        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
        assert_eq!(counter.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_default_config() {
        let config = RegistryConfig::default();
        assert_eq!(config.codec.name(), "JSON");
        assert_eq!(config.identity, IdentityStrategy::Sequential);
        assert_eq!(format!("{:?}", config), "RegistryConfig { codec: \"JSON\", identity: Sequential }");
    }

    #[test]
    fn test_websocket_message_limit() {
        let config = WebSocketConfig {
            max_message_size: Some(1024),
            ..Default::default()
        };
        let protocol = config.protocol_config();
        assert_eq!(protocol.max_message_size, Some(1024));
        assert_eq!(config.payload_frame, PayloadFrame::Text);
    }
}
