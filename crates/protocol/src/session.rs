//! Per-connection session storage
//!
//! A session is supplied by the caller when a connection is accepted and is
//! owned by that connection's client for its whole lifetime. The router never
//! looks inside it.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

/// Value stored in a session
pub type SessionValue = Arc<dyn Any + Send + Sync>;

/// Key/value store attached to one connection
pub trait Session: Send + Sync + 'static {
    fn get(&self, key: &str) -> Option<SessionValue>;

    fn set(&self, key: &str, value: SessionValue);

    fn delete(&self, key: &str);

    fn clear(&self);
}

impl<'a> dyn Session + 'a {
    /// Looks up `key` and downcasts the stored value to `T`
    pub fn get_as<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.get(key)?.downcast::<T>().ok()
    }
}

/// In-memory [`Session`] backed by a hash map
#[derive(Default)]
pub struct MemorySession {
    values: RwLock<HashMap<String, SessionValue>>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

impl Session for MemorySession {
    fn get(&self, key: &str) -> Option<SessionValue> {
        self.values.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: SessionValue) {
        self.values.write().insert(key.to_owned(), value);
    }

    fn delete(&self, key: &str) {
        self.values.write().remove(key);
    }

    fn clear(&self) {
        self.values.write().clear();
    }
}

impl std::fmt::Debug for MemorySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let values = self.values.read();
        let mut keys: Vec<&String> = values.keys().collect();
        keys.sort();
        f.debug_struct("MemorySession").field("keys", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_delete() {
        let session = MemorySession::new();
        session.set("user", Arc::new(String::from("alice")));
        session.set("score", Arc::new(10u32));

        assert_eq!(session.len(), 2);
        let user = session.get("user").unwrap();
        assert_eq!(user.downcast_ref::<String>().unwrap(), "alice");

        session.delete("user");
        assert!(session.get("user").is_none());
        session.delete("user");
        assert_eq!(session.len(), 1);
    }

    #[test]
    fn test_overwrite_and_clear() {
        let session = MemorySession::new();
        session.set("score", Arc::new(1u32));
        session.set("score", Arc::new(2u32));
        assert_eq!(session.len(), 1);

        session.clear();
        assert!(session.is_empty());
    }

    #[test]
    fn test_get_as_downcasts() {
        let session: Box<dyn Session> = Box::new(MemorySession::new());
        session.set("score", Arc::new(7u32));

        assert_eq!(session.get_as::<u32>("score").as_deref(), Some(&7));
        assert!(session.get_as::<String>("score").is_none());
        assert!(session.get_as::<u32>("missing").is_none());
    }
}
