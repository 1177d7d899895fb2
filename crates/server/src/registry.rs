//! Connection directory and method routing
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use bytes::Bytes;
//! use sockets_protocol::MemorySession;
//! use sockets_server::transport::memory::MemoryTransport;
//! use sockets_server::{Client, Registry};
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = Registry::new();
//!     registry
//!         .register_fn("echo", |data: Bytes, client: Arc<Client>| async move {
//!             let _ = client.send("echo", data).await;
//!         })
//!         .unwrap();
//!
//!     let (transport, _peer) = MemoryTransport::create_pair(100);
//!     let ident = registry.accept(transport, MemorySession::new());
//!     assert!(registry.get(&ident).is_some());
//! }
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::join_all;
use futures::FutureExt;
use parking_lot::RwLock;
use sockets_protocol::{Envelope, EnvelopeCodec, Session, Transport};

use crate::client::Client;
use crate::config::{IdentityStrategy, RegistryConfig};
use crate::handler::{
    panic_message, Dispatcher, Fault, Handler, HandlerFn, LogRecovery, Recovery, RecoveryFn,
};

/// Registry errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Method name must not be empty")]
    EmptyMethod,
}

pub(crate) struct Shared {
    clients: RwLock<HashMap<String, Arc<Client>>>,
    handlers: RwLock<HashMap<String, Arc<dyn Handler>>>,
    recovery: RwLock<Arc<dyn Recovery>>,
    codec: Arc<dyn EnvelopeCodec>,
    identity: IdentityStrategy,
    next_ident: AtomicU64,
}

impl Shared {
    /// Removes `ident` only while it still maps to `client`
    pub(crate) fn deregister(&self, ident: &str, client: &Client) {
        let mut clients = self.clients.write();
        if clients.get(ident).is_some_and(|current| current.is(client)) {
            clients.remove(ident);
        }
    }
}

/// Directory of live connections plus the method routing table
///
/// Cloning is cheap; clones share the same directory. Independent registries
/// never see each other's clients.
#[derive(Clone)]
pub struct Registry {
    shared: Arc<Shared>,
}

impl Registry {
    /// Creates a registry with the JSON codec and sequential identities
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                clients: RwLock::new(HashMap::new()),
                handlers: RwLock::new(HashMap::new()),
                recovery: RwLock::new(Arc::new(LogRecovery)),
                codec: config.codec,
                identity: config.identity,
                next_ident: AtomicU64::new(0),
            }),
        }
    }

    pub(crate) fn from_shared(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Codec used by every client of this registry
    pub fn codec(&self) -> &Arc<dyn EnvelopeCodec> {
        &self.shared.codec
    }

    /// Registers a connection and starts its receive loop
    ///
    /// Returns the new client's identity immediately; the receive loop runs
    /// on its own task. Must be called from within a Tokio runtime.
    pub fn accept(&self, transport: impl Transport, session: impl Session) -> String {
        let (client, count) = {
            let mut clients = self.shared.clients.write();
            let ident = loop {
                let candidate = self.shared.identity.generate(&self.shared.next_ident);
                if !clients.contains_key(&candidate) {
                    break candidate;
                }
            };

            let client = Arc::new(Client::attached(
                ident.clone(),
                Box::new(transport),
                Box::new(session),
                Arc::clone(&self.shared.codec),
                Arc::downgrade(&self.shared),
            ));
            clients.insert(ident, Arc::clone(&client));
            (client, clients.len())
        };

        let ident = client.ident().to_string();
        tracing::info!(ident = %ident, clients = count, "Client accepted");

        let registry = self.clone();
        tokio::spawn(async move {
            client.listen(&registry).await;
            tracing::info!(ident = %client.ident(), clients = registry.len(), "Client disconnected");
        });

        ident
    }

    pub fn get(&self, ident: &str) -> Option<Arc<Client>> {
        self.shared.clients.read().get(ident).cloned()
    }

    /// Drops `ident` from the directory without closing its transport
    ///
    /// Removing an unknown identity is a no-op.
    pub fn remove(&self, ident: &str) -> Option<Arc<Client>> {
        self.shared.clients.write().remove(ident)
    }

    /// Number of registered clients
    pub fn len(&self) -> usize {
        self.shared.clients.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.clients.read().is_empty()
    }

    /// Snapshot of the registered identities
    pub fn idents(&self) -> Vec<String> {
        self.shared.clients.read().keys().cloned().collect()
    }

    /// Snapshot of the registered clients
    pub fn clients(&self) -> Vec<Arc<Client>> {
        self.shared.clients.read().values().cloned().collect()
    }

    /// Installs the handler for `method`, replacing any previous one
    ///
    /// The replaced handler is returned so overwrites are never silent.
    pub fn register_handler(
        &self,
        method: impl Into<String>,
        handler: impl Handler,
    ) -> Result<Option<Arc<dyn Handler>>, RegistryError> {
        let method = method.into();
        if method.is_empty() {
            return Err(RegistryError::EmptyMethod);
        }

        let replaced = self
            .shared
            .handlers
            .write()
            .insert(method.clone(), Arc::new(handler));
        if replaced.is_some() {
            tracing::warn!(method = %method, "Replaced existing handler");
        }
        Ok(replaced)
    }

    /// Installs an async closure as the handler for `method`
    pub fn register_fn<F, Fut>(
        &self,
        method: impl Into<String>,
        f: F,
    ) -> Result<Option<Arc<dyn Handler>>, RegistryError>
    where
        F: Fn(Bytes, Arc<Client>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.register_handler(method, HandlerFn(f))
    }

    pub fn has_handler(&self, method: &str) -> bool {
        self.shared.handlers.read().contains_key(method)
    }

    /// Replaces the recovery callback
    pub fn set_recovery(&self, recovery: impl Recovery) {
        *self.shared.recovery.write() = Arc::new(recovery);
    }

    /// Installs an async closure as the recovery callback
    pub fn recover_with<F, Fut>(&self, f: F)
    where
        F: Fn(Arc<Client>, Fault) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.set_recovery(RecoveryFn(f));
    }

    /// Runs the handler registered for `envelope.method`
    ///
    /// A missing handler or a panicking handler is reported to the recovery
    /// callback; neither affects the connection.
    pub async fn dispatch(&self, client: &Arc<Client>, envelope: Envelope) {
        let handler = self.shared.handlers.read().get(&envelope.method).cloned();
        let Some(handler) = handler else {
            self.recover(client, Fault::UnknownMethod(envelope.method)).await;
            return;
        };

        let Envelope { method, data, .. } = envelope;
        let served = AssertUnwindSafe(handler.serve(data, Arc::clone(client)))
            .catch_unwind()
            .await;

        if let Err(panic) = served {
            let fault = Fault::HandlerPanic {
                method,
                message: panic_message(panic.as_ref()),
            };
            self.recover(client, fault).await;
        }
    }

    async fn recover(&self, client: &Arc<Client>, fault: Fault) {
        let recovery = Arc::clone(&*self.shared.recovery.read());
        let description = fault.to_string();

        let recovered = AssertUnwindSafe(recovery.recover(Arc::clone(client), fault))
            .catch_unwind()
            .await;

        if let Err(panic) = recovered {
            tracing::error!(
                ident = %client.ident(),
                fault = %description,
                panic = %panic_message(panic.as_ref()),
                "Recovery callback panicked"
            );
        }
    }

    /// Calls `f` once for every client registered when the call starts
    ///
    /// Membership is snapshotted first, so `f` may close clients or call
    /// back into the registry. Calls are sequential; a slow `f` delays the
    /// clients after it.
    pub async fn broadcast<F, Fut>(&self, mut f: F)
    where
        F: FnMut(Arc<Client>) -> Fut,
        Fut: Future<Output = ()>,
    {
        for client in self.clients() {
            f(client).await;
        }
    }

    /// Sends one envelope to every registered client concurrently
    ///
    /// Returns the number of clients the envelope was written to.
    pub async fn broadcast_send(&self, method: &str, data: impl Into<Bytes>) -> usize {
        let data = data.into();
        let sends = self.clients().into_iter().map(|client| {
            let data = data.clone();
            async move { client.send(method, data).await.is_ok() }
        });

        join_all(sends).await.into_iter().filter(|sent| *sent).count()
    }

    /// Closes every registered client, returning how many were closed
    pub async fn close_all(&self) -> usize {
        let clients = self.clients();
        let results = join_all(clients.iter().map(|client| client.close())).await;

        for (client, result) in clients.iter().zip(results) {
            if let Err(e) = result {
                tracing::debug!(ident = %client.ident(), error = %e, "Close failed during shutdown");
            }
        }
        clients.len()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("clients", &self.len())
            .field("handlers", &self.shared.handlers.read().len())
            .field("codec", &self.shared.codec.name())
            .finish()
    }
}

#[async_trait]
impl Dispatcher for Registry {
    async fn dispatch(&self, client: &Arc<Client>, envelope: Envelope) {
        Registry::dispatch(self, client, envelope).await;
    }

    async fn reject(&self, client: &Arc<Client>, fault: Fault) {
        self.recover(client, fault).await;
    }
}
