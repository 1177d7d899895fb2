//! Handler, recovery and dispatch seams
//!
//! A [`Handler`] serves one method name. A [`Recovery`] receives every
//! non-fatal fault of a connection (undecodable frames, unknown methods,
//! panicking handlers). A [`Dispatcher`] is what a client's receive loop
//! feeds; [`Registry`](crate::Registry) is the production implementation.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use sockets_protocol::{CodecError, Envelope};

use crate::client::Client;

/// Serves envelopes of one method
///
/// Invocations for one connection are strictly sequential. A handler may call
/// [`Client::send`] or broadcast through the registry.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn serve(&self, data: Bytes, client: Arc<Client>);
}

/// Adapts an async closure into a [`Handler`]
pub struct HandlerFn<F>(pub F);

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Bytes, Arc<Client>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn serve(&self, data: Bytes, client: Arc<Client>) {
        (self.0)(data, client).await
    }
}

/// Non-fatal connection fault handed to the recovery callback
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Fault {
    #[error("Failed to decode envelope: {0}")]
    Decode(#[from] CodecError),

    #[error("No handler registered for method `{0}`")]
    UnknownMethod(String),

    #[error("Handler for `{method}` panicked: {message}")]
    HandlerPanic { method: String, message: String },
}

/// Sink for non-fatal faults
#[async_trait]
pub trait Recovery: Send + Sync + 'static {
    async fn recover(&self, client: Arc<Client>, fault: Fault);
}

/// Adapts an async closure into a [`Recovery`]
pub struct RecoveryFn<F>(pub F);

#[async_trait]
impl<F, Fut> Recovery for RecoveryFn<F>
where
    F: Fn(Arc<Client>, Fault) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn recover(&self, client: Arc<Client>, fault: Fault) {
        (self.0)(client, fault).await
    }
}

/// Default recovery: one `tracing` error event per fault
#[derive(Debug, Clone, Copy, Default)]
pub struct LogRecovery;

#[async_trait]
impl Recovery for LogRecovery {
    async fn recover(&self, client: Arc<Client>, fault: Fault) {
        tracing::error!(
            ident = %client.ident(),
            state = ?client.state(),
            error = %fault,
            "Recovered connection fault"
        );
    }
}

/// Consumer of a client's receive loop
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Routes one decoded envelope
    async fn dispatch(&self, client: &Arc<Client>, envelope: Envelope);

    /// Reports a frame that could not be routed
    async fn reject(&self, client: &Arc<Client>, fault: Fault);
}

/// Extracts a readable message from a caught panic payload
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
