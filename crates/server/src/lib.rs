//! # Sockets Server
//!
//! Connection registry and method router for persistent connections.
//!
//! Every accepted connection becomes a [`Client`] with its own receive loop.
//! Each incoming envelope is routed by method name to the [`Handler`]
//! registered on the [`Registry`]; faults are reported to a [`Recovery`]
//! callback and never take the connection down.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use bytes::Bytes;
//! use sockets_protocol::MemorySession;
//! use sockets_server::transport::websocket::WebSocketServer;
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
//!     let server = WebSocketServer::bind("127.0.0.1:8080").await.unwrap();
//!     server.serve(registry, MemorySession::new).await.unwrap();
//! }
//! ```

pub mod client;
pub mod config;
pub mod handler;
pub mod registry;
pub mod transport;

pub use client::{Client, ClientError};
pub use config::{IdentityStrategy, PayloadFrame, RegistryConfig, WebSocketConfig};
pub use handler::{Dispatcher, Fault, Handler, HandlerFn, LogRecovery, Recovery, RecoveryFn};
pub use registry::{Registry, RegistryError};
pub use transport::websocket::{WebSocketServer, WebSocketServerError, WebSocketTransport};
