//! Echo and broadcast server
//!
//! Connect with any websocket client and send text frames such as
//! `{"method":"echo","data":{"text":"hi"}}` or `{"method":"ping"}`.
//!
//! Run with `RUST_LOG=debug cargo run --example echo_server` for per-frame logs.

use std::sync::Arc;

use bytes::Bytes;
use sockets::protocol::MemorySession;
use sockets::server::{Client, Fault, Registry, WebSocketServer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let registry = Registry::new();

    registry
        .register_fn("echo", |data: Bytes, client: Arc<Client>| async move {
            if let Err(e) = client.send("echo", data).await {
                tracing::warn!(ident = %client.ident(), error = %e, "Echo failed");
            }
        })
        .expect("method name is not empty");

    registry
        .register_fn("ping", |_data: Bytes, client: Arc<Client>| async move {
            let Some(registry) = client.registry() else {
                return;
            };
            let delivered = registry.broadcast_send("pong", Bytes::new()).await;
            tracing::info!(from = %client.ident(), delivered, "Broadcast pong");
        })
        .expect("method name is not empty");

    registry.recover_with(|client: Arc<Client>, fault: Fault| async move {
        tracing::warn!(ident = %client.ident(), %fault, "Rejected message");
        let _ = client.send_json("error", &fault.to_string()).await;
    });

    let server = match WebSocketServer::bind("127.0.0.1:8080").await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start");
            return;
        }
    };

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Shutting down");
    };

    if let Err(e) = server.serve_until(registry, MemorySession::new, shutdown).await {
        tracing::error!(error = %e, "Server error");
    }
}
