//! # Sockets
//!
//! Method-routed message dispatch over persistent connections.
//!
//! ## Components
//!
//! - `sockets-protocol`: envelope format, codecs, transport and session contracts
//! - `sockets-server`: connection registry, routing and the websocket listener
//!
//! ## Example
//!
//! See `demos/echo_server.rs` for a runnable websocket server.

pub use sockets_protocol as protocol;
pub use sockets_server as server;
