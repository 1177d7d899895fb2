pub mod memory;
pub mod websocket;

pub use sockets_protocol::{Frame, FrameKind, Transport};
