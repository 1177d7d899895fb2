//! In-memory transport for tests and in-process peers
//!
//! [`MemoryTransport::create_pair`] returns the transport half handed to a
//! registry together with a [`MemoryPeer`] that plays the remote side.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use sockets_protocol::{Frame, TransportError, TransportResult as Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::Transport;

/// Channel-backed [`Transport`]
///
/// # Example
///
/// ```
/// use sockets_server::transport::memory::MemoryTransport;
///
/// let (transport, peer) = MemoryTransport::create_pair(100);
/// ```
pub struct MemoryTransport {
    inbound: tokio::sync::Mutex<mpsc::Receiver<Frame>>,
    outbound: Mutex<Option<mpsc::Sender<Bytes>>>,
    closed: AtomicBool,
    shutdown: CancellationToken,
}

/// Remote end of a [`MemoryTransport`]
///
/// Dropping the peer ends the transport's reads and makes its writes fail.
pub struct MemoryPeer {
    to_transport: mpsc::Sender<Frame>,
    from_transport: mpsc::Receiver<Bytes>,
}

impl MemoryTransport {
    /// Creates a connected transport/peer pair with `buffer` slots per direction
    pub fn create_pair(buffer: usize) -> (Self, MemoryPeer) {
        let (to_transport, inbound) = mpsc::channel(buffer);
        let (outbound, from_transport) = mpsc::channel(buffer);

        let transport = Self {
            inbound: tokio::sync::Mutex::new(inbound),
            outbound: Mutex::new(Some(outbound)),
            closed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        };
        let peer = MemoryPeer {
            to_transport,
            from_transport,
        };

        (transport, peer)
    }

    fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.shutdown.cancel();
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn write(&self, frame: Bytes) -> Result<()> {
        let sender = self.outbound.lock().clone();
        let Some(sender) = sender else {
            return Err(TransportError::Closed);
        };

        tokio::select! {
            biased;

            _ = self.shutdown.cancelled() => Err(TransportError::Closed),

            sent = sender.send(frame) => match sent {
                Ok(()) => Ok(()),
                Err(_) => {
                    self.mark_closed();
                    Err(TransportError::Closed)
                }
            },
        }
    }

    async fn read(&self) -> Result<Frame> {
        let mut inbound = self.inbound.lock().await;

        tokio::select! {
            biased;

            _ = self.shutdown.cancelled() => Err(TransportError::Closed),

            frame = inbound.recv() => match frame {
                Some(frame) => Ok(frame),
                None => {
                    self.mark_closed();
                    Err(TransportError::Closed)
                }
            },
        }
    }

    async fn close(&self) -> Result<()> {
        self.outbound.lock().take();
        self.mark_closed();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl MemoryPeer {
    /// Delivers one message frame; false once the transport is gone
    pub async fn send(&self, bytes: impl Into<Bytes>) -> bool {
        self.send_frame(Frame::Message(bytes.into())).await
    }

    /// Delivers an arbitrary frame, e.g. [`Frame::Unsupported`]
    pub async fn send_frame(&self, frame: Frame) -> bool {
        self.to_transport.send(frame).await.is_ok()
    }

    /// Next frame written by the transport, `None` after it closed
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.from_transport.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sockets_protocol::FrameKind;
    use std::sync::Arc;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_write_reaches_peer() {
        let (transport, mut peer) = MemoryTransport::create_pair(10);

        transport.write(Bytes::from_static(b"hello")).await.unwrap();
        assert_eq!(peer.recv().await, Some(Bytes::from_static(b"hello")));
    }

    #[tokio::test]
    async fn test_read_preserves_order_and_kind() {
        let (transport, peer) = MemoryTransport::create_pair(10);

        assert!(peer.send(Bytes::from_static(b"one")).await);
        assert!(peer.send_frame(Frame::Unsupported(FrameKind::Ping)).await);
        assert!(peer.send(Bytes::from_static(b"two")).await);

        assert_eq!(transport.read().await, Ok(Frame::Message(Bytes::from_static(b"one"))));
        assert_eq!(transport.read().await, Ok(Frame::Unsupported(FrameKind::Ping)));
        assert_eq!(transport.read().await, Ok(Frame::Message(Bytes::from_static(b"two"))));
    }

    #[tokio::test]
    async fn test_dropped_peer_ends_reads_and_writes() {
        let (transport, peer) = MemoryTransport::create_pair(10);
        drop(peer);

        assert_eq!(transport.read().await, Err(TransportError::Closed));
        assert!(transport.is_closed());
        assert_eq!(
            transport.write(Bytes::from_static(b"x")).await,
            Err(TransportError::Closed)
        );
    }

    #[tokio::test]
    async fn test_close_wakes_blocked_reader() {
        let (transport, _peer) = MemoryTransport::create_pair(10);
        let transport = Arc::new(transport);

        let reader = Arc::clone(&transport);
        let handle = tokio::spawn(async move { reader.read().await });

        tokio::task::yield_now().await;
        transport.close().await.unwrap();

        let result = timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert_eq!(result, Err(TransportError::Closed));
        assert!(transport.is_closed());
    }

    #[tokio::test]
    async fn test_close_cancels_blocked_write() {
        let (transport, _peer) = MemoryTransport::create_pair(1);
        let transport = Arc::new(transport);
        transport.write(Bytes::from_static(b"fills the buffer")).await.unwrap();

        let writer = Arc::clone(&transport);
        let handle = tokio::spawn(async move { writer.write(Bytes::from_static(b"blocked")).await });

        tokio::task::yield_now().await;
        assert!(!handle.is_finished());
        transport.close().await.unwrap();

        let result = timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert_eq!(result, Err(TransportError::Closed));
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_ends_peer_stream() {
        let (transport, mut peer) = MemoryTransport::create_pair(10);

        transport.close().await.unwrap();
        transport.close().await.unwrap();

        assert!(peer.recv().await.is_none());
        assert_eq!(transport.write(Bytes::new()).await, Err(TransportError::Closed));
    }
}
