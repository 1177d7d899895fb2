use bytes::Bytes;
use sockets_protocol::{CodecError, Envelope, EnvelopeCodec, FrameKind, Frame, JsonCodec, MemorySession};
use sockets_server::transport::memory::{MemoryPeer, MemoryTransport};
use sockets_server::{Client, Fault, Recovery, Registry};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

struct Collect {
    tx: mpsc::UnboundedSender<(String, Fault)>,
}

#[async_trait::async_trait]
impl Recovery for Collect {
    async fn recover(&self, client: Arc<Client>, fault: Fault) {
        let _ = self.tx.send((client.ident().to_string(), fault));
    }
}

fn setup() -> (Registry, mpsc::UnboundedReceiver<(String, Fault)>) {
    let registry = Registry::new();
    let (tx, rx) = mpsc::unbounded_channel();
    registry.set_recovery(Collect { tx });
    registry
        .register_fn("echo", |data: Bytes, client: Arc<Client>| async move {
            let _ = client.send("echo", data).await;
        })
        .unwrap();
    registry
        .register_fn("explode", |_data: Bytes, _client: Arc<Client>| async move {
            panic!("kaboom");
        })
        .unwrap();
    (registry, rx)
}

fn frame(method: &str, data: &'static [u8]) -> Bytes {
    JsonCodec
        .encode(&Envelope::new(method, Bytes::from_static(data), 1))
        .unwrap()
}

async fn expect_echo(peer: &mut MemoryPeer, data: &'static [u8]) {
    let bytes = timeout(Duration::from_secs(1), peer.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(JsonCodec.decode(&bytes).unwrap().data, Bytes::from_static(data));
}

#[tokio::test]
async fn test_every_fault_kind_is_recovered() {
    let (registry, mut faults) = setup();
    let (transport, mut peer) = MemoryTransport::create_pair(16);
    let ident = registry.accept(transport, MemorySession::new());

    peer.send(Bytes::from_static(br#"{"data":1}"#)).await;
    peer.send(frame("missing", b"1")).await;
    peer.send(frame("explode", b"1")).await;
    peer.send(frame("echo", b"\"alive\"")).await;

    expect_echo(&mut peer, b"\"alive\"").await;

    let (who, fault) = faults.recv().await.unwrap();
    assert_eq!(who, ident);
    assert_eq!(fault, Fault::Decode(CodecError::MissingMethod));

    let (_, fault) = faults.recv().await.unwrap();
    assert_eq!(fault, Fault::UnknownMethod("missing".into()));

    let (_, fault) = faults.recv().await.unwrap();
    assert_eq!(
        fault,
        Fault::HandlerPanic {
            method: "explode".into(),
            message: "kaboom".into(),
        }
    );

    assert!(faults.try_recv().is_err());
    assert!(registry.get(&ident).unwrap().is_open());
}

#[tokio::test]
async fn test_unsupported_frames_are_not_faults() {
    let (registry, mut faults) = setup();
    let (transport, mut peer) = MemoryTransport::create_pair(16);
    registry.accept(transport, MemorySession::new());

    peer.send_frame(Frame::Unsupported(FrameKind::Binary)).await;
    peer.send_frame(Frame::Unsupported(FrameKind::Ping)).await;
    peer.send(frame("echo", b"3")).await;

    expect_echo(&mut peer, b"3").await;
    assert!(faults.try_recv().is_err());
}

#[tokio::test]
async fn test_repeated_panics_do_not_close_connection() {
    let (registry, mut faults) = setup();
    let (transport, mut peer) = MemoryTransport::create_pair(16);
    let ident = registry.accept(transport, MemorySession::new());

    for _ in 0..5 {
        peer.send(frame("explode", b"null")).await;
    }
    peer.send(frame("echo", b"4")).await;

    expect_echo(&mut peer, b"4").await;
    for _ in 0..5 {
        assert!(matches!(faults.recv().await.unwrap().1, Fault::HandlerPanic { .. }));
    }
    assert_eq!(registry.len(), 1);
    assert!(registry.get(&ident).is_some());
}
