//! Session Integration Tests
//!
//! Drives a [`ConnectionManager`] against a simulated gateway on the other
//! end of an in-memory duplex stream:
//! - connection lifecycle (connect, reconnect, disconnect, remote hang-up)
//! - command encoding as seen by the device
//! - chunked uploads and raw-byte downloads
//! - file listings with malformed entries

use async_trait::async_trait;
use lora_gateway_protocol::transport::StreamTransport;
use lora_gateway_protocol::{
    ConnectionConfig, ConnectionEvent, ConnectionManager, ConnectionState, DataFrame, DeviceMode,
    ErrorCategory, FileDescriptor, MemorySink, ProtocolError, RadioConfig, Result, Transport,
    TransportAddress, TransportFactory, TransportType,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{sleep, timeout, Duration};

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Factory handing out one prepared duplex stream per connect
#[derive(Debug)]
struct SimulatedGateways {
    name: String,
    streams: Mutex<VecDeque<DuplexStream>>,
}

#[async_trait]
impl TransportFactory for SimulatedGateways {
    async fn connect(&self, address: TransportAddress) -> Result<Box<dyn Transport>> {
        let stream = self
            .streams
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProtocolError::ConnectionRefused(address.to_string()))?;
        Ok(Box::new(
            StreamTransport::new(stream, address).with_name(self.name.clone()),
        ))
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Rfcomm
    }
}

/// Build a factory for `count` gateways, returning the device ends
fn gateways(name: &str, count: usize) -> (Arc<SimulatedGateways>, Vec<DuplexStream>) {
    let mut local = VecDeque::new();
    let mut remote = Vec::new();
    for _ in 0..count {
        let (a, b) = tokio::io::duplex(64 * 1024);
        local.push_back(a);
        remote.push(b);
    }
    let factory = SimulatedGateways {
        name: name.to_string(),
        streams: Mutex::new(local),
    };
    (Arc::new(factory), remote)
}

fn test_config() -> ConnectionConfig {
    ConnectionConfig {
        connect_timeout: Duration::from_secs(5),
        upload_settle_delay: Duration::ZERO,
        chunk_pacing: Duration::ZERO,
        refresh_on_connect: false,
        refresh_delay: Duration::ZERO,
    }
}

fn address() -> TransportAddress {
    TransportAddress::Rfcomm {
        address: "AA:BB:CC:DD:EE:FF".to_string(),
        channel: 1,
    }
}

async fn next_event(events: &mut UnboundedReceiver<ConnectionEvent>) -> ConnectionEvent {
    timeout(EVENT_TIMEOUT, events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Skip progress events, which depend on how reads were split
async fn next_significant(events: &mut UnboundedReceiver<ConnectionEvent>) -> ConnectionEvent {
    loop {
        match next_event(events).await {
            ConnectionEvent::DataFrame(DataFrame::DownloadProgress { .. })
            | ConnectionEvent::DataFrame(DataFrame::UploadProgress { .. }) => continue,
            event => return event,
        }
    }
}

async fn read_exactly(device: &mut DuplexStream, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    timeout(EVENT_TIMEOUT, device.read_exact(&mut buf))
        .await
        .expect("timed out reading from manager")
        .unwrap();
    buf
}

async fn connected(
    name: &str,
    config: ConnectionConfig,
) -> (
    ConnectionManager,
    Arc<MemorySink>,
    DuplexStream,
    UnboundedReceiver<ConnectionEvent>,
) {
    let (factory, mut remotes) = gateways(name, 1);
    let sink = Arc::new(MemorySink::new());
    let manager = ConnectionManager::new(factory, sink.clone(), config);
    let mut events = manager.subscribe().await;

    manager.connect(address()).await.unwrap();
    assert!(matches!(
        next_event(&mut events).await,
        ConnectionEvent::Connected { .. }
    ));

    (manager, sink, remotes.remove(0), events)
}

#[tokio::test]
async fn test_connect_reports_identity() {
    let (manager, _sink, _device, _events) = connected("LoRa-RX-7", test_config()).await;

    let identity = manager.identity().await.unwrap();
    assert_eq!(identity.name, "LoRa-RX-7");
    assert_eq!(identity.mode, DeviceMode::Receiver);
    assert_eq!(manager.remote_address().await, Some(address()));
    assert!(manager.is_connected().await);
}

#[tokio::test]
async fn test_refresh_after_connect() {
    let config = ConnectionConfig {
        refresh_on_connect: true,
        ..test_config()
    };
    let (_manager, _sink, mut device, _events) = connected("gw", config).await;

    let expected = b"GET_CONFIG\nGET_FILES\n";
    assert_eq!(read_exactly(&mut device, expected.len()).await, expected);
}

#[tokio::test]
async fn test_commands_on_the_wire() {
    let (manager, _sink, mut device, _events) = connected("gw", test_config()).await;

    manager.download_file("log.txt").await.unwrap();
    manager.delete_file("/old.bin").await.unwrap();
    manager
        .set_config(RadioConfig::new(250.0, 12, 8, 10))
        .await
        .unwrap();
    manager.send_custom_command("PING").await.unwrap();
    manager.send_raw_bytes(&[0x01, 0x02]).await.unwrap();

    let expected: &[u8] = b"DOWNLOAD_FILE:/log.txt\n\
DELETE_FILE:/old.bin\n\
SET_CONFIG:{\"bw\":250,\"sf\":12,\"cr\":8,\"ack\":10}\n\
PING\n\x01\x02";
    assert_eq!(read_exactly(&mut device, expected.len()).await, expected);
    assert_eq!(
        manager.last_config().await,
        Some(RadioConfig::new(250.0, 12, 8, 10))
    );
}

#[tokio::test]
async fn test_upload_chunks_on_the_wire() {
    let (manager, _sink, mut device, mut events) = connected("LoRa_TX", test_config()).await;

    let data: Vec<u8> = (0..1300u32).map(|i| (i % 251) as u8).collect();
    let handle = manager.upload(data.clone(), "photo.jpg").await.unwrap();
    assert_eq!(handle.total_chunks(), 3);

    let metadata = b"UPLOAD_FILE:{\"filename\":\"photo.jpg\",\"size\":1300}\n";
    assert_eq!(read_exactly(&mut device, metadata.len()).await, metadata);

    let first = read_exactly(&mut device, 5 + 512).await;
    assert_eq!(&first[..5], &[b'C', 0, 0, 0, 3]);
    assert_eq!(&first[5..], &data[..512]);

    let second = read_exactly(&mut device, 5 + 512).await;
    assert_eq!(&second[..5], &[b'C', 0, 1, 0, 3]);

    let last = read_exactly(&mut device, 5 + 276).await;
    assert_eq!(&last[..5], &[b'C', 0, 2, 0, 3]);
    assert_eq!(&last[5..], &data[1024..]);

    let report = handle.wait().await.unwrap();
    assert_eq!(report.chunks, 3);
    assert_eq!(report.bytes, 1300);

    let mut progress = Vec::new();
    while progress.len() < 3 {
        if let ConnectionEvent::DataFrame(DataFrame::UploadProgress {
            sent_chunks,
            total_chunks,
        }) = next_event(&mut events).await
        {
            progress.push((sent_chunks, total_chunks));
        }
    }
    assert_eq!(progress, vec![(1, 3), (2, 3), (3, 3)]);

    // The slot is free again once the worker finished
    let again = manager.upload(vec![1; 10], "small.txt").await.unwrap();
    again.wait().await.unwrap();
}

#[tokio::test]
async fn test_upload_stops_when_connection_ends() {
    let config = ConnectionConfig {
        upload_settle_delay: Duration::from_secs(30),
        ..test_config()
    };
    let (manager, _sink, _device, _events) = connected("gw", config).await;

    let handle = manager.upload(vec![0; 4096], "big.bin").await.unwrap();
    manager.disconnect().await.unwrap();

    // The settle delay ends with the session
    let err = timeout(Duration::from_secs(2), handle.wait())
        .await
        .expect("upload outlived the session")
        .unwrap_err();
    assert!(matches!(err, ProtocolError::ConnectionClosed(_)));
}

#[tokio::test]
async fn test_download_across_reads() {
    let (_manager, sink, mut device, mut events) = connected("gw", test_config()).await;

    let payload: Vec<u8> = (0..2048u32).map(|i| (i * 7 % 256) as u8).collect();

    device.write_all(b"[FILE_START:data.bin:2048]\n").await.unwrap();
    for piece in payload.chunks(300) {
        device.write_all(piece).await.unwrap();
        device.flush().await.unwrap();
        sleep(Duration::from_millis(2)).await;
    }
    device.write_all(b"[FILE_END]\n").await.unwrap();

    assert_eq!(
        next_significant(&mut events).await,
        ConnectionEvent::DataFrame(DataFrame::DownloadStarted {
            name: "data.bin".to_string(),
            size: 2048
        })
    );
    match next_significant(&mut events).await {
        ConnectionEvent::DataFrame(DataFrame::DownloadComplete { name, size, .. }) => {
            assert_eq!(name, "data.bin");
            assert_eq!(size, 2048);
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(sink.get("data.bin").await, Some(payload));
}

#[tokio::test]
async fn test_truncated_download_is_not_stored() {
    let (_manager, sink, mut device, mut events) = connected("gw", test_config()).await;

    device
        .write_all(b"[FILE_START:cut.txt:100]\nonly a few bytes\n[FILE_END]\n")
        .await
        .unwrap();

    assert!(matches!(
        next_significant(&mut events).await,
        ConnectionEvent::DataFrame(DataFrame::DownloadStarted { .. })
    ));
    assert!(matches!(
        next_significant(&mut events).await,
        ConnectionEvent::Error { .. }
    ));
    assert!(sink.names().await.is_empty());
}

#[tokio::test]
async fn test_listing_skips_malformed_entries() {
    let (manager, _sink, mut device, mut events) = connected("gw", test_config()).await;

    device
        .write_all(b"[FILES_START]\r\na.txt,10\r\nbad,xyz\r\nb.log, 2048\r\n[FILES_END]\r\n")
        .await
        .unwrap();

    let expected = vec![
        FileDescriptor::new("a.txt", 10),
        FileDescriptor::new("b.log", 2048),
    ];
    assert_eq!(
        next_event(&mut events).await,
        ConnectionEvent::DataFrame(DataFrame::FileList(expected.clone()))
    );
    assert_eq!(manager.files().await, expected);
}

#[tokio::test]
async fn test_unclassified_lines_pass_through() {
    let (_manager, _sink, mut device, mut events) = connected("gw", test_config()).await;

    device.write_all(b"STATUS OK\n").await.unwrap();

    assert_eq!(
        next_event(&mut events).await,
        ConnectionEvent::DataFrame(DataFrame::Unclassified("STATUS OK".to_string()))
    );
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let (manager, _sink, _device, mut events) = connected("gw", test_config()).await;

    manager.disconnect().await.unwrap();
    manager.disconnect().await.unwrap();
    assert_eq!(manager.state().await, ConnectionState::Idle);

    assert!(matches!(
        next_event(&mut events).await,
        ConnectionEvent::Disconnected { .. }
    ));
    assert!(timeout(Duration::from_millis(100), events.recv())
        .await
        .is_err());
}

#[tokio::test]
async fn test_commands_after_disconnect_write_nothing() {
    let (manager, _sink, mut device, _events) = connected("gw", test_config()).await;
    manager.disconnect().await.unwrap();

    let err = manager.list_files().await.unwrap_err();
    assert!(matches!(err, ProtocolError::NotConnected));
    assert_eq!(err.category(), ErrorCategory::Validation);
    assert!(matches!(
        manager.upload(vec![1], "x").await,
        Err(ProtocolError::NotConnected)
    ));

    // The device side only sees the link close
    let mut rest = Vec::new();
    device.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());
}

#[tokio::test]
async fn test_remote_hangup_reported() {
    let (manager, _sink, device, mut events) = connected("gw", test_config()).await;

    drop(device);

    assert_eq!(
        next_event(&mut events).await,
        ConnectionEvent::Error {
            message: "unexpected disconnect".to_string()
        }
    );
    assert!(matches!(
        next_event(&mut events).await,
        ConnectionEvent::Disconnected { .. }
    ));
    assert_eq!(manager.state().await, ConnectionState::Idle);
    assert_eq!(manager.identity().await, None);
}

#[tokio::test]
async fn test_hangup_mid_download_discards_it() {
    let (_manager, sink, mut device, mut events) = connected("gw", test_config()).await;

    device
        .write_all(b"[FILE_START:half.bin:1000]\nxxxx")
        .await
        .unwrap();
    assert!(matches!(
        next_significant(&mut events).await,
        ConnectionEvent::DataFrame(DataFrame::DownloadStarted { .. })
    ));
    drop(device);

    match next_significant(&mut events).await {
        ConnectionEvent::Error { message } => assert!(message.contains("half.bin")),
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(
        next_significant(&mut events).await,
        ConnectionEvent::Error {
            message: "unexpected disconnect".to_string()
        }
    );
    assert!(sink.names().await.is_empty());
}

#[tokio::test]
async fn test_reconnect_replaces_session() {
    let (factory, mut remotes) = gateways("gw", 2);
    let manager = ConnectionManager::new(factory, Arc::new(MemorySink::new()), test_config());
    let mut events = manager.subscribe().await;

    manager.connect(address()).await.unwrap();
    manager.connect(address()).await.unwrap();

    assert!(matches!(
        next_event(&mut events).await,
        ConnectionEvent::Connected { .. }
    ));
    assert!(matches!(
        next_event(&mut events).await,
        ConnectionEvent::Disconnected { .. }
    ));
    assert!(matches!(
        next_event(&mut events).await,
        ConnectionEvent::Connected { .. }
    ));

    // First link was closed, second one carries the traffic
    let mut first = remotes.remove(0);
    let mut rest = Vec::new();
    first.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());

    manager.get_status().await.unwrap();
    let mut second = remotes.remove(0);
    assert_eq!(read_exactly(&mut second, 11).await, b"GET_STATUS\n");
}

#[tokio::test]
async fn test_connect_refused() {
    let (factory, _remotes) = gateways("gw", 0);
    let manager = ConnectionManager::new(factory, Arc::new(MemorySink::new()), test_config());

    let err = manager.connect(address()).await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Transport);
    assert!(err.is_recoverable());
    assert_eq!(manager.state().await, ConnectionState::Idle);
}
