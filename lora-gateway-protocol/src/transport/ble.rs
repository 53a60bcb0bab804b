//! Bluetooth Low Energy GATT transport
//!
//! BLE gateways expose one primary service with a write characteristic
//! (host → device) and a notify characteristic (device → host). Each
//! notification carries at most one ATT payload, so inbound data arrives
//! fragmented and outbound writes are split to the negotiated MTU.

use crate::transport::bluetooth::{parse_address, BT_TIMEOUT};
use crate::transport::{
    Transport, TransportAddress, TransportCapabilities, TransportFactory, TransportType,
};
use crate::{ProtocolError, Result};
use async_trait::async_trait;
use bluer::gatt::remote::Characteristic;
use bluer::{Device, Session};
use futures::stream::{Stream, StreamExt};
use std::pin::Pin;
use tokio::time::{sleep, timeout, Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Gateway GATT service
pub const GATEWAY_SERVICE_UUID: Uuid = uuid::uuid!("4fafc201-1fb5-459e-8fcc-c5c9c331914b");

/// Characteristic the host writes commands to
pub const GATEWAY_WRITE_CHAR_UUID: Uuid = uuid::uuid!("beb5483e-36e1-4688-b7f5-ea07361b26a8");

/// Characteristic the device notifies responses on
pub const GATEWAY_NOTIFY_CHAR_UUID: Uuid = uuid::uuid!("beb5483e-36e1-4688-b7f5-ea07361b26a9");

/// Payload of the default 23-byte ATT MTU
const MIN_ATT_PAYLOAD: usize = 20;

/// ATT write header size subtracted from the MTU
const ATT_HEADER_LEN: usize = 3;

/// Interval between service resolution checks
const RESOLVE_POLL_INTERVAL: Duration = Duration::from_millis(100);

type NotifyStream = Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>;

/// Split `data` into writes of at most `max` bytes
pub(crate) fn split_writes(data: &[u8], max: usize) -> impl Iterator<Item = &[u8]> {
    data.chunks(max.max(1))
}

/// Connected GATT link to a gateway
pub struct GattConnection {
    device: Device,
    write_char: Characteristic,
    notifications: NotifyStream,
    address: String,
    name: Option<String>,
    max_write: usize,
    connected: bool,
}

impl GattConnection {
    /// Connect and subscribe to the gateway service on `address`
    pub async fn connect(address: &str, op_timeout: Duration) -> Result<Self> {
        let bt_addr = parse_address(address)?;

        let session = Session::new()
            .await
            .map_err(|e| ProtocolError::Transport(format!("BlueZ session: {}", e)))?;
        let adapter = session
            .default_adapter()
            .await
            .map_err(|e| ProtocolError::Transport(format!("Bluetooth adapter: {}", e)))?;
        let device = adapter
            .device(bt_addr)
            .map_err(|e| ProtocolError::Transport(format!("device {}: {}", address, e)))?;

        if !device.is_connected().await.unwrap_or(false) {
            debug!("Connecting to BLE device {}", address);
            timeout(op_timeout, device.connect())
                .await
                .map_err(|_| ProtocolError::Timeout(format!("BLE connect to {}", address)))?
                .map_err(|e| ProtocolError::Transport(format!("BLE connect to {}: {}", address, e)))?;
        }

        wait_for_services(&device, op_timeout).await?;
        let (write_char, notify_char) = find_gateway_characteristics(&device).await?;

        let mtu = write_char.mtu().await.unwrap_or(MIN_ATT_PAYLOAD + ATT_HEADER_LEN);
        let max_write = mtu.saturating_sub(ATT_HEADER_LEN).max(MIN_ATT_PAYLOAD);

        let notifications = notify_char
            .notify()
            .await
            .map_err(|e| ProtocolError::Transport(format!("subscribing to notifications: {}", e)))?;

        let name = device.name().await.ok().flatten();
        info!(
            "Connected to {} over BLE (write payload {} bytes)",
            address, max_write
        );

        Ok(Self {
            device,
            write_char,
            notifications: Box::pin(notifications),
            address: address.to_string(),
            name,
            max_write,
            connected: true,
        })
    }
}

async fn wait_for_services(device: &Device, op_timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + op_timeout;
    loop {
        if device.is_services_resolved().await.unwrap_or(false) {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(ProtocolError::Timeout(format!(
                "GATT services of {} not resolved",
                device.address()
            )));
        }
        sleep(RESOLVE_POLL_INTERVAL).await;
    }
}

async fn find_gateway_characteristics(device: &Device) -> Result<(Characteristic, Characteristic)> {
    let services = device
        .services()
        .await
        .map_err(|e| ProtocolError::Transport(format!("listing GATT services: {}", e)))?;

    for service in services {
        if service.uuid().await.ok() != Some(GATEWAY_SERVICE_UUID) {
            continue;
        }

        let mut write_char = None;
        let mut notify_char = None;
        let characteristics = service
            .characteristics()
            .await
            .map_err(|e| ProtocolError::Transport(format!("listing characteristics: {}", e)))?;
        for characteristic in characteristics {
            match characteristic.uuid().await.ok() {
                Some(uuid) if uuid == GATEWAY_WRITE_CHAR_UUID => write_char = Some(characteristic),
                Some(uuid) if uuid == GATEWAY_NOTIFY_CHAR_UUID => {
                    notify_char = Some(characteristic)
                }
                _ => {}
            }
        }

        return match (write_char, notify_char) {
            (Some(w), Some(n)) => Ok((w, n)),
            _ => Err(ProtocolError::Transport(format!(
                "gateway service on {} lacks its characteristics",
                device.address()
            ))),
        };
    }

    Err(ProtocolError::Transport(format!(
        "{} does not expose service {}",
        device.address(),
        GATEWAY_SERVICE_UUID
    )))
}

impl std::fmt::Debug for GattConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GattConnection")
            .field("address", &self.address)
            .field("name", &self.name)
            .field("max_write", &self.max_write)
            .finish()
    }
}

#[async_trait]
impl Transport for GattConnection {
    fn capabilities(&self) -> TransportCapabilities {
        TransportCapabilities {
            max_write_size: self.max_write,
            reliable: true,
            message_oriented: true,
        }
    }

    fn remote_address(&self) -> TransportAddress {
        TransportAddress::Gatt {
            address: self.address.clone(),
        }
    }

    fn device_name(&self) -> Option<String> {
        self.name.clone()
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.connected {
            return Err(ProtocolError::ConnectionClosed(format!(
                "BLE link to {} already closed",
                self.address
            )));
        }

        for piece in split_writes(data, self.max_write) {
            if let Err(e) = self.write_char.write(piece).await {
                self.connected = false;
                return Err(ProtocolError::Transport(format!(
                    "GATT write to {}: {}",
                    self.address, e
                )));
            }
        }
        debug!("Wrote {} bytes to {} over BLE", data.len(), self.address);
        Ok(())
    }

    async fn receive(&mut self) -> Result<Vec<u8>> {
        match self.notifications.next().await {
            Some(value) => Ok(value),
            None => {
                debug!("Notification stream from {} ended", self.address);
                self.connected = false;
                Ok(Vec::new())
            }
        }
    }

    async fn close(self: Box<Self>) -> Result<()> {
        debug!("Disconnecting BLE device {}", self.address);
        if let Err(e) = self.device.disconnect().await {
            warn!("BLE disconnect from {} failed: {}", self.address, e);
            return Err(ProtocolError::Transport(e.to_string()));
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

/// Factory for BLE GATT connections
#[derive(Debug, Clone)]
pub struct GattTransportFactory {
    timeout: Duration,
}

impl GattTransportFactory {
    /// Create a new GATT transport factory
    pub fn new() -> Self {
        Self {
            timeout: BT_TIMEOUT,
        }
    }

    /// Create factory with a specific operation timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for GattTransportFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransportFactory for GattTransportFactory {
    async fn connect(&self, address: TransportAddress) -> Result<Box<dyn Transport>> {
        match address {
            TransportAddress::Gatt { address } => {
                let connection = GattConnection::connect(&address, self.timeout).await?;
                Ok(Box::new(connection))
            }
            other => Err(ProtocolError::Transport(format!(
                "GATT factory cannot reach {}",
                other
            ))),
        }
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Gatt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_uuids() {
        assert_eq!(
            GATEWAY_SERVICE_UUID.to_string(),
            "4fafc201-1fb5-459e-8fcc-c5c9c331914b"
        );
        assert_eq!(
            GATEWAY_WRITE_CHAR_UUID.to_string(),
            "beb5483e-36e1-4688-b7f5-ea07361b26a8"
        );
        assert_eq!(
            GATEWAY_NOTIFY_CHAR_UUID.to_string(),
            "beb5483e-36e1-4688-b7f5-ea07361b26a9"
        );
    }

    #[test]
    fn test_split_writes_respects_mtu() {
        let data = vec![7u8; 517];
        let pieces: Vec<&[u8]> = split_writes(&data, 244).collect();
        assert_eq!(pieces.len(), 3);
        assert_eq!(pieces[0].len(), 244);
        assert_eq!(pieces[2].len(), 29);

        assert_eq!(split_writes(b"abc", 0).count(), 3);
    }

    #[tokio::test]
    async fn test_factory_rejects_rfcomm_address() {
        let factory = GattTransportFactory::default();
        let result = factory
            .connect(TransportAddress::Rfcomm {
                address: "00:11:22:33:44:55".to_string(),
                channel: 1,
            })
            .await;
        assert!(matches!(result, Err(ProtocolError::Transport(_))));
    }
}
