//! Bluetooth RFCOMM transport
//!
//! Classic Bluetooth gateways expose the serial port profile (SPP). The
//! socket is a plain byte stream, wrapped by [`StreamTransport`].
//! Uses BlueZ on Linux for Bluetooth operations via the bluer crate.
//!
//! ## Connection Flow
//!
//! 1. The gateway is paired with this host beforehand
//! 2. An RFCOMM socket is opened on the configured channel
//! 3. The device name is looked up through the BlueZ adapter
//! 4. Bidirectional stream communication begins

use crate::transport::{
    StreamTransport, Transport, TransportAddress, TransportFactory, TransportType,
};
use crate::{ProtocolError, Result};
use async_trait::async_trait;
use bluer::rfcomm::{SocketAddr, Stream};
use bluer::{Address, Session};
use std::str::FromStr;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Serial port profile UUID served by the gateway's RFCOMM channel
pub const SPP_UUID: Uuid = uuid::uuid!("00001101-0000-1000-8000-00805f9b34fb");

/// Default RFCOMM channel of the gateway's serial port
pub const DEFAULT_RFCOMM_CHANNEL: u8 = 1;

/// Default timeout for Bluetooth operations
pub(crate) const BT_TIMEOUT: Duration = Duration::from_secs(15);

/// Parse a Bluetooth MAC address
pub(crate) fn parse_address(address: &str) -> Result<Address> {
    Address::from_str(address).map_err(|e| {
        ProtocolError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("Invalid Bluetooth address '{}': {}", address, e),
        ))
    })
}

/// Look up the advertised name of a known device
///
/// Returns `None` when BlueZ is unreachable or the device has no name.
pub(crate) async fn lookup_device_name(address: Address) -> Option<String> {
    let session = Session::new().await.ok()?;
    let adapter = session.default_adapter().await.ok()?;
    let device = adapter.device(address).ok()?;
    match device.name().await {
        Ok(name) => name,
        Err(e) => {
            debug!("No name for {}: {}", address, e);
            None
        }
    }
}

/// Factory for RFCOMM connections
#[derive(Debug, Clone)]
pub struct RfcommTransportFactory {
    /// Socket connect timeout
    timeout: Duration,
}

impl RfcommTransportFactory {
    /// Create a new RFCOMM transport factory
    pub fn new() -> Self {
        Self {
            timeout: BT_TIMEOUT,
        }
    }

    /// Create factory with a specific connect timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn open(&self, address: &str, channel: u8) -> Result<StreamTransport<Stream>> {
        let bt_addr = parse_address(address)?;
        let socket_addr = SocketAddr::new(bt_addr, channel);

        debug!("Connecting to RFCOMM socket: {} channel {}", bt_addr, channel);

        let stream = timeout(self.timeout, Stream::connect(socket_addr))
            .await
            .map_err(|_| {
                ProtocolError::Timeout(format!("RFCOMM connect to {} channel {}", address, channel))
            })?
            .map_err(|e| ProtocolError::from_io_error(e, &format!("connecting to {}", address)))?;

        info!("Connected to {} over RFCOMM channel {}", address, channel);

        let transport_address = TransportAddress::Rfcomm {
            address: address.to_string(),
            channel,
        };
        let transport = StreamTransport::new(stream, transport_address);

        Ok(match lookup_device_name(bt_addr).await {
            Some(name) => transport.with_name(name),
            None => {
                warn!("Could not resolve name of {}", address);
                transport
            }
        })
    }
}

impl Default for RfcommTransportFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransportFactory for RfcommTransportFactory {
    async fn connect(&self, address: TransportAddress) -> Result<Box<dyn Transport>> {
        match address {
            TransportAddress::Rfcomm { address, channel } => {
                let transport = self.open(&address, channel).await?;
                Ok(Box::new(transport))
            }
            other => Err(ProtocolError::Transport(format!(
                "RFCOMM factory cannot reach {}",
                other
            ))),
        }
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Rfcomm
    }
}
