//! Transport Trait Abstraction
//!
//! Defines the byte channel the connection manager drives. Concrete
//! transports exist for classic Bluetooth (RFCOMM serial port profile),
//! BLE GATT characteristics, and any in-memory async stream.

use crate::Result;
use async_trait::async_trait;
use std::fmt::Debug;

/// Transport capabilities and characteristics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportCapabilities {
    /// Largest payload handed to the link in one write, in bytes
    pub max_write_size: usize,

    /// Whether the link retransmits lost frames itself
    pub reliable: bool,

    /// Whether inbound data arrives in bounded notification events
    /// rather than as a continuous stream
    pub message_oriented: bool,
}

/// Where to reach a gateway
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TransportAddress {
    /// Classic Bluetooth serial port (RFCOMM)
    Rfcomm {
        /// Bluetooth MAC address
        address: String,

        /// RFCOMM channel
        channel: u8,
    },

    /// Bluetooth Low Energy GATT service
    Gatt {
        /// Bluetooth MAC address
        address: String,
    },
}

impl TransportAddress {
    /// Bluetooth MAC address of the remote device
    pub fn device_address(&self) -> &str {
        match self {
            TransportAddress::Rfcomm { address, .. } | TransportAddress::Gatt { address } => {
                address
            }
        }
    }

    /// Transport kind needed to reach this address
    pub fn transport_type(&self) -> TransportType {
        match self {
            TransportAddress::Rfcomm { .. } => TransportType::Rfcomm,
            TransportAddress::Gatt { .. } => TransportType::Gatt,
        }
    }
}

impl std::fmt::Display for TransportAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportAddress::Rfcomm { address, channel } => {
                write!(f, "rfcomm://{}#{}", address, channel)
            }
            TransportAddress::Gatt { address } => write!(f, "gatt://{}", address),
        }
    }
}

/// Byte channel to one gateway
#[async_trait]
pub trait Transport: Send + Debug {
    /// Get transport capabilities
    fn capabilities(&self) -> TransportCapabilities;

    /// Get remote address
    fn remote_address(&self) -> TransportAddress;

    /// Name the remote device advertises, if known
    fn device_name(&self) -> Option<String>;

    /// Write all of `data` to the link
    ///
    /// # Errors
    ///
    /// Returns an error if the link failed or was closed.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Wait for the next inbound bytes
    ///
    /// Must be cancel-safe: dropping the future before it resolves loses no
    /// data. An empty vector means the remote side closed the link.
    async fn receive(&mut self) -> Result<Vec<u8>>;

    /// Close the connection gracefully
    async fn close(self: Box<Self>) -> Result<()>;

    /// Check if the transport is still connected
    fn is_connected(&self) -> bool {
        true
    }
}

/// Factory trait for creating transport connections
#[async_trait]
pub trait TransportFactory: Send + Sync + Debug {
    /// Connect to a remote device
    async fn connect(&self, address: TransportAddress) -> Result<Box<dyn Transport>>;

    /// Get the transport type this factory creates
    fn transport_type(&self) -> TransportType;
}

/// Transport type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportType {
    /// Classic Bluetooth RFCOMM
    Rfcomm,

    /// Bluetooth Low Energy GATT
    Gatt,
}

impl std::fmt::Display for TransportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportType::Rfcomm => write!(f, "RFCOMM"),
            TransportType::Gatt => write!(f, "BLE GATT"),
        }
    }
}
