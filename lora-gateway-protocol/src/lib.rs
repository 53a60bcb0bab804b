//! LoRa Gateway Control Protocol
//!
//! This library implements the host side of the line-oriented control
//! protocol spoken by Bluetooth-attached LoRa gateway nodes: radio
//! configuration, file listing, chunked uploads and raw-byte downloads over
//! RFCOMM or BLE GATT.

pub mod codec;
pub mod command;
pub mod connection;
pub mod device;
pub mod fs_utils;
pub mod radio_config;
pub mod transfer;
pub mod transport;

mod error;
pub use codec::{DecodedFrame, FrameDecoder, TextFrame};
pub use command::{ChunkHeader, Command, CHUNK_SIZE};
pub use connection::{
    ConnectionConfig, ConnectionEvent, ConnectionManager, ConnectionState, DataFrame,
};
pub use device::{DeviceIdentity, DeviceMode};
pub use error::{ErrorCategory, ProtocolError, Result};
pub use radio_config::RadioConfig;
pub use transfer::{
    DirectorySink, FileDescriptor, FileSink, MemorySink, UploadHandle, UploadReport,
};
pub use transport::{
    GattTransportFactory, RfcommTransportFactory, Transport, TransportAddress, TransportFactory,
    TransportType,
};
