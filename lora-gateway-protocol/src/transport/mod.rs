//! Gateway Transport Layer
//!
//! The connection manager talks to a gateway through the [`Transport`]
//! trait. Classic Bluetooth (RFCOMM) and BLE GATT implementations are
//! provided; [`StreamTransport`] adapts any async byte stream.

mod r#trait;
pub mod ble;
pub mod bluetooth;
pub mod stream;

pub use ble::{
    GattConnection, GattTransportFactory, GATEWAY_NOTIFY_CHAR_UUID, GATEWAY_SERVICE_UUID,
    GATEWAY_WRITE_CHAR_UUID,
};
pub use bluetooth::{RfcommTransportFactory, DEFAULT_RFCOMM_CHANNEL, SPP_UUID};
pub use r#trait::{
    Transport, TransportAddress, TransportCapabilities, TransportFactory, TransportType,
};
pub use stream::{StreamTransport, STREAM_CAPABILITIES};
