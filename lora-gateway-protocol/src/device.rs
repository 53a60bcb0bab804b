//! Device identity derived from the advertised Bluetooth name

use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of a gateway node, guessed from its name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeviceMode {
    /// Name carries neither marker
    #[default]
    None,
    /// Transmitting node ("TX" in its name)
    Transmitter,
    /// Receiving node ("RX" in its name)
    Receiver,
}

impl DeviceMode {
    /// Classify a device name
    ///
    /// Case-insensitive substring match, `"TX"` checked before `"RX"`.
    ///
    /// ```rust
    /// use lora_gateway_protocol::DeviceMode;
    ///
    /// assert_eq!(DeviceMode::classify("LoRa-tx-01"), DeviceMode::Transmitter);
    /// assert_eq!(DeviceMode::classify("LoRa_RX"), DeviceMode::Receiver);
    /// assert_eq!(DeviceMode::classify("RX-TX bridge"), DeviceMode::Transmitter);
    /// assert_eq!(DeviceMode::classify("gateway"), DeviceMode::None);
    /// ```
    pub fn classify(name: &str) -> Self {
        let upper = name.to_uppercase();
        if upper.contains("TX") {
            DeviceMode::Transmitter
        } else if upper.contains("RX") {
            DeviceMode::Receiver
        } else {
            DeviceMode::None
        }
    }
}

impl fmt::Display for DeviceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceMode::None => write!(f, "unknown"),
            DeviceMode::Transmitter => write!(f, "TX"),
            DeviceMode::Receiver => write!(f, "RX"),
        }
    }
}

/// Identity of the currently connected device
///
/// Lives for exactly one connection and is cleared when it ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Advertised device name (falls back to the address when unknown)
    pub name: String,
    /// Mode classified from `name`
    pub mode: DeviceMode,
}

impl DeviceIdentity {
    /// Build an identity, classifying the name once
    pub fn from_name(name: impl Into<String>) -> Self {
        let name = name.into();
        let mode = DeviceMode::classify(&name);
        Self { name, mode }
    }

    /// Only transmitter nodes relay files over the radio link
    pub fn supports_radio_send(&self) -> bool {
        self.mode == DeviceMode::Transmitter
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.mode)
    }
}
