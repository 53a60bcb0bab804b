//! LoRa radio parameters carried by `GET_CONFIG` / `SET_CONFIG`
//!
//! The values are opaque to this layer; only their allowed domains are
//! enforced before a configuration is sent to the device.

use crate::{ProtocolError, Result};
use serde::Deserialize;
use std::fmt;
use std::ops::RangeInclusive;

/// Allowed bandwidths in kHz
pub const BANDWIDTHS_KHZ: [u32; 3] = [125, 250, 500];

/// Allowed spreading factors
pub const SPREADING_FACTORS: [u8; 3] = [7, 9, 12];

/// Allowed coding rate denominators (4/5, 4/7, 4/8)
pub const CODING_RATES: [u8; 3] = [5, 7, 8];

/// Allowed ACK interval, in packets
pub const ACK_INTERVAL_RANGE: RangeInclusive<u32> = 3..=15;

/// Radio configuration reported by or sent to the device
///
/// Immutable value; updates replace it wholesale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadioConfig {
    /// Bandwidth in kHz
    pub bandwidth_khz: f32,
    /// Spreading factor
    pub spreading_factor: u8,
    /// Coding rate denominator
    pub coding_rate: u8,
    /// Packets per acknowledgment on the radio link
    pub ack_interval: u32,
}

/// JSON object exchanged with the device
#[derive(Debug, Deserialize)]
struct WireConfig {
    bw: f64,
    sf: i64,
    cr: i64,
    ack: i64,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            bandwidth_khz: 125.0,
            spreading_factor: 9,
            coding_rate: 7,
            ack_interval: 5,
        }
    }
}

impl RadioConfig {
    /// Create a configuration from its four parameters
    pub fn new(bandwidth_khz: f32, spreading_factor: u8, coding_rate: u8, ack_interval: u32) -> Self {
        Self {
            bandwidth_khz,
            spreading_factor,
            coding_rate,
            ack_interval,
        }
    }

    /// Whether every parameter lies in its allowed domain
    ///
    /// ```rust
    /// use lora_gateway_protocol::RadioConfig;
    ///
    /// assert!(RadioConfig::new(125.0, 9, 7, 5).is_valid());
    /// assert!(!RadioConfig::new(100.0, 9, 7, 5).is_valid());
    /// ```
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Like [`is_valid`](Self::is_valid) but names the offending parameter
    pub fn validate(&self) -> Result<()> {
        let bw_ok = self.bandwidth_khz.fract() == 0.0
            && BANDWIDTHS_KHZ.contains(&(self.bandwidth_khz as u32));
        if !bw_ok {
            return Err(ProtocolError::InvalidConfig(format!(
                "bandwidth {} kHz not in {:?}",
                self.bandwidth_khz, BANDWIDTHS_KHZ
            )));
        }
        if !SPREADING_FACTORS.contains(&self.spreading_factor) {
            return Err(ProtocolError::InvalidConfig(format!(
                "spreading factor {} not in {:?}",
                self.spreading_factor, SPREADING_FACTORS
            )));
        }
        if !CODING_RATES.contains(&self.coding_rate) {
            return Err(ProtocolError::InvalidConfig(format!(
                "coding rate 4/{} not in {:?}",
                self.coding_rate, CODING_RATES
            )));
        }
        if !ACK_INTERVAL_RANGE.contains(&self.ack_interval) {
            return Err(ProtocolError::InvalidConfig(format!(
                "ack interval {} outside {}..={}",
                self.ack_interval,
                ACK_INTERVAL_RANGE.start(),
                ACK_INTERVAL_RANGE.end()
            )));
        }
        Ok(())
    }

    /// Parse the device's configuration object
    ///
    /// `bw` may be an integer or a float. Values outside the integer ranges
    /// of the fields are a parse error; domain checks are left to
    /// [`validate`](Self::validate).
    pub fn from_json(json: &str) -> Result<Self> {
        let wire: WireConfig = serde_json::from_str(json.trim())?;
        let out_of_range = |field: &str, value: i64| {
            ProtocolError::InvalidFrame(format!("config field {} out of range: {}", field, value))
        };
        Ok(Self {
            bandwidth_khz: wire.bw as f32,
            spreading_factor: u8::try_from(wire.sf).map_err(|_| out_of_range("sf", wire.sf))?,
            coding_rate: u8::try_from(wire.cr).map_err(|_| out_of_range("cr", wire.cr))?,
            ack_interval: u32::try_from(wire.ack).map_err(|_| out_of_range("ack", wire.ack))?,
        })
    }

    /// Render the wire object, bandwidth truncated to whole kHz
    ///
    /// ```rust
    /// use lora_gateway_protocol::RadioConfig;
    ///
    /// assert_eq!(
    ///     RadioConfig::new(250.7, 12, 8, 10).to_json(),
    ///     r#"{"bw":250,"sf":12,"cr":8,"ack":10}"#
    /// );
    /// ```
    pub fn to_json(&self) -> String {
        format!(
            r#"{{"bw":{},"sf":{},"cr":{},"ack":{}}}"#,
            self.bandwidth_khz as i64, self.spreading_factor, self.coding_rate, self.ack_interval
        )
    }
}

impl fmt::Display for RadioConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BW: {} kHz | SF: {} | CR: 4/{} | ACK: {}",
            self.bandwidth_khz as i64, self.spreading_factor, self.coding_rate, self.ack_interval
        )
    }
}
