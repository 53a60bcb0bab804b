//! Controller Configuration
//!
//! Configuration management for the gateway controller, stored as TOML.

use anyhow::{bail, Context, Result};
use lora_gateway_protocol::transport::DEFAULT_RFCOMM_CHANNEL;
use lora_gateway_protocol::{ConnectionConfig, RadioConfig, TransportAddress};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Controller configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Device configuration
    #[serde(default)]
    pub device: DeviceConfig,

    /// Transfer timing
    #[serde(default)]
    pub transfer: TransferConfig,

    /// Radio configuration used by `set-config` when flags are omitted
    #[serde(default)]
    pub radio: RadioDefaults,

    /// Storage paths
    #[serde(default)]
    pub paths: PathConfig,
}

/// Bluetooth link kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Classic Bluetooth serial port profile
    #[default]
    Rfcomm,
    /// Bluetooth Low Energy GATT
    Ble,
}

/// Device configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Default Bluetooth address (`AA:BB:CC:DD:EE:FF`)
    #[serde(default)]
    pub address: Option<String>,

    /// Link kind
    #[serde(default)]
    pub transport: TransportKind,

    /// RFCOMM channel
    #[serde(default = "default_channel")]
    pub channel: u8,
}

/// Transfer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Wait between upload announcement and first chunk, in milliseconds
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,

    /// Wait between upload chunks, in milliseconds
    #[serde(default = "default_chunk_pacing")]
    pub chunk_pacing_ms: u64,

    /// Ask for configuration and listing right after connecting
    #[serde(default = "default_false")]
    pub refresh_on_connect: bool,

    /// How long to wait for the device to answer a request, in seconds
    #[serde(default = "default_response_timeout")]
    pub response_timeout_secs: u64,

    /// How long to wait for a download to finish, in seconds
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,
}

/// Default radio parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadioDefaults {
    /// Bandwidth in kHz
    #[serde(default = "default_bandwidth")]
    pub bandwidth_khz: u32,

    /// Spreading factor
    #[serde(default = "default_spreading_factor")]
    pub spreading_factor: u8,

    /// Coding rate denominator (4/x)
    #[serde(default = "default_coding_rate")]
    pub coding_rate: u8,

    /// Packets per acknowledgment
    #[serde(default = "default_ack_interval")]
    pub ack_interval: u32,
}

/// Storage paths configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathConfig {
    /// Where finished downloads are written
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
}

fn default_channel() -> u8 {
    DEFAULT_RFCOMM_CHANNEL
}

fn default_connect_timeout() -> u64 {
    15
}

fn default_settle_delay() -> u64 {
    200
}

fn default_chunk_pacing() -> u64 {
    50
}

fn default_response_timeout() -> u64 {
    10
}

fn default_download_timeout() -> u64 {
    300
}

fn default_false() -> bool {
    false
}

fn default_bandwidth() -> u32 {
    RadioConfig::default().bandwidth_khz as u32
}

fn default_spreading_factor() -> u8 {
    RadioConfig::default().spreading_factor
}

fn default_coding_rate() -> u8 {
    RadioConfig::default().coding_rate
}

fn default_ack_interval() -> u32 {
    RadioConfig::default().ack_interval
}

fn default_download_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from(".local/share"))
        .join("lora-gateway")
        .join("downloads")
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            address: None,
            transport: TransportKind::default(),
            channel: default_channel(),
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            settle_delay_ms: default_settle_delay(),
            chunk_pacing_ms: default_chunk_pacing(),
            refresh_on_connect: false,
            response_timeout_secs: default_response_timeout(),
            download_timeout_secs: default_download_timeout(),
        }
    }
}

impl TransferConfig {
    /// Get response timeout as Duration
    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }

    /// Get download timeout as Duration
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    /// Connection manager settings
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            upload_settle_delay: Duration::from_millis(self.settle_delay_ms),
            chunk_pacing: Duration::from_millis(self.chunk_pacing_ms),
            refresh_on_connect: self.refresh_on_connect,
            ..ConnectionConfig::default()
        }
    }
}

impl Default for RadioDefaults {
    fn default() -> Self {
        Self {
            bandwidth_khz: default_bandwidth(),
            spreading_factor: default_spreading_factor(),
            coding_rate: default_coding_rate(),
            ack_interval: default_ack_interval(),
        }
    }
}

impl From<&RadioDefaults> for RadioConfig {
    fn from(radio: &RadioDefaults) -> Self {
        RadioConfig::new(
            radio.bandwidth_khz as f32,
            radio.spreading_factor,
            radio.coding_rate,
            radio.ack_interval,
        )
    }
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
        }
    }
}

impl Config {
    /// Default location of the configuration file
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("lora-gateway")
            .join("ctl.toml")
    }

    /// Load configuration from file, creating default if not found
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?;
            Ok(config)
        } else {
            // Create default config
            let config = Config::default();
            config.save(path)?;
            tracing::info!("Wrote default configuration to {}", path.display());
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Address of the configured gateway
    pub fn transport_address(&self) -> Result<TransportAddress> {
        let Some(address) = self.device.address.clone() else {
            bail!("No device address configured. Pass --address or set [device] address");
        };

        Ok(match self.device.transport {
            TransportKind::Rfcomm => TransportAddress::Rfcomm {
                address,
                channel: self.device.channel,
            },
            TransportKind::Ble => TransportAddress::Gatt { address },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.device.transport, TransportKind::Rfcomm);
        assert_eq!(config.device.channel, 1);
        assert_eq!(config.transfer.settle_delay_ms, 200);
        assert_eq!(config.transfer.chunk_pacing_ms, 50);
        assert!(!config.transfer.refresh_on_connect);
        assert_eq!(RadioConfig::from(&config.radio), RadioConfig::default());
        assert!(config.paths.download_dir.ends_with("lora-gateway/downloads"));
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.device.channel, config.device.channel);
        assert_eq!(parsed.radio.spreading_factor, config.radio.spreading_factor);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let parsed: Config = toml::from_str(
            r#"
            [device]
            address = "AA:BB:CC:DD:EE:FF"
            transport = "ble"

            [radio]
            spreading_factor = 12
            "#,
        )
        .unwrap();

        assert_eq!(parsed.device.transport, TransportKind::Ble);
        assert_eq!(parsed.radio.spreading_factor, 12);
        assert_eq!(parsed.radio.bandwidth_khz, 125);
        assert_eq!(parsed.transfer.response_timeout_secs, 10);
    }

    #[test]
    fn test_transport_address() {
        let mut config = Config::default();
        assert!(config.transport_address().is_err());

        config.device.address = Some("AA:BB:CC:DD:EE:FF".to_string());
        config.device.channel = 3;
        assert_eq!(
            config.transport_address().unwrap().to_string(),
            "rfcomm://AA:BB:CC:DD:EE:FF#3"
        );

        config.device.transport = TransportKind::Ble;
        assert_eq!(
            config.transport_address().unwrap().to_string(),
            "gatt://AA:BB:CC:DD:EE:FF"
        );
    }

    #[test]
    fn test_connection_config_conversion() {
        let mut transfer = TransferConfig::default();
        transfer.chunk_pacing_ms = 80;
        let connection = transfer.connection_config();
        assert_eq!(connection.chunk_pacing, Duration::from_millis(80));
        assert_eq!(connection.upload_settle_delay, Duration::from_millis(200));
        assert_eq!(connection.connect_timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ctl.toml");

        let config = Config::load(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.device.channel, 1);

        let mut changed = config.clone();
        changed.device.address = Some("11:22:33:44:55:66".to_string());
        changed.save(&path).unwrap();

        let reloaded = Config::load(&path).unwrap();
        assert_eq!(reloaded.device.address.as_deref(), Some("11:22:33:44:55:66"));
    }
}
