//! Command Line and Logging
//!
//! Command-line interface of the controller and logging setup.

use crate::config::TransportKind;
use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

/// LoRa gateway controller command-line interface
#[derive(Parser, Debug)]
#[command(name = "lora-gateway-ctl")]
#[command(about = "Control a Bluetooth-attached LoRa gateway", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Set log level (error, warn, info, debug, trace)
    #[arg(short, long, value_name = "LEVEL", default_value = "warn", global = true)]
    pub log_level: String,

    /// Enable JSON structured logging
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Show timestamps in logs (`--timestamps false` to hide them)
    #[arg(long, action = ArgAction::Set, default_value_t = true, global = true)]
    pub timestamps: bool,

    /// Configuration file (defaults to <config_dir>/lora-gateway/ctl.toml)
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Bluetooth address of the gateway
    #[arg(short, long, value_name = "ADDR", global = true)]
    pub address: Option<String>,

    /// Link kind
    #[arg(short, long, value_enum, global = true)]
    pub transport: Option<TransportKind>,

    /// RFCOMM channel
    #[arg(long, global = true)]
    pub channel: Option<u8>,

    /// Directory for downloaded files
    #[arg(long, value_name = "DIR", global = true)]
    pub download_dir: Option<PathBuf>,

    /// Gateway operation
    #[command(subcommand)]
    pub command: GatewayCommand,
}

/// Operations on the gateway
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum GatewayCommand {
    /// Show the radio configuration
    GetConfig,

    /// Change the radio configuration
    ///
    /// Omitted values come from the [radio] section of the configuration file.
    SetConfig {
        /// Bandwidth in kHz (125, 250, 500)
        #[arg(long)]
        bw: Option<u32>,

        /// Spreading factor (7, 9, 12)
        #[arg(long)]
        sf: Option<u8>,

        /// Coding rate denominator (5, 7, 8)
        #[arg(long)]
        cr: Option<u8>,

        /// Packets per acknowledgment (3-15)
        #[arg(long)]
        ack: Option<u32>,
    },

    /// List files stored on the device
    List {
        /// Print the listing as JSON
        #[arg(long)]
        json: bool,
    },

    /// Download a file from the device
    Download {
        /// File name on the device
        name: String,
    },

    /// Upload a local file to the device
    Upload {
        /// Local file
        path: PathBuf,
    },

    /// Delete a file on the device
    Delete {
        /// File name on the device
        name: String,
    },

    /// Relay a file over the LoRa link (transmitter nodes)
    SendLora {
        /// File name on the device
        name: String,
    },

    /// Show device status
    Status,

    /// Send a free-form text command
    Raw {
        /// Command text; a newline is appended unless it ends with one
        text: String,
    },

    /// Print everything the device sends until interrupted
    Monitor,

    /// Show the effective configuration
    DumpConfig,

    /// Show version and build information
    Version,
}

impl GatewayCommand {
    /// Whether the command talks to the device
    pub fn needs_connection(&self) -> bool {
        !matches!(self, GatewayCommand::DumpConfig | GatewayCommand::Version)
    }
}

/// Initialize logging based on CLI configuration
pub fn init_logging(cli: &Cli) -> Result<()> {
    let log_level = cli.log_level.parse::<Level>().with_context(|| {
        format!(
            "Invalid log level '{}'. Valid levels: error, warn, info, debug, trace",
            cli.log_level
        )
    })?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level.as_str()))
        .context("Failed to create log filter")?;

    // Logs go to stderr so command output stays clean
    let subscriber = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false);

    match (cli.json_logs, cli.timestamps) {
        (true, true) => subscriber.json().init(),
        (true, false) => subscriber.without_time().json().init(),
        (false, true) => subscriber.init(),
        (false, false) => subscriber.without_time().init(),
    }

    info!(
        "Logging initialized: level={}, json={}, timestamps={}",
        log_level, cli.json_logs, cli.timestamps
    );

    Ok(())
}

/// Build information for diagnostics
pub struct BuildInfo {
    pub version: &'static str,
    pub git_hash: Option<&'static str>,
}

impl BuildInfo {
    /// Get build information
    pub fn get() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            git_hash: option_env!("GIT_HASH"),
        }
    }

    /// Display build information
    pub fn display(&self) {
        println!("lora-gateway-ctl v{}", self.version);
        if let Some(hash) = self.git_hash {
            println!("Git commit: {}", hash);
        }
        println!("Platform: {}", std::env::consts::OS);
        println!("Architecture: {}", std::env::consts::ARCH);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_set_config() {
        let cli = Cli::try_parse_from([
            "lora-gateway-ctl",
            "--address",
            "AA:BB:CC:DD:EE:FF",
            "set-config",
            "--sf",
            "12",
            "--ack",
            "10",
        ])
        .unwrap();

        assert_eq!(cli.address.as_deref(), Some("AA:BB:CC:DD:EE:FF"));
        assert_eq!(
            cli.command,
            GatewayCommand::SetConfig {
                bw: None,
                sf: Some(12),
                cr: None,
                ack: Some(10)
            }
        );
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "lora-gateway-ctl",
            "download",
            "/log.txt",
            "--transport",
            "ble",
            "--log-level",
            "debug",
        ])
        .unwrap();

        assert_eq!(cli.transport, Some(TransportKind::Ble));
        assert_eq!(cli.log_level, "debug");
        assert_eq!(
            cli.command,
            GatewayCommand::Download {
                name: "/log.txt".to_string()
            }
        );
    }

    #[test]
    fn test_timestamps_can_be_disabled() {
        let cli = Cli::try_parse_from(["lora-gateway-ctl", "status"]).unwrap();
        assert!(cli.timestamps);

        let cli =
            Cli::try_parse_from(["lora-gateway-ctl", "--timestamps", "false", "status"]).unwrap();
        assert!(!cli.timestamps);

        let cli = Cli::try_parse_from(["lora-gateway-ctl", "list", "--timestamps", "true"]).unwrap();
        assert!(cli.timestamps);
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["lora-gateway-ctl"]).is_err());
    }

    #[test]
    fn test_needs_connection() {
        assert!(GatewayCommand::Status.needs_connection());
        assert!(GatewayCommand::Monitor.needs_connection());
        assert!(!GatewayCommand::Version.needs_connection());
        assert!(!GatewayCommand::DumpConfig.needs_connection());
    }

    #[test]
    fn test_build_info() {
        let info = BuildInfo::get();
        assert_eq!(info.version, env!("CARGO_PKG_VERSION"));
    }
}
