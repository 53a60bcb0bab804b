mod config;
mod diagnostics;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use config::{Config, TransportKind};
use diagnostics::{BuildInfo, Cli, GatewayCommand};
use lora_gateway_protocol::{
    ConnectionEvent, ConnectionManager, DataFrame, DirectorySink, GattTransportFactory,
    RadioConfig, RfcommTransportFactory, TransportFactory,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

/// Time to collect free-form replies after a fire-and-forget command
const REPLY_WINDOW: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let cli = Cli::parse();

    if cli.command == GatewayCommand::Version {
        BuildInfo::get().display();
        return Ok(());
    }

    diagnostics::init_logging(&cli).context("Failed to initialize logging")?;

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load(&config_path).context("Failed to load configuration")?;
    apply_overrides(&mut config, &cli);
    debug!("Configuration loaded from {}", config_path.display());

    if !cli.command.needs_connection() {
        let contents = toml::to_string_pretty(&config).context("Failed to serialize config")?;
        println!("# {}", config_path.display());
        print!("{}", contents);
        return Ok(());
    }

    let address = config.transport_address()?;
    let connect_timeout = Duration::from_secs(config.transfer.connect_timeout_secs);
    let factory: Arc<dyn TransportFactory> = match config.device.transport {
        TransportKind::Rfcomm => {
            Arc::new(RfcommTransportFactory::new().with_timeout(connect_timeout))
        }
        TransportKind::Ble => Arc::new(GattTransportFactory::new().with_timeout(connect_timeout)),
    };
    let sink = Arc::new(DirectorySink::new(config.paths.download_dir.clone()));

    let mut connection_config = config.transfer.connection_config();
    if cli.command == GatewayCommand::Monitor {
        connection_config.refresh_on_connect = true;
    }

    let manager = ConnectionManager::new(factory, sink, connection_config);
    let mut events = manager.subscribe().await;

    info!("Connecting to {}", address);
    manager
        .connect(address.clone())
        .await
        .with_context(|| format!("Failed to connect to {}", address))?;

    if let Some(identity) = manager.identity().await {
        eprintln!("Connected to {} ({})", identity, address);
    }

    let outcome = run_command(&manager, &mut events, &config, &cli.command).await;

    if let Err(e) = manager.disconnect().await {
        warn!("Error while disconnecting: {}", e);
    }

    outcome
}

/// Fold command-line overrides into the loaded configuration
fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(address) = &cli.address {
        config.device.address = Some(address.clone());
    }
    if let Some(transport) = cli.transport {
        config.device.transport = transport;
    }
    if let Some(channel) = cli.channel {
        config.device.channel = channel;
    }
    if let Some(dir) = &cli.download_dir {
        config.paths.download_dir = dir.clone();
    }
}

/// Radio configuration from `set-config` flags over the configured defaults
fn radio_from_flags(
    config: &Config,
    bw: Option<u32>,
    sf: Option<u8>,
    cr: Option<u8>,
    ack: Option<u32>,
) -> RadioConfig {
    let base = RadioConfig::from(&config.radio);
    RadioConfig::new(
        bw.map(|bw| bw as f32).unwrap_or(base.bandwidth_khz),
        sf.unwrap_or(base.spreading_factor),
        cr.unwrap_or(base.coding_rate),
        ack.unwrap_or(base.ack_interval),
    )
}

async fn run_command(
    manager: &ConnectionManager,
    events: &mut UnboundedReceiver<ConnectionEvent>,
    config: &Config,
    command: &GatewayCommand,
) -> Result<()> {
    let response_timeout = config.transfer.response_timeout();

    match command {
        GatewayCommand::GetConfig => {
            manager.get_config().await?;
            let radio = wait_for(events, response_timeout, |event| match event {
                ConnectionEvent::DataFrame(DataFrame::Config(radio)) => Some(*radio),
                _ => None,
            })
            .await?;
            println!("{}", radio);
        }

        GatewayCommand::SetConfig { bw, sf, cr, ack } => {
            let radio = radio_from_flags(config, *bw, *sf, *cr, *ack);
            manager
                .set_config(radio)
                .await
                .with_context(|| format!("Failed to apply {}", radio))?;
            println!("Applied {}", radio);
        }

        GatewayCommand::List { json } => {
            manager.list_files().await?;
            let files = wait_for(events, response_timeout, |event| match event {
                ConnectionEvent::DataFrame(DataFrame::FileList(files)) => Some(files.clone()),
                _ => None,
            })
            .await?;

            if *json {
                println!("{}", serde_json::to_string_pretty(&files)?);
            } else if files.is_empty() {
                println!("No files on device");
            } else {
                for file in &files {
                    println!("{:<40} {:>12}", file.display_name(), file.formatted_size());
                }
            }
        }

        GatewayCommand::Download { name } => {
            manager.download_file(name).await?;
            let download_timeout = config.transfer.download_timeout();
            let (size, location) = wait_for(events, download_timeout, |event| match event {
                ConnectionEvent::DataFrame(DataFrame::DownloadStarted { name, size }) => {
                    eprintln!("Receiving {} ({} bytes)", name, size);
                    None
                }
                ConnectionEvent::DataFrame(DataFrame::DownloadComplete {
                    size, location, ..
                }) => Some((*size, location.clone())),
                _ => None,
            })
            .await?;
            println!("Saved {} bytes to {}", size, location);
        }

        GatewayCommand::Upload { path } => {
            let handle = manager
                .upload_file(path)
                .await
                .with_context(|| format!("Failed to start upload of {}", path.display()))?;
            let total = handle.total_chunks();
            eprintln!("Uploading {} ({} chunks)", handle.name(), total);

            let wait = handle.wait();
            tokio::pin!(wait);
            let report = loop {
                tokio::select! {
                    report = &mut wait => break report,
                    Some(event) = events.recv() => {
                        if let ConnectionEvent::DataFrame(DataFrame::UploadProgress {
                            sent_chunks,
                            total_chunks,
                        }) = event
                        {
                            eprintln!("  chunk {}/{}", sent_chunks, total_chunks);
                        }
                    }
                }
            };

            let report = report.context("Upload failed")?;
            println!(
                "Sent {} ({} bytes in {} chunks)",
                report.name, report.bytes, report.chunks
            );
        }

        GatewayCommand::Delete { name } => {
            manager.delete_file(name).await?;
            print_replies(events, REPLY_WINDOW).await?;
        }

        GatewayCommand::SendLora { name } => {
            manager.send_via_radio(name).await?;
            print_replies(events, REPLY_WINDOW).await?;
        }

        GatewayCommand::Status => {
            manager.get_status().await?;
            print_replies(events, REPLY_WINDOW).await?;
        }

        GatewayCommand::Raw { text } => {
            manager.send_custom_command(text).await?;
            print_replies(events, REPLY_WINDOW).await?;
        }

        GatewayCommand::Monitor => monitor(events).await?,

        GatewayCommand::DumpConfig | GatewayCommand::Version => {}
    }

    Ok(())
}

/// Wait until `select` picks an event
///
/// Errors and disconnects end the wait early.
async fn wait_for<T>(
    events: &mut UnboundedReceiver<ConnectionEvent>,
    timeout: Duration,
    mut select: impl FnMut(&ConnectionEvent) -> Option<T>,
) -> Result<T> {
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        let event = tokio::time::timeout_at(deadline, events.recv())
            .await
            .map_err(|_| anyhow!("No answer from device within {:?}", timeout))?
            .ok_or_else(|| anyhow!("Event channel closed"))?;

        if let Some(value) = select(&event) {
            return Ok(value);
        }

        match event {
            ConnectionEvent::Error { message } => bail!("Device error: {}", message),
            ConnectionEvent::Disconnected { reason } => bail!(
                "Disconnected: {}",
                reason.unwrap_or_else(|| "unknown reason".to_string())
            ),
            other => debug!("Ignoring {:?}", other),
        }
    }
}

/// Print free-form replies that arrive within `window`
async fn print_replies(
    events: &mut UnboundedReceiver<ConnectionEvent>,
    window: Duration,
) -> Result<()> {
    let deadline = tokio::time::Instant::now() + window;

    while let Ok(Some(event)) = tokio::time::timeout_at(deadline, events.recv()).await {
        match event {
            ConnectionEvent::DataFrame(DataFrame::Unclassified(line)) => println!("{}", line),
            ConnectionEvent::Error { message } => bail!("Device error: {}", message),
            ConnectionEvent::Disconnected { reason } => bail!(
                "Disconnected: {}",
                reason.unwrap_or_else(|| "unknown reason".to_string())
            ),
            other => debug!("Ignoring {:?}", other),
        }
    }

    Ok(())
}

/// Print every event until Ctrl-C or disconnect
async fn monitor(events: &mut UnboundedReceiver<ConnectionEvent>) -> Result<()> {
    eprintln!("Monitoring, press Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                return Ok(());
            }
            event = events.recv() => match event {
                Some(event) => {
                    let keep_going = !matches!(event, ConnectionEvent::Disconnected { .. });
                    println!("{}", describe(&event));
                    if !keep_going {
                        return Ok(());
                    }
                }
                None => return Ok(()),
            },
        }
    }
}

/// One-line rendering of an event
fn describe(event: &ConnectionEvent) -> String {
    match event {
        ConnectionEvent::Connected { identity, address } => {
            format!("connected: {} at {}", identity, address)
        }
        ConnectionEvent::Disconnected { reason } => format!(
            "disconnected: {}",
            reason.as_deref().unwrap_or("unknown reason")
        ),
        ConnectionEvent::Error { message } => format!("error: {}", message),
        ConnectionEvent::DataFrame(frame) => match frame {
            DataFrame::FileList(files) => {
                let names: Vec<_> = files.iter().map(|f| f.to_string()).collect();
                format!("files: {}", names.join(", "))
            }
            DataFrame::Config(radio) => format!("config: {}", radio),
            DataFrame::DownloadStarted { name, size } => {
                format!("download started: {} ({} bytes)", name, size)
            }
            DataFrame::DownloadProgress { received, expected } => {
                format!("download: {}/{} bytes", received, expected)
            }
            DataFrame::DownloadComplete {
                name,
                size,
                location,
            } => format!("download complete: {} ({} bytes) -> {}", name, size, location),
            DataFrame::UploadProgress {
                sent_chunks,
                total_chunks,
            } => format!("upload: chunk {}/{}", sent_chunks, total_chunks),
            DataFrame::Unclassified(line) => format!("> {}", line),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lora_gateway_protocol::FileDescriptor;
    use tokio::sync::mpsc;

    #[test]
    fn test_radio_from_flags_fills_from_config() {
        let mut config = Config::default();
        config.radio.spreading_factor = 12;

        let radio = radio_from_flags(&config, Some(500), None, Some(5), None);
        assert_eq!(radio, RadioConfig::new(500.0, 12, 5, 5));
    }

    #[test]
    fn test_apply_overrides() {
        let cli = Cli::try_parse_from([
            "lora-gateway-ctl",
            "--address",
            "AA:BB:CC:DD:EE:FF",
            "--transport",
            "ble",
            "--download-dir",
            "/tmp/dl",
            "status",
        ])
        .unwrap();

        let mut config = Config::default();
        apply_overrides(&mut config, &cli);
        assert_eq!(config.device.address.as_deref(), Some("AA:BB:CC:DD:EE:FF"));
        assert_eq!(config.device.transport, TransportKind::Ble);
        assert_eq!(config.paths.download_dir, std::path::PathBuf::from("/tmp/dl"));
    }

    #[test]
    fn test_describe() {
        let event = ConnectionEvent::DataFrame(DataFrame::FileList(vec![
            FileDescriptor::new("/a.txt", 10),
            FileDescriptor::new("b.bin", 2048),
        ]));
        assert_eq!(describe(&event), "files: a.txt (10 B), b.bin (2.00 KB)");
    }

    #[tokio::test]
    async fn test_wait_for_skips_unrelated_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(ConnectionEvent::DataFrame(DataFrame::Unclassified("hi".to_string())))
            .unwrap();
        tx.send(ConnectionEvent::DataFrame(DataFrame::Config(RadioConfig::default())))
            .unwrap();

        let radio = wait_for(&mut rx, Duration::from_secs(1), |event| match event {
            ConnectionEvent::DataFrame(DataFrame::Config(radio)) => Some(*radio),
            _ => None,
        })
        .await
        .unwrap();
        assert_eq!(radio, RadioConfig::default());
    }

    #[tokio::test]
    async fn test_wait_for_stops_on_error() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(ConnectionEvent::Error {
            message: "unexpected disconnect".to_string(),
        })
        .unwrap();

        let result = wait_for(&mut rx, Duration::from_secs(1), |_| None::<()>).await;
        assert!(result.unwrap_err().to_string().contains("unexpected disconnect"));
    }

    #[tokio::test]
    async fn test_wait_for_times_out() {
        let (_tx, mut rx) = mpsc::unbounded_channel::<ConnectionEvent>();
        let result = wait_for(&mut rx, Duration::from_millis(10), |_| None::<()>).await;
        assert!(result.is_err());
    }
}
