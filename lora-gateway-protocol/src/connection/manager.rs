//! Connection Manager
//!
//! Owns the link to one gateway at a time: drives the connect attempt, runs
//! the session task that multiplexes outbound writes with inbound frames,
//! and turns decoded frames into [`ConnectionEvent`]s.
//!
//! Every session carries a generation number. Work bound to an older
//! generation (a late connect, a refresh, an upload worker) finds the number
//! changed and stops without touching the current session.

use super::events::{ConnectionEvent, DataFrame};
use crate::codec::{DecodedFrame, FrameDecoder, TextFrame};
use crate::transfer::{
    run_upload, ChunkWriter, FileListing, FileSink, UploadHandle, UploadPlan, UploadSignal,
    UploadTiming,
};
use crate::transport::{Transport, TransportAddress, TransportFactory};
use crate::{
    Command, DeviceIdentity, DeviceMode, FileDescriptor, ProtocolError, RadioConfig, Result,
};
use async_trait::async_trait;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Time allowed for the session task to close the transport
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No link and no attempt running
    #[default]
    Idle,
    /// A connect attempt is running
    Connecting,
    /// The session task owns an open transport
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Idle => write!(f, "idle"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

/// Connection manager configuration
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Bound on a single connect attempt
    pub connect_timeout: Duration,
    /// Wait between the upload announcement and the first chunk
    pub upload_settle_delay: Duration,
    /// Wait between upload chunks
    pub chunk_pacing: Duration,
    /// Send `GET_CONFIG` and `GET_FILES` after connecting
    pub refresh_on_connect: bool,
    /// Wait before the refresh
    pub refresh_delay: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        let timing = UploadTiming::default();
        Self {
            connect_timeout: Duration::from_secs(15),
            upload_settle_delay: timing.settle_delay,
            chunk_pacing: timing.chunk_pacing,
            refresh_on_connect: true,
            refresh_delay: Duration::from_millis(500),
        }
    }
}

impl ConnectionConfig {
    fn upload_timing(&self) -> UploadTiming {
        UploadTiming {
            settle_delay: self.upload_settle_delay,
            chunk_pacing: self.chunk_pacing,
        }
    }
}

/// Commands that can be sent to the session task
enum SessionCommand {
    /// Write bytes and report the outcome
    Write {
        bytes: Vec<u8>,
        done: oneshot::Sender<Result<()>>,
    },
    /// Close the transport
    Close,
}

/// Running session
struct ActiveSession {
    /// Channel to send commands to the session task
    command_tx: mpsc::UnboundedSender<SessionCommand>,
    /// Task handling this session
    task: JoinHandle<()>,
}

/// Resources taken out of the shared state when a session ends
struct Teardown {
    was_connected: bool,
    attempt: Option<JoinHandle<()>>,
    session: Option<ActiveSession>,
}

#[derive(Default)]
struct SharedState {
    state: ConnectionState,
    generation: u64,
    address: Option<TransportAddress>,
    identity: Option<DeviceIdentity>,
    last_config: Option<RadioConfig>,
    files: Vec<FileDescriptor>,
    attempt: Option<JoinHandle<()>>,
    session: Option<ActiveSession>,
    upload: Option<Arc<UploadSignal>>,
}

impl SharedState {
    /// Return to `Idle`, invalidating everything bound to the old generation
    fn end_session(&mut self) -> Teardown {
        let teardown = Teardown {
            was_connected: self.state == ConnectionState::Connected,
            attempt: self.attempt.take(),
            session: self.session.take(),
        };
        self.generation += 1;
        self.state = ConnectionState::Idle;
        self.address = None;
        self.identity = None;
        self.last_config = None;
        self.files.clear();
        if let Some(upload) = self.upload.take() {
            upload.interrupt();
        }
        teardown
    }
}

/// Connection manager for a single gateway
#[derive(Clone)]
pub struct ConnectionManager {
    /// Opens transports
    factory: Arc<dyn TransportFactory>,

    /// Receives finished downloads
    sink: Arc<dyn FileSink>,

    /// Configuration
    config: ConnectionConfig,

    /// State shared with the session and worker tasks
    shared: Arc<RwLock<SharedState>>,

    /// One sender per subscriber
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<ConnectionEvent>>>>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("factory", &self.factory)
            .field("sink", &self.sink)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Create a new connection manager
    pub fn new(
        factory: Arc<dyn TransportFactory>,
        sink: Arc<dyn FileSink>,
        config: ConnectionConfig,
    ) -> Self {
        Self {
            factory,
            sink,
            config,
            shared: Arc::new(RwLock::new(SharedState::default())),
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Get event receiver for connection events
    ///
    /// Every subscriber receives every event emitted after it subscribed.
    /// Dropping the receiver unsubscribes.
    pub async fn subscribe(&self) -> mpsc::UnboundedReceiver<ConnectionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        match self.subscribers.lock() {
            Ok(mut subscribers) => subscribers.push(tx),
            Err(poisoned) => poisoned.into_inner().push(tx),
        }
        rx
    }

    /// Configuration this manager was built with
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Current connection state
    pub async fn state(&self) -> ConnectionState {
        self.shared.read().await.state
    }

    /// Whether a session is established
    pub async fn is_connected(&self) -> bool {
        self.state().await == ConnectionState::Connected
    }

    /// Identity of the connected device
    pub async fn identity(&self) -> Option<DeviceIdentity> {
        self.shared.read().await.identity.clone()
    }

    /// Address of the current or pending connection
    pub async fn remote_address(&self) -> Option<TransportAddress> {
        self.shared.read().await.address.clone()
    }

    /// Last radio configuration reported by or sent to the device
    pub async fn last_config(&self) -> Option<RadioConfig> {
        self.shared.read().await.last_config
    }

    /// Files from the last completed listing
    pub async fn files(&self) -> Vec<FileDescriptor> {
        self.shared.read().await.files.clone()
    }

    /// Connect to a gateway
    ///
    /// Any existing session or attempt is torn down first. Resolves once the
    /// attempt succeeds or fails; an attempt superseded by another `connect`
    /// or by [`disconnect`](Self::disconnect) resolves to `Cancelled`.
    pub async fn connect(&self, address: TransportAddress) -> Result<()> {
        let (generation, previous) = {
            let mut shared = self.shared.write().await;
            let previous = shared.end_session();
            shared.state = ConnectionState::Connecting;
            shared.address = Some(address.clone());
            (shared.generation, previous)
        };
        self.finish_teardown(previous, "superseded by a new connection")
            .await;

        info!("Connecting to {}", address);

        let (done_tx, done_rx) = oneshot::channel();
        {
            let mut shared = self.shared.write().await;
            if shared.generation != generation {
                return Err(ProtocolError::Cancelled(format!(
                    "connection attempt to {} superseded",
                    address
                )));
            }

            let manager = self.clone();
            let target = address.clone();
            shared.attempt = Some(tokio::spawn(async move {
                let result = manager.establish(generation, target).await;
                let _ = done_tx.send(result);
            }));
        }

        done_rx.await.unwrap_or_else(|_| {
            Err(ProtocolError::Cancelled(format!(
                "connection attempt to {} superseded",
                address
            )))
        })
    }

    /// Disconnect from the gateway
    ///
    /// Does nothing when already idle.
    pub async fn disconnect(&self) -> Result<()> {
        let teardown = {
            let mut shared = self.shared.write().await;
            if shared.state == ConnectionState::Idle {
                debug!("Disconnect requested while idle");
                return Ok(());
            }
            if let Some(address) = &shared.address {
                info!("Disconnecting from {}", address);
            }
            shared.end_session()
        };

        self.finish_teardown(teardown, "disconnect requested").await;
        Ok(())
    }

    /// Write raw bytes to the connected device
    ///
    /// # Errors
    ///
    /// `NotConnected` without writing anything unless a session is
    /// established; transport errors otherwise.
    pub async fn send(&self, bytes: &[u8]) -> Result<()> {
        self.write_bound(None, bytes.to_vec()).await
    }

    /// Encode and send a command
    pub async fn send_command(&self, command: &Command) -> Result<()> {
        if let Command::SetConfig(config) = command {
            config.validate()?;
        }
        debug!("Sending {}", command);
        self.send(&command.encode()).await
    }

    /// Send a free-form text command
    ///
    /// A newline is appended unless `text` already ends with one.
    pub async fn send_custom_command(&self, text: &str) -> Result<()> {
        let mut bytes = text.as_bytes().to_vec();
        if !text.ends_with('\n') {
            bytes.push(b'\n');
        }
        self.send(&bytes).await
    }

    /// Send bytes exactly as given
    pub async fn send_raw_bytes(&self, bytes: &[u8]) -> Result<()> {
        self.send(bytes).await
    }

    /// Ask for the radio configuration
    pub async fn get_config(&self) -> Result<()> {
        self.send_command(&Command::GetConfig).await
    }

    /// Apply a radio configuration
    ///
    /// The configuration is validated before anything is sent and recorded
    /// as the last known configuration once written.
    pub async fn set_config(&self, config: RadioConfig) -> Result<()> {
        self.send_command(&Command::SetConfig(config)).await?;
        self.shared.write().await.last_config = Some(config);
        info!("Applied radio configuration {}", config);
        Ok(())
    }

    /// Ask for the file listing
    pub async fn list_files(&self) -> Result<()> {
        self.send_command(&Command::ListFiles).await
    }

    /// Ask the device to stream a file
    pub async fn download_file(&self, name: &str) -> Result<()> {
        self.send_command(&Command::DownloadFile(name.to_string()))
            .await
    }

    /// Delete a file on the device
    pub async fn delete_file(&self, name: &str) -> Result<()> {
        self.send_command(&Command::DeleteFile(name.to_string()))
            .await
    }

    /// Ask the device to send a file over the radio link
    ///
    /// Only transmitter nodes do this; other devices get the command anyway.
    pub async fn send_via_radio(&self, name: &str) -> Result<()> {
        if let Some(identity) = self.identity().await {
            if identity.mode != DeviceMode::Transmitter {
                warn!(
                    "{} is not a transmitter, sending {} anyway",
                    identity, name
                );
            }
        }
        self.send_command(&Command::SendViaRadio(name.to_string()))
            .await
    }

    /// Ask for the device status
    pub async fn get_status(&self) -> Result<()> {
        self.send_command(&Command::GetStatus).await
    }

    /// Upload `data` as `name`
    ///
    /// Returns once the worker is running; use the handle to follow or
    /// cancel it. Only one upload runs per connection.
    pub async fn upload(&self, data: Vec<u8>, name: impl Into<String>) -> Result<UploadHandle> {
        let plan = UploadPlan::new(name, data)?;
        let signal = Arc::new(UploadSignal::new());

        let generation = {
            let mut shared = self.shared.write().await;
            if shared.state != ConnectionState::Connected {
                warn!("Not connected, refusing upload of {}", plan.name());
                return Err(ProtocolError::NotConnected);
            }
            if shared.upload.is_some() {
                return Err(ProtocolError::TransferInProgress(format!(
                    "cannot start upload of {}",
                    plan.name()
                )));
            }
            shared.upload = Some(signal.clone());
            shared.generation
        };

        let name = plan.name().to_string();
        let total_chunks = plan.total_chunks();
        let writer = SessionWriter {
            manager: self.clone(),
            generation,
        };
        let timing = self.config.upload_timing();
        let manager = self.clone();
        let worker_signal = signal.clone();

        let task = tokio::spawn(async move {
            let result = run_upload(&plan, &writer, &worker_signal, timing).await;
            manager.release_upload(&worker_signal).await;
            match &result {
                Ok(report) => info!("Upload of {} finished: {} chunks", report.name, report.chunks),
                Err(ProtocolError::Cancelled(reason)) => info!("Upload cancelled: {}", reason),
                Err(e) => {
                    warn!("Upload of {} failed: {}", plan.name(), e);
                    manager.emit(ConnectionEvent::Error {
                        message: format!("upload of {} failed: {}", plan.name(), e),
                    });
                }
            }
            result
        });

        Ok(UploadHandle::new(name, total_chunks, signal, task))
    }

    /// Upload a local file under its own name
    pub async fn upload_file(&self, path: impl AsRef<Path>) -> Result<UploadHandle> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                ProtocolError::InvalidConfig(format!("{} has no file name", path.display()))
            })?;
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| ProtocolError::from_io_error(e, &format!("reading {}", path.display())))?;
        self.upload(data, name).await
    }

    fn emit(&self, event: ConnectionEvent) {
        let mut subscribers = match self.subscribers.lock() {
            Ok(subscribers) => subscribers,
            Err(poisoned) => poisoned.into_inner(),
        };
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Queue a write on the session task
    ///
    /// With `generation` set the write only goes to that session and fails
    /// with `ConnectionClosed` once it has ended.
    async fn write_bound(&self, generation: Option<u64>, bytes: Vec<u8>) -> Result<()> {
        let command_tx = {
            let shared = self.shared.read().await;
            let current = generation.map_or(true, |g| g == shared.generation);
            match &shared.session {
                Some(session) if current && shared.state == ConnectionState::Connected => {
                    session.command_tx.clone()
                }
                _ if generation.is_some() => {
                    return Err(ProtocolError::ConnectionClosed(
                        "session ended".to_string(),
                    ));
                }
                _ => {
                    warn!("Not connected, dropping {} byte write", bytes.len());
                    return Err(ProtocolError::NotConnected);
                }
            }
        };

        let (done_tx, done_rx) = oneshot::channel();
        command_tx
            .send(SessionCommand::Write {
                bytes,
                done: done_tx,
            })
            .map_err(|_| ProtocolError::ConnectionClosed("session ended".to_string()))?;

        done_rx.await.map_err(|_| {
            ProtocolError::ConnectionClosed("session ended before the write completed".to_string())
        })?
    }

    async fn release_upload(&self, signal: &Arc<UploadSignal>) {
        let mut shared = self.shared.write().await;
        if shared
            .upload
            .as_ref()
            .is_some_and(|active| Arc::ptr_eq(active, signal))
        {
            shared.upload = None;
        }
    }

    async fn finish_teardown(&self, teardown: Teardown, reason: &str) {
        if let Some(attempt) = teardown.attempt {
            attempt.abort();
        }

        if let Some(session) = teardown.session {
            let _ = session.command_tx.send(SessionCommand::Close);
            let mut task = session.task;
            if tokio::time::timeout(CLOSE_TIMEOUT, &mut task).await.is_err() {
                warn!("Session task did not stop in time, aborting it");
                task.abort();
            }
        }

        if teardown.was_connected {
            info!("Disconnected: {}", reason);
            self.emit(ConnectionEvent::Disconnected {
                reason: Some(reason.to_string()),
            });
        }
    }

    /// Body of a connect attempt
    async fn establish(&self, generation: u64, address: TransportAddress) -> Result<()> {
        let connected =
            tokio::time::timeout(self.config.connect_timeout, self.factory.connect(address.clone()))
                .await;

        let transport = match connected {
            Ok(Ok(transport)) => transport,
            Ok(Err(e)) => return self.fail_attempt(generation, &address, e).await,
            Err(_) => {
                let e = ProtocolError::Timeout(format!(
                    "connecting to {} took longer than {:?}",
                    address, self.config.connect_timeout
                ));
                return self.fail_attempt(generation, &address, e).await;
            }
        };

        let name = transport
            .device_name()
            .unwrap_or_else(|| address.device_address().to_string());
        let identity = DeviceIdentity::from_name(name);
        debug!(
            "Transport to {} capabilities: {:?}",
            address,
            transport.capabilities()
        );

        let mut shared = self.shared.write().await;
        if shared.generation != generation {
            drop(shared);
            debug!("Dropping stale connection to {}", address);
            if let Err(e) = transport.close().await {
                debug!("Error closing stale transport: {}", e);
            }
            return Err(ProtocolError::Cancelled(format!(
                "connection attempt to {} superseded",
                address
            )));
        }

        info!("Connected to {} at {} (mode: {})", identity, address, identity.mode);
        self.emit(ConnectionEvent::Connected {
            identity: identity.clone(),
            address,
        });

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.clone().run_session(generation, transport, command_rx));
        shared.session = Some(ActiveSession { command_tx, task });
        shared.state = ConnectionState::Connected;
        shared.identity = Some(identity);
        shared.attempt = None;
        drop(shared);

        if self.config.refresh_on_connect {
            self.spawn_refresh(generation);
        }
        Ok(())
    }

    async fn fail_attempt(
        &self,
        generation: u64,
        address: &TransportAddress,
        error: ProtocolError,
    ) -> Result<()> {
        let mut shared = self.shared.write().await;
        if shared.generation == generation {
            shared.state = ConnectionState::Idle;
            shared.address = None;
            shared.attempt = None;
            error!("Connection to {} failed: {}", address, error);
            self.emit(ConnectionEvent::Error {
                message: error.user_message(),
            });
        }
        Err(error)
    }

    fn spawn_refresh(&self, generation: u64) {
        let manager = self.clone();
        let delay = self.config.refresh_delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            for command in [Command::GetConfig, Command::ListFiles] {
                debug!("Refreshing after connect: {}", command);
                if let Err(e) = manager.write_bound(Some(generation), command.encode()).await {
                    debug!("Skipping refresh: {}", e);
                    return;
                }
            }
        });
    }

    /// Session task: owns the transport until closed
    async fn run_session(
        self,
        generation: u64,
        mut transport: Box<dyn Transport>,
        mut command_rx: mpsc::UnboundedReceiver<SessionCommand>,
    ) {
        let address = transport.remote_address();
        let mut decoder = FrameDecoder::new();
        let mut listing = FileListing::new();

        info!("Session handler started for {}", address);

        let failure = loop {
            tokio::select! {
                command = command_rx.recv() => match command {
                    Some(SessionCommand::Write { bytes, done }) => {
                        let result = transport.send(&bytes).await;
                        let failed = result.as_ref().err().map(|e| e.to_string());
                        let _ = done.send(result);
                        if let Some(reason) = failed {
                            error!("Write to {} failed: {}", address, reason);
                            break Some(reason);
                        }
                    }
                    Some(SessionCommand::Close) | None => {
                        info!("Closing connection to {}", address);
                        break None;
                    }
                },
                received = transport.receive() => match received {
                    Ok(bytes) if bytes.is_empty() => {
                        warn!("{} closed the connection", address);
                        break Some("remote closed the connection".to_string());
                    }
                    Ok(bytes) => {
                        debug!("Received {} bytes from {}", bytes.len(), address);
                        for frame in decoder.feed(&bytes) {
                            self.dispatch(generation, frame, &mut listing).await;
                        }
                    }
                    Err(e) => {
                        error!("Read from {} failed: {}", address, e);
                        break Some(e.to_string());
                    }
                },
            }
        };

        if let Some(name) = decoder.discard() {
            warn!("Discarding incomplete download of {}", name);
            self.emit(ConnectionEvent::Error {
                message: format!("download of {} discarded: connection closed", name),
            });
        }

        if let Err(e) = transport.close().await {
            debug!("Error closing transport to {}: {}", address, e);
        }

        if let Some(reason) = failure {
            self.on_transport_closed(generation, reason).await;
        }

        info!("Session handler for {} stopped", address);
    }

    /// The transport failed or the device hung up
    async fn on_transport_closed(&self, generation: u64, reason: String) {
        let teardown = {
            let mut shared = self.shared.write().await;
            if shared.generation != generation || shared.state == ConnectionState::Idle {
                return;
            }
            shared.end_session()
        };

        // The session handle is this task's own; dropping it detaches.
        drop(teardown.session);

        error!("Unexpected disconnect: {}", reason);
        self.emit(ConnectionEvent::Error {
            message: "unexpected disconnect".to_string(),
        });
        if teardown.was_connected {
            self.emit(ConnectionEvent::Disconnected {
                reason: Some(reason),
            });
        }
    }

    /// Apply a decoded frame to the session and notify the consumer
    async fn dispatch(&self, generation: u64, frame: DecodedFrame, listing: &mut FileListing) {
        match frame {
            DecodedFrame::Text(TextFrame::FilesStart) => listing.begin(),
            DecodedFrame::Text(TextFrame::FileEntry(entry)) => {
                listing.push(entry);
            }
            DecodedFrame::Text(TextFrame::FilesEnd) => {
                let files = listing.finish();
                info!("Device lists {} files", files.len());
                self.with_current(generation, |shared| shared.files = files.clone())
                    .await;
                self.emit(ConnectionEvent::DataFrame(DataFrame::FileList(files)));
            }
            DecodedFrame::Text(TextFrame::Config(config)) => {
                if !config.is_valid() {
                    warn!("Device reports unsupported radio configuration {}", config);
                }
                self.with_current(generation, |shared| shared.last_config = Some(config))
                    .await;
                self.emit(ConnectionEvent::DataFrame(DataFrame::Config(config)));
            }
            DecodedFrame::Text(TextFrame::Malformed { line, reason }) => {
                warn!("Skipping malformed frame {:?}: {}", line, reason);
            }
            DecodedFrame::Text(TextFrame::Unclassified(line)) => {
                self.emit(ConnectionEvent::DataFrame(DataFrame::Unclassified(line)));
            }
            DecodedFrame::Text(frame @ (TextFrame::FileStart { .. } | TextFrame::FileEnd)) => {
                debug!("Ignoring transfer marker outside the decoder: {:?}", frame);
            }
            DecodedFrame::DownloadStarted { name, expected } => {
                info!("Receiving {} ({} bytes)", name, expected);
                self.emit(ConnectionEvent::DataFrame(DataFrame::DownloadStarted {
                    name,
                    size: expected,
                }));
            }
            DecodedFrame::DownloadProgress { received, expected } => {
                self.emit(ConnectionEvent::DataFrame(DataFrame::DownloadProgress {
                    received,
                    expected,
                }));
            }
            DecodedFrame::DownloadFinished { name, data } => {
                let size = data.len() as u64;
                match self.sink.store(&name, data).await {
                    Ok(location) => {
                        info!("Stored {} ({} bytes) at {}", name, size, location);
                        self.emit(ConnectionEvent::DataFrame(DataFrame::DownloadComplete {
                            name,
                            size,
                            location,
                        }));
                    }
                    Err(e) => {
                        error!("Failed to store {}: {}", name, e);
                        self.emit(ConnectionEvent::Error {
                            message: format!("storing {} failed: {}", name, e),
                        });
                    }
                }
            }
            DecodedFrame::DownloadAborted { name, reason } => {
                warn!("Download of {} aborted: {}", name, reason);
                self.emit(ConnectionEvent::Error {
                    message: format!("download of {} aborted: {}", name, reason),
                });
            }
        }
    }

    async fn with_current(&self, generation: u64, update: impl FnOnce(&mut SharedState)) {
        let mut shared = self.shared.write().await;
        if shared.generation == generation {
            update(&mut shared);
        }
    }
}

/// Upload frames routed through one session
struct SessionWriter {
    manager: ConnectionManager,
    generation: u64,
}

#[async_trait]
impl ChunkWriter for SessionWriter {
    async fn write(&self, frame: Vec<u8>) -> Result<()> {
        self.manager
            .write_bound(Some(self.generation), frame)
            .await
    }

    fn progress(&self, sent: u16, total: u16) {
        self.manager
            .emit(ConnectionEvent::DataFrame(DataFrame::UploadProgress {
                sent_chunks: sent,
                total_chunks: total,
            }));
    }
}
