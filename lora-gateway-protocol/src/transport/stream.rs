//! Transport over any async byte stream
//!
//! RFCOMM sockets are plain byte streams, so the Bluetooth transport wraps
//! them here. Tests use the same type over `tokio::io::duplex`.

use crate::transport::{Transport, TransportAddress, TransportCapabilities};
use crate::{ProtocolError, Result};
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Size of the receive buffer
const READ_BUFFER_SIZE: usize = 4096;

/// Capabilities of a reliable serial stream
pub const STREAM_CAPABILITIES: TransportCapabilities = TransportCapabilities {
    max_write_size: READ_BUFFER_SIZE,
    reliable: true,
    message_oriented: false,
};

/// [`Transport`] backed by an `AsyncRead + AsyncWrite` stream
pub struct StreamTransport<S> {
    stream: S,
    address: TransportAddress,
    name: Option<String>,
    capabilities: TransportCapabilities,
    connected: bool,
    read_buf: Vec<u8>,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap a connected stream
    pub fn new(stream: S, address: TransportAddress) -> Self {
        Self {
            stream,
            address,
            name: None,
            capabilities: STREAM_CAPABILITIES,
            connected: true,
            read_buf: vec![0u8; READ_BUFFER_SIZE],
        }
    }

    /// Set the advertised device name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Override the reported capabilities
    pub fn with_capabilities(mut self, capabilities: TransportCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }
}

impl<S> std::fmt::Debug for StreamTransport<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTransport")
            .field("address", &self.address.to_string())
            .field("name", &self.name)
            .field("connected", &self.connected)
            .finish()
    }
}

#[async_trait]
impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn capabilities(&self) -> TransportCapabilities {
        self.capabilities
    }

    fn remote_address(&self) -> TransportAddress {
        self.address.clone()
    }

    fn device_name(&self) -> Option<String> {
        self.name.clone()
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.connected {
            return Err(ProtocolError::ConnectionClosed(format!(
                "stream to {} already closed",
                self.address
            )));
        }

        let written = async {
            self.stream.write_all(data).await?;
            self.stream.flush().await
        }
        .await;

        if let Err(e) = written {
            self.connected = false;
            return Err(ProtocolError::from_io_error(
                e,
                &format!("writing to {}", self.address),
            ));
        }

        debug!("Wrote {} bytes to {}", data.len(), self.address);
        Ok(())
    }

    async fn receive(&mut self) -> Result<Vec<u8>> {
        let n = self.stream.read(&mut self.read_buf).await.map_err(|e| {
            ProtocolError::from_io_error(e, &format!("reading from {}", self.address))
        })?;

        if n == 0 {
            debug!("Stream from {} reached EOF", self.address);
            self.connected = false;
        }

        Ok(self.read_buf[..n].to_vec())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let mut this = self;
        debug!("Closing stream to {}", this.address);
        this.connected = false;
        this.stream
            .shutdown()
            .await
            .map_err(|e| ProtocolError::from_io_error(e, "closing stream"))
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
