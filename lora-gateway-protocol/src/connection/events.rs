//! Connection Events
//!
//! Events emitted by the connection manager, delivered in order over the
//! channel returned by [`ConnectionManager::subscribe`](super::ConnectionManager::subscribe).

use crate::transport::TransportAddress;
use crate::{DeviceIdentity, FileDescriptor, RadioConfig};

/// Connection event types
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// The connection to a gateway has been established
    Connected {
        /// Name and classified mode of the device
        identity: DeviceIdentity,
        /// Remote address
        address: TransportAddress,
    },

    /// The established connection has ended
    Disconnected {
        /// Reason for disconnection (if known)
        reason: Option<String>,
    },

    /// A frame was decoded from the device
    DataFrame(DataFrame),

    /// An error occurred on the connection
    Error {
        /// Error message
        message: String,
    },
}

/// Classified payload delivered to the consumer
#[derive(Debug, Clone, PartialEq)]
pub enum DataFrame {
    /// A complete `[FILES_START]` … `[FILES_END]` listing
    FileList(Vec<FileDescriptor>),

    /// Radio configuration reported by the device
    Config(RadioConfig),

    /// The device started streaming a file
    DownloadStarted {
        /// Device-side name
        name: String,
        /// Announced size
        size: u64,
    },

    /// Raw bytes of the current download arrived
    DownloadProgress {
        /// Bytes collected so far
        received: u64,
        /// Announced size
        expected: u64,
    },

    /// A download was handed to the file sink
    DownloadComplete {
        /// Device-side name
        name: String,
        /// Size in bytes
        size: u64,
        /// Where the sink stored it
        location: String,
    },

    /// An upload chunk was written
    UploadProgress {
        /// Chunks written so far
        sent_chunks: u16,
        /// Chunks in the upload
        total_chunks: u16,
    },

    /// Any other line, verbatim
    Unclassified(String),
}
