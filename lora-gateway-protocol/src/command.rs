//! Outbound command encoding
//!
//! Every text command is ASCII and newline-terminated. Upload chunks are the
//! only binary frames and carry a 5-byte [`ChunkHeader`].
//!
//! ```rust
//! use lora_gateway_protocol::Command;
//!
//! assert_eq!(Command::GetConfig.encode(), b"GET_CONFIG\n");
//! assert_eq!(
//!     Command::DownloadFile("report.bin".into()).encode(),
//!     b"DOWNLOAD_FILE:/report.bin\n"
//! );
//! ```

use crate::RadioConfig;
use std::fmt;

/// Maximum payload bytes per upload chunk
pub const CHUNK_SIZE: usize = 512;

/// First byte of every chunk header
pub const CHUNK_MARKER: u8 = b'C';

/// Length of an encoded [`ChunkHeader`]
pub const CHUNK_HEADER_LEN: usize = 5;

/// Typed request for the gateway
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Ask for the current radio configuration
    GetConfig,
    /// Replace the radio configuration; the caller validates first
    SetConfig(RadioConfig),
    /// Ask for a bracketed file listing
    ListFiles,
    /// Ask the device to stream a file back
    DownloadFile(String),
    /// Remove a file on the device
    DeleteFile(String),
    /// Relay a file over the LoRa link
    SendViaRadio(String),
    /// Ask for device status
    GetStatus,
    /// Announce an upload; chunks follow after a settle delay
    UploadMetadata {
        /// File name as stored on the device
        name: String,
        /// Total file size in bytes
        size: u64,
    },
}

impl Command {
    /// Exact bytes written to the transport
    pub fn encode(&self) -> Vec<u8> {
        let line = match self {
            Command::GetConfig => "GET_CONFIG".to_string(),
            Command::SetConfig(config) => format!("SET_CONFIG:{}", config.to_json()),
            Command::ListFiles => "GET_FILES".to_string(),
            Command::DownloadFile(name) => format!("DOWNLOAD_FILE:{}", normalize_path(name)),
            Command::DeleteFile(name) => format!("DELETE_FILE:{}", normalize_path(name)),
            Command::SendViaRadio(name) => format!("SEND_LORA:{}", normalize_path(name)),
            Command::GetStatus => "GET_STATUS".to_string(),
            Command::UploadMetadata { name, size } => format!(
                r#"UPLOAD_FILE:{{"filename":{},"size":{}}}"#,
                serde_json::Value::from(name.as_str()),
                size
            ),
        };
        let mut bytes = line.into_bytes();
        bytes.push(b'\n');
        bytes
    }

    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Command::GetConfig => "GET_CONFIG",
            Command::SetConfig(_) => "SET_CONFIG",
            Command::ListFiles => "GET_FILES",
            Command::DownloadFile(_) => "DOWNLOAD_FILE",
            Command::DeleteFile(_) => "DELETE_FILE",
            Command::SendViaRadio(_) => "SEND_LORA",
            Command::GetStatus => "GET_STATUS",
            Command::UploadMetadata { .. } => "UPLOAD_FILE",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Prefix `name` with `/` unless it already starts with one
///
/// ```rust
/// use lora_gateway_protocol::command::normalize_path;
///
/// assert_eq!(normalize_path("log.txt"), "/log.txt");
/// assert_eq!(normalize_path("/log.txt"), "/log.txt");
/// ```
pub fn normalize_path(name: &str) -> String {
    if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{}", name)
    }
}

/// Header prepended to each upload chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    /// Zero-based chunk index
    pub index: u16,
    /// Number of chunks in the upload
    pub total: u16,
}

impl ChunkHeader {
    /// `['C', hi(index), lo(index), hi(total), lo(total)]`
    pub fn to_bytes(self) -> [u8; CHUNK_HEADER_LEN] {
        let [index_hi, index_lo] = self.index.to_be_bytes();
        let [total_hi, total_lo] = self.total.to_be_bytes();
        [CHUNK_MARKER, index_hi, index_lo, total_hi, total_lo]
    }

    /// Parse a header from the start of `bytes`
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [CHUNK_MARKER, index_hi, index_lo, total_hi, total_lo, ..] => Some(Self {
                index: u16::from_be_bytes([*index_hi, *index_lo]),
                total: u16::from_be_bytes([*total_hi, *total_lo]),
            }),
            _ => None,
        }
    }
}

/// Header plus payload, ready for the wire
pub fn encode_chunk(header: ChunkHeader, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(CHUNK_HEADER_LEN + payload.len());
    frame.extend_from_slice(&header.to_bytes());
    frame.extend_from_slice(payload);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_literals() {
        assert_eq!(Command::GetConfig.encode(), b"GET_CONFIG\n");
        assert_eq!(Command::ListFiles.encode(), b"GET_FILES\n");
        assert_eq!(Command::GetStatus.encode(), b"GET_STATUS\n");
    }

    #[test]
    fn test_set_config_truncates_bandwidth() {
        let cmd = Command::SetConfig(RadioConfig::new(125.9, 9, 7, 5));
        assert_eq!(
            cmd.encode(),
            b"SET_CONFIG:{\"bw\":125,\"sf\":9,\"cr\":7,\"ack\":5}\n"
        );
    }

    #[test]
    fn test_path_commands_normalize() {
        assert_eq!(
            Command::DeleteFile("a.txt".into()).encode(),
            b"DELETE_FILE:/a.txt\n"
        );
        assert_eq!(
            Command::SendViaRadio("/logs/a.txt".into()).encode(),
            b"SEND_LORA:/logs/a.txt\n"
        );
    }

    #[test]
    fn test_upload_metadata() {
        let cmd = Command::UploadMetadata {
            name: "photo.jpg".into(),
            size: 1300,
        };
        assert_eq!(
            cmd.encode(),
            b"UPLOAD_FILE:{\"filename\":\"photo.jpg\",\"size\":1300}\n"
        );

        // Quotes in names stay valid JSON
        let cmd = Command::UploadMetadata {
            name: "a\"b".into(),
            size: 1,
        };
        assert_eq!(
            cmd.encode(),
            b"UPLOAD_FILE:{\"filename\":\"a\\\"b\",\"size\":1}\n"
        );
    }

    #[test]
    fn test_chunk_header_big_endian() {
        let header = ChunkHeader { index: 2, total: 3 };
        assert_eq!(header.to_bytes(), [b'C', 0x00, 0x02, 0x00, 0x03]);

        let header = ChunkHeader {
            index: 0x0102,
            total: 0xFFFF,
        };
        assert_eq!(header.to_bytes(), [b'C', 0x01, 0x02, 0xFF, 0xFF]);
        assert_eq!(ChunkHeader::from_bytes(&header.to_bytes()), Some(header));
        assert_eq!(ChunkHeader::from_bytes(b"X\0\0\0\0"), None);
    }

    #[test]
    fn test_encode_chunk() {
        let frame = encode_chunk(ChunkHeader { index: 0, total: 1 }, b"hi");
        assert_eq!(frame, [b'C', 0, 0, 0, 1, b'h', b'i']);
    }
}
