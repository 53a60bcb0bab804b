//! Classification of complete text lines
//!
//! Order, highest priority first:
//!
//! 1. `[FILES_START]`
//! 2. `[FILES_END]`
//! 3. `[FILE_START:` prefix (payload `name:size` before the trailing `]`)
//! 4. `[FILE_END]`
//! 5. contains `,` and starts with neither `[` nor `{` (listing entry `name,size`)
//! 6. starts with `{` and contains `bw` (radio configuration object)
//! 7. anything else, passed through verbatim
//!
//! Configuration objects always contain commas, so rule 5 leaves JSON
//! objects to rule 6.

use crate::{FileDescriptor, ProtocolError, RadioConfig, Result};

const FILES_START: &str = "[FILES_START]";
const FILES_END: &str = "[FILES_END]";
const FILE_START_PREFIX: &str = "[FILE_START:";
const FILE_END: &str = "[FILE_END]";

/// One classified text line
#[derive(Debug, Clone, PartialEq)]
pub enum TextFrame {
    /// Listing opens
    FilesStart,
    /// Listing closes
    FilesEnd,
    /// Download opens
    FileStart {
        /// Device-side file name
        name: String,
        /// Number of raw bytes that follow
        size: u64,
    },
    /// Download closes
    FileEnd,
    /// One listing line
    FileEntry(FileDescriptor),
    /// Device-reported radio configuration
    Config(RadioConfig),
    /// Recognised shape but unparseable content; skipped by consumers
    Malformed {
        /// Line as received
        line: String,
        /// Parse failure
        reason: String,
    },
    /// Anything else, including empty lines
    Unclassified(String),
}

/// Strip the line terminator (`\n` or `\r\n`)
pub fn trim_line_ending(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

/// Classify one line, terminator already removed
///
/// ```rust
/// use lora_gateway_protocol::codec::{classify, TextFrame};
/// use lora_gateway_protocol::FileDescriptor;
///
/// assert_eq!(classify("[FILES_START]"), TextFrame::FilesStart);
/// assert_eq!(
///     classify("notes.txt,1234"),
///     TextFrame::FileEntry(FileDescriptor::new("notes.txt", 1234))
/// );
/// assert_eq!(classify(""), TextFrame::Unclassified(String::new()));
/// ```
pub fn classify(line: &str) -> TextFrame {
    let malformed = |e: ProtocolError| TextFrame::Malformed {
        line: line.to_string(),
        reason: e.to_string(),
    };

    if line == FILES_START {
        TextFrame::FilesStart
    } else if line == FILES_END {
        TextFrame::FilesEnd
    } else if line.starts_with(FILE_START_PREFIX) {
        match parse_file_start(line) {
            Ok((name, size)) => TextFrame::FileStart { name, size },
            Err(e) => malformed(e),
        }
    } else if line == FILE_END {
        TextFrame::FileEnd
    } else if line.contains(',') && !line.starts_with('[') && !line.starts_with('{') {
        match parse_file_entry(line) {
            Ok(entry) => TextFrame::FileEntry(entry),
            Err(e) => malformed(e),
        }
    } else if line.starts_with('{') && line.contains("bw") {
        match RadioConfig::from_json(line) {
            Ok(config) => TextFrame::Config(config),
            Err(e) => malformed(e),
        }
    } else {
        TextFrame::Unclassified(line.to_string())
    }
}

/// Parse `name,size`
///
/// Exactly two comma-separated fields, both trimmed; the size must be an
/// unsigned integer.
pub fn parse_file_entry(line: &str) -> Result<FileDescriptor> {
    let fields: Vec<&str> = line.split(',').collect();
    let [name, size] = fields.as_slice() else {
        return Err(ProtocolError::InvalidFrame(format!(
            "listing line has {} fields, expected 2",
            fields.len()
        )));
    };

    let name = name.trim();
    if name.is_empty() {
        return Err(ProtocolError::InvalidFrame("listing line has no name".to_string()));
    }

    let size = size.trim().parse::<u64>().map_err(|e| {
        ProtocolError::InvalidFrame(format!("listing size '{}': {}", size.trim(), e))
    })?;

    Ok(FileDescriptor::new(name, size))
}

/// Parse `[FILE_START:name:size]`
///
/// The size is taken after the last `:`, so names may contain colons.
pub fn parse_file_start(line: &str) -> Result<(String, u64)> {
    let payload = line
        .strip_prefix(FILE_START_PREFIX)
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(|| ProtocolError::InvalidFrame("unterminated FILE_START marker".to_string()))?;

    let (name, size) = payload.rsplit_once(':').ok_or_else(|| {
        ProtocolError::InvalidFrame(format!("FILE_START '{}' has no size", payload))
    })?;

    if name.is_empty() {
        return Err(ProtocolError::InvalidFrame("FILE_START has no name".to_string()));
    }

    let size = size.trim().parse::<u64>().map_err(|e| {
        ProtocolError::InvalidFrame(format!("FILE_START size '{}': {}", size, e))
    })?;

    Ok((name.to_string(), size))
}
