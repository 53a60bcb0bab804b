//! Modal frame decoder
//!
//! Outside a download the stream is newline-delimited text. A
//! `[FILE_START:name:size]` line switches the decoder into raw mode, where
//! exactly `size` bytes are collected without re-framing. Afterwards the
//! decoder returns to text mode and waits for `[FILE_END]` to close the
//! session.
//!
//! Feeding the same bytes in any split yields the same frames; only the
//! number of [`DecodedFrame::DownloadProgress`] reports depends on how the
//! bytes were split.

use crate::codec::classify::{classify, trim_line_ending, TextFrame};
use crate::transfer::DownloadSession;
use tracing::{debug, warn};

/// Longest text line kept while waiting for its newline
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// `[FILE_END]` as it appears when a device cuts a transfer short
const TRUNCATION_MARKERS: [&[u8]; 2] = [b"[FILE_END]\n", b"[FILE_END]\r\n"];

/// Output of [`FrameDecoder::feed`]
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedFrame {
    /// A classified text line (never `FileStart` / `FileEnd`)
    Text(TextFrame),
    /// A download session opened
    DownloadStarted {
        /// Device-side name
        name: String,
        /// Announced size in bytes
        expected: u64,
    },
    /// Raw bytes were added to the open session
    DownloadProgress {
        /// Bytes collected so far
        received: u64,
        /// Announced size
        expected: u64,
    },
    /// `[FILE_END]` closed a complete session
    DownloadFinished {
        /// Device-side name
        name: String,
        /// Exactly `expected` bytes
        data: Vec<u8>,
    },
    /// A session was discarded without delivering data
    DownloadAborted {
        /// Device-side name
        name: String,
        /// Why it was discarded
        reason: String,
    },
}

/// Decoder mode
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DecoderMode {
    /// Newline-delimited text
    #[default]
    AwaitingFrame,
    /// Collecting raw payload
    InDownload(DownloadSession),
    /// Payload complete, text mode until `[FILE_END]`
    AwaitingFileEnd(DownloadSession),
}

/// Turns an arbitrarily fragmented byte stream into frames
#[derive(Debug, Default)]
pub struct FrameDecoder {
    mode: DecoderMode,
    line: Vec<u8>,
}

impl FrameDecoder {
    /// Create a decoder in text mode
    pub fn new() -> Self {
        Self::default()
    }

    /// Current mode
    pub fn mode(&self) -> &DecoderMode {
        &self.mode
    }

    /// Name of the open download session, if any
    pub fn active_download(&self) -> Option<&str> {
        match &self.mode {
            DecoderMode::InDownload(session) | DecoderMode::AwaitingFileEnd(session) => {
                Some(session.target_name())
            }
            DecoderMode::AwaitingFrame => None,
        }
    }

    /// Drop partial state, returning the name of a discarded download
    pub fn discard(&mut self) -> Option<String> {
        self.line.clear();
        self.discard_session()
    }

    /// Consume one read's worth of bytes
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<DecodedFrame> {
        let mut frames = Vec::new();
        let mut rest = bytes;

        while !rest.is_empty() {
            rest = match self.mode {
                DecoderMode::InDownload(_) => self.feed_raw(rest, &mut frames),
                _ => self.feed_text(rest, &mut frames),
            };
        }

        frames
    }

    fn feed_raw<'a>(&mut self, bytes: &'a [u8], frames: &mut Vec<DecodedFrame>) -> &'a [u8] {
        let DecoderMode::InDownload(session) = &mut self.mode else {
            return bytes;
        };

        let take = usize::try_from(session.remaining())
            .unwrap_or(usize::MAX)
            .min(bytes.len());
        let (payload, rest) = bytes.split_at(take);

        // A device that gives up early ends the payload with [FILE_END].
        // Checked at every newline so the outcome never depends on how the
        // bytes were split.
        let mut consumed = 0;
        for (i, byte) in payload.iter().enumerate() {
            if *byte != b'\n' {
                continue;
            }
            session.append(&payload[consumed..=i]);
            consumed = i + 1;
            if !session.is_complete() && TRUNCATION_MARKERS.iter().any(|m| session.ends_with(m)) {
                let name = session.target_name().to_string();
                warn!(
                    "Download of {} truncated at {} of {} bytes",
                    name,
                    session.received(),
                    session.expected_size()
                );
                frames.push(DecodedFrame::DownloadAborted {
                    reason: format!(
                        "download of {} truncated at {} of {} bytes",
                        name,
                        session.received(),
                        session.expected_size()
                    ),
                    name,
                });
                self.mode = DecoderMode::AwaitingFrame;
                return &bytes[consumed..];
            }
        }
        session.append(&payload[consumed..]);

        frames.push(DecodedFrame::DownloadProgress {
            received: session.received(),
            expected: session.expected_size(),
        });

        if session.is_complete() {
            debug!(
                "Payload of {} complete, waiting for [FILE_END]",
                session.target_name()
            );
            if let DecoderMode::InDownload(session) = std::mem::take(&mut self.mode) {
                self.mode = DecoderMode::AwaitingFileEnd(session);
            }
        }

        rest
    }

    fn feed_text<'a>(&mut self, bytes: &'a [u8], frames: &mut Vec<DecodedFrame>) -> &'a [u8] {
        let Some(newline) = bytes.iter().position(|b| *b == b'\n') else {
            self.line.extend_from_slice(bytes);
            if self.line.len() > MAX_LINE_LEN {
                warn!(
                    "Dropping {} bytes without a line terminator",
                    self.line.len()
                );
                self.line.clear();
            }
            return &[];
        };

        self.line.extend_from_slice(&bytes[..=newline]);
        let raw = std::mem::take(&mut self.line);
        let text = String::from_utf8_lossy(&raw);
        let frame = classify(trim_line_ending(&text));
        self.dispatch_text(frame, frames);

        &bytes[newline + 1..]
    }

    fn dispatch_text(&mut self, frame: TextFrame, frames: &mut Vec<DecodedFrame>) {
        match frame {
            TextFrame::FileStart { name, size } => {
                if let Some(previous) = self.discard_session() {
                    warn!("{} superseded by a new download of {}", previous, name);
                    frames.push(DecodedFrame::DownloadAborted {
                        reason: format!("download superseded: {} replaced by {}", previous, name),
                        name: previous,
                    });
                }

                debug!("Download of {} opened ({} bytes)", name, size);
                frames.push(DecodedFrame::DownloadStarted {
                    name: name.clone(),
                    expected: size,
                });

                let session = DownloadSession::new(name, size);
                self.mode = if session.is_complete() {
                    DecoderMode::AwaitingFileEnd(session)
                } else {
                    DecoderMode::InDownload(session)
                };
            }
            TextFrame::FileEnd => match std::mem::take(&mut self.mode) {
                DecoderMode::AwaitingFileEnd(session) => {
                    let (name, data) = session.into_parts();
                    debug!("Download of {} closed ({} bytes)", name, data.len());
                    frames.push(DecodedFrame::DownloadFinished { name, data });
                }
                other => {
                    debug!("Ignoring [FILE_END] without an open download");
                    self.mode = other;
                }
            },
            frame => frames.push(DecodedFrame::Text(frame)),
        }
    }

    fn discard_session(&mut self) -> Option<String> {
        match std::mem::take(&mut self.mode) {
            DecoderMode::InDownload(session) | DecoderMode::AwaitingFileEnd(session) => {
                Some(session.target_name().to_string())
            }
            DecoderMode::AwaitingFrame => None,
        }
    }
}
