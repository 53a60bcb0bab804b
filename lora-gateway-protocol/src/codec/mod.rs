//! Inbound frame decoding
//!
//! [`FrameDecoder`] reconstructs discrete frames from the fragmented byte
//! stream; [`classify`] turns each complete text line into a [`TextFrame`].

pub mod classify;
pub mod decoder;

pub use classify::{classify, parse_file_entry, parse_file_start, TextFrame};
pub use decoder::{DecodedFrame, DecoderMode, FrameDecoder, MAX_LINE_LEN};
