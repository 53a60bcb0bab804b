//! Transfer engine
//!
//! - [`upload`]: chunking and the paced upload worker
//! - [`download`]: session reassembly and download sinks
//! - [`listing`]: `GET_FILES` listing cycles

pub mod download;
pub mod listing;
pub mod upload;

pub use download::{DirectorySink, DownloadSession, FileSink, MemorySink};
pub use listing::{FileDescriptor, FileListing};
pub use upload::{
    run_upload, ChunkWriter, UploadHandle, UploadPlan, UploadReport, UploadSignal, UploadTiming,
    MAX_CHUNKS,
};
