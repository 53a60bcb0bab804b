//! Chunked upload
//!
//! `UPLOAD_FILE:{"filename":..,"size":..}` announces the file, a settle
//! delay lets the device prepare, then the file follows as 512-byte chunks
//! in ascending order with a fixed pacing delay between them. Completion
//! only means every chunk was written; the device does not acknowledge.

use crate::command::{encode_chunk, ChunkHeader, Command, CHUNK_SIZE};
use crate::{ProtocolError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Chunk count ceiling imposed by the 16-bit header field
pub const MAX_CHUNKS: usize = u16::MAX as usize;

/// File prepared for upload
#[derive(Debug, Clone)]
pub struct UploadPlan {
    name: String,
    data: Vec<u8>,
    total_chunks: u16,
}

impl UploadPlan {
    /// Split `data` into chunks for `name`
    ///
    /// # Errors
    ///
    /// `InvalidConfig` when the name is empty or the file needs more than
    /// [`MAX_CHUNKS`] chunks.
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ProtocolError::InvalidConfig(
                "upload needs a file name".to_string(),
            ));
        }

        let chunks = data.len().div_ceil(CHUNK_SIZE);
        let total_chunks = u16::try_from(chunks).map_err(|_| {
            ProtocolError::InvalidConfig(format!(
                "{} bytes need {} chunks, at most {} fit the header",
                data.len(),
                chunks,
                MAX_CHUNKS
            ))
        })?;

        Ok(Self {
            name,
            data,
            total_chunks,
        })
    }

    /// File name announced to the device
    pub fn name(&self) -> &str {
        &self.name
    }

    /// File size in bytes
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Number of chunks
    pub fn total_chunks(&self) -> u16 {
        self.total_chunks
    }

    /// Announcement sent before the chunks
    pub fn metadata(&self) -> Command {
        Command::UploadMetadata {
            name: self.name.clone(),
            size: self.size(),
        }
    }

    /// Encoded chunk `index`, header included
    pub fn chunk(&self, index: u16) -> Option<Vec<u8>> {
        if index >= self.total_chunks {
            return None;
        }
        let start = usize::from(index) * CHUNK_SIZE;
        let end = (start + CHUNK_SIZE).min(self.data.len());
        let header = ChunkHeader {
            index,
            total: self.total_chunks,
        };
        Some(encode_chunk(header, &self.data[start..end]))
    }
}

/// Delays applied by the upload worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadTiming {
    /// Wait between the announcement and the first chunk
    pub settle_delay: Duration,
    /// Wait between consecutive chunks
    pub chunk_pacing: Duration,
}

impl Default for UploadTiming {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(200),
            chunk_pacing: Duration::from_millis(50),
        }
    }
}

/// Result of a finished upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    /// File name announced to the device
    pub name: String,
    /// Bytes sent, headers excluded
    pub bytes: u64,
    /// Chunks sent
    pub chunks: u16,
}

/// Stop signal shared between an upload worker and its owners
///
/// `cancel` is the caller giving up; `interrupt` means the session ended and
/// only cuts the current delay short, so the next write reports the closed
/// connection.
#[derive(Debug, Default)]
pub struct UploadSignal {
    cancelled: AtomicBool,
    interrupted: AtomicBool,
    wake: Notify,
}

impl UploadSignal {
    /// Create an unset signal
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop the upload before its next chunk
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.wake.notify_waiters();
    }

    /// Whether [`cancel`](Self::cancel) was called
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub(crate) fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
        self.wake.notify_waiters();
    }

    fn is_set(&self) -> bool {
        self.is_cancelled() || self.interrupted.load(Ordering::SeqCst)
    }

    /// Sleep for `delay` unless the signal fires first
    async fn pause(&self, delay: Duration) {
        if delay.is_zero() {
            return;
        }
        let notified = self.wake.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_set() {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = notified => debug!("Upload delay cut short"),
        }
    }
}

/// Where the upload worker writes its frames
#[async_trait]
pub trait ChunkWriter: Send + Sync {
    /// Write one frame; fails once the connection is gone
    async fn write(&self, frame: Vec<u8>) -> Result<()>;

    /// Called after each chunk was written
    fn progress(&self, _sent: u16, _total: u16) {}
}

/// Send `plan` through `writer`
///
/// `signal` is checked before every chunk and ends the delays early.
pub async fn run_upload(
    plan: &UploadPlan,
    writer: &dyn ChunkWriter,
    signal: &UploadSignal,
    timing: UploadTiming,
) -> Result<UploadReport> {
    info!(
        "Uploading {} ({} bytes, {} chunks)",
        plan.name(),
        plan.size(),
        plan.total_chunks()
    );

    writer.write(plan.metadata().encode()).await?;
    signal.pause(timing.settle_delay).await;

    let total = plan.total_chunks();
    for index in 0..total {
        if signal.is_cancelled() {
            info!("Upload of {} cancelled at chunk {}/{}", plan.name(), index, total);
            return Err(ProtocolError::Cancelled(format!(
                "upload of {} after {} of {} chunks",
                plan.name(),
                index,
                total
            )));
        }

        let frame = plan
            .chunk(index)
            .ok_or_else(|| ProtocolError::invalid_state(format!("chunk {} out of range", index)))?;
        writer.write(frame).await?;
        writer.progress(index + 1, total);
        debug!("Sent chunk {}/{} of {}", index + 1, total, plan.name());

        if index + 1 < total {
            signal.pause(timing.chunk_pacing).await;
        }
    }

    info!("Upload of {} sent", plan.name());
    Ok(UploadReport {
        name: plan.name().to_string(),
        bytes: plan.size(),
        chunks: total,
    })
}

/// Running upload
///
/// Dropping the handle does not stop the upload; call [`cancel`](Self::cancel).
#[derive(Debug)]
pub struct UploadHandle {
    name: String,
    total_chunks: u16,
    signal: Arc<UploadSignal>,
    task: JoinHandle<Result<UploadReport>>,
}

impl UploadHandle {
    pub(crate) fn new(
        name: String,
        total_chunks: u16,
        signal: Arc<UploadSignal>,
        task: JoinHandle<Result<UploadReport>>,
    ) -> Self {
        Self {
            name,
            total_chunks,
            signal,
            task,
        }
    }

    /// File name being uploaded
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of chunks in this upload
    pub fn total_chunks(&self) -> u16 {
        self.total_chunks
    }

    /// Stop before the next chunk, ending a pending delay at once
    pub fn cancel(&self) {
        self.signal.cancel();
    }

    /// Whether the worker has finished
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the worker's outcome
    pub async fn wait(self) -> Result<UploadReport> {
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(ProtocolError::Cancelled(format!(
                "upload task of {} aborted",
                self.name
            ))),
            Err(e) => Err(ProtocolError::invalid_state(format!(
                "upload task of {} failed: {}",
                self.name, e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingWriter {
        frames: Mutex<Vec<Vec<u8>>>,
        progress: Mutex<Vec<(u16, u16)>>,
        fail_after: Option<usize>,
    }

    #[async_trait]
    impl ChunkWriter for RecordingWriter {
        async fn write(&self, frame: Vec<u8>) -> Result<()> {
            let mut frames = self.frames.lock().unwrap();
            if self.fail_after == Some(frames.len()) {
                return Err(ProtocolError::ConnectionClosed("gone".to_string()));
            }
            frames.push(frame);
            Ok(())
        }

        fn progress(&self, sent: u16, total: u16) {
            self.progress.lock().unwrap().push((sent, total));
        }
    }

    fn instant() -> UploadTiming {
        UploadTiming {
            settle_delay: Duration::ZERO,
            chunk_pacing: Duration::ZERO,
        }
    }

    #[test]
    fn test_plan_chunking() {
        let plan = UploadPlan::new("photo.jpg", vec![0xAB; 1300]).unwrap();
        assert_eq!(plan.total_chunks(), 3);

        let first = plan.chunk(0).unwrap();
        assert_eq!(&first[..5], &[b'C', 0x00, 0x00, 0x00, 0x03]);
        assert_eq!(first.len(), 5 + 512);

        let last = plan.chunk(2).unwrap();
        assert_eq!(&last[..5], &[b'C', 0x00, 0x02, 0x00, 0x03]);
        assert_eq!(last.len() - 5, 276);

        assert!(plan.chunk(3).is_none());
    }

    #[test]
    fn test_plan_limits() {
        assert_eq!(UploadPlan::new("empty", Vec::new()).unwrap().total_chunks(), 0);
        assert_eq!(
            UploadPlan::new("exact", vec![0; 512]).unwrap().total_chunks(),
            1
        );
        assert!(matches!(
            UploadPlan::new("  ", vec![1]),
            Err(ProtocolError::InvalidConfig(_))
        ));
        assert!(matches!(
            UploadPlan::new("huge", vec![0; MAX_CHUNKS * CHUNK_SIZE + 1]),
            Err(ProtocolError::InvalidConfig(_))
        ));
        assert_eq!(
            UploadPlan::new("max", vec![0; MAX_CHUNKS * CHUNK_SIZE])
                .unwrap()
                .total_chunks(),
            u16::MAX
        );
    }

    #[tokio::test]
    async fn test_run_upload_sends_metadata_then_chunks() {
        let plan = UploadPlan::new("photo.jpg", vec![7; 1300]).unwrap();
        let writer = RecordingWriter::default();
        let signal = UploadSignal::new();

        let report = run_upload(&plan, &writer, &signal, instant()).await.unwrap();
        assert_eq!(
            report,
            UploadReport {
                name: "photo.jpg".to_string(),
                bytes: 1300,
                chunks: 3
            }
        );

        let frames = writer.frames.lock().unwrap();
        assert_eq!(frames.len(), 4);
        assert_eq!(
            frames[0],
            b"UPLOAD_FILE:{\"filename\":\"photo.jpg\",\"size\":1300}\n"
        );
        for (i, frame) in frames[1..].iter().enumerate() {
            assert_eq!(frame[2], i as u8);
        }
        assert_eq!(
            *writer.progress.lock().unwrap(),
            vec![(1, 3), (2, 3), (3, 3)]
        );
    }

    #[tokio::test]
    async fn test_run_upload_stops_when_cancelled() {
        let plan = UploadPlan::new("a.bin", vec![0; 2000]).unwrap();
        let writer = RecordingWriter::default();
        let signal = UploadSignal::new();
        signal.cancel();

        let result = run_upload(&plan, &writer, &signal, instant()).await;
        assert!(matches!(result, Err(ProtocolError::Cancelled(_))));
        // Only the announcement went out
        assert_eq!(writer.frames.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_run_upload_stops_on_write_failure() {
        let plan = UploadPlan::new("a.bin", vec![0; 2000]).unwrap();
        let writer = RecordingWriter {
            fail_after: Some(2),
            ..Default::default()
        };
        let signal = UploadSignal::new();

        let result = run_upload(&plan, &writer, &signal, instant()).await;
        assert!(matches!(result, Err(ProtocolError::ConnectionClosed(_))));
        assert_eq!(writer.frames.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_ends_settle_delay() {
        let plan = UploadPlan::new("a.bin", vec![0; 2000]).unwrap();
        let writer = Arc::new(RecordingWriter::default());
        let signal = Arc::new(UploadSignal::new());
        let timing = UploadTiming {
            settle_delay: Duration::from_secs(30),
            chunk_pacing: Duration::from_secs(30),
        };

        let worker = {
            let writer = writer.clone();
            let signal = signal.clone();
            tokio::spawn(async move { run_upload(&plan, writer.as_ref(), &signal, timing).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        signal.cancel();

        let result = tokio::time::timeout(Duration::from_secs(2), worker)
            .await
            .expect("settle delay not cut short")
            .unwrap();
        assert!(matches!(result, Err(ProtocolError::Cancelled(_))));
        assert_eq!(writer.frames.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_interrupt_ends_pacing_without_cancelling() {
        let plan = UploadPlan::new("a.bin", vec![0; 2000]).unwrap();
        let writer = Arc::new(RecordingWriter {
            fail_after: Some(2),
            ..Default::default()
        });
        let signal = Arc::new(UploadSignal::new());
        let timing = UploadTiming {
            settle_delay: Duration::ZERO,
            chunk_pacing: Duration::from_secs(30),
        };

        let worker = {
            let writer = writer.clone();
            let signal = signal.clone();
            tokio::spawn(async move { run_upload(&plan, writer.as_ref(), &signal, timing).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        signal.interrupt();

        let result = tokio::time::timeout(Duration::from_secs(2), worker)
            .await
            .expect("pacing delay not cut short")
            .unwrap();
        assert!(matches!(result, Err(ProtocolError::ConnectionClosed(_))));
        assert!(!signal.is_cancelled());
    }
}
