//! Numbered raw-sample file sink.

use crate::sink::Sink;
use crate::{AudioChunk, SinkError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Extension of the files written by [`SequenceFileSink`].
const FILE_EXTENSION: &str = "f32";

/// Width of the zero-padded sequence number in file names.
const SEQUENCE_WIDTH: usize = 7;

/// A sink that writes every chunk to its own file in a directory.
///
/// Files are named with a 7-digit, zero-padded sequence that starts at 1
/// and increases with every chunk written: `0000001.f32`, `0000002.f32`,
/// and so on. Each file holds the chunk's samples as raw little-endian
/// `f32`, with no header. The directory is created on start.
///
/// All file I/O runs in the blocking thread pool.
///
/// # Example
///
/// ```no_run
/// use splutter::SequenceFileSink;
///
/// // Only keep input channel 0.
/// let sink = SequenceFileSink::new("recordings/take-1").channel(0);
/// ```
pub struct SequenceFileSink {
    name: String,
    dir: Arc<PathBuf>,
    channel: Option<usize>,
    /// Last sequence number handed out.
    count: Mutex<u64>,
}

impl SequenceFileSink {
    /// Creates a sink writing into `dir`, accepting chunks from every channel.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            name: format!("sequence:{}", dir.as_ref().display()),
            dir: Arc::new(dir.as_ref().to_path_buf()),
            channel: None,
            count: Mutex::new(0),
        }
    }

    /// Restricts the sink to chunks from one input channel.
    pub fn channel(mut self, channel: usize) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Directory the files are written to.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of files written so far.
    pub async fn files_written(&self) -> u64 {
        *self.count.lock().await
    }

    /// File name for a sequence number.
    pub fn file_name(sequence: u64) -> String {
        format!("{sequence:0SEQUENCE_WIDTH$}.{FILE_EXTENSION}")
    }
}

#[async_trait]
impl Sink for SequenceFileSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_start(&self) -> Result<(), SinkError> {
        let dir = Arc::clone(&self.dir);
        tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&*dir).map_err(|e| SinkError::file_error(&*dir, e))
        })
        .await
        .map_err(|e| SinkError::custom(format!("create dir task panicked: {e}")))?
    }

    async fn write(&self, chunk: &AudioChunk) -> Result<(), SinkError> {
        if self.channel.is_some_and(|c| c != chunk.channel) {
            return Ok(());
        }

        // Held across the write so numbering matches completion order.
        let mut count = self.count.lock().await;
        let sequence = *count + 1;
        let path = self.dir.join(Self::file_name(sequence));
        let bytes = chunk.to_le_bytes();

        let written = path.clone();
        tokio::task::spawn_blocking(move || {
            std::fs::write(&written, bytes).map_err(|e| SinkError::file_error(&*written, e))
        })
        .await
        .map_err(|e| SinkError::custom(format!("write task panicked: {e}")))??;

        *count = sequence;
        tracing::debug!(path = %path.display(), channel = chunk.channel, "chunk saved");
        Ok(())
    }
}
