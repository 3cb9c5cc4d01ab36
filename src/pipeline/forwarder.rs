//! Bridge from the engine thread into the async pipeline.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::{chunk_callback, AudioChunk, ChunkCallback, EventCallback, SplutterEvent};

/// Default queue depth between the engine thread and the router.
///
/// At the default block size of 16384 samples and 48 kHz this is roughly
/// 34 seconds of a single recording channel.
pub const DEFAULT_CHUNK_QUEUE: usize = 100;

/// Returns a chunk callback that queues chunks into `sender`.
///
/// The callback never blocks the engine thread. When the queue is full the
/// chunk is dropped, a warning is logged, and `ChunkDropped` is emitted.
/// Chunks sent after the receiver is gone are discarded silently.
///
/// # Example
///
/// ```
/// use splutter::pipeline::{chunk_forwarder, DEFAULT_CHUNK_QUEUE};
/// use splutter::{Audio, MockBackend};
/// use tokio::sync::mpsc;
///
/// let (tx, _rx) = mpsc::channel(DEFAULT_CHUNK_QUEUE);
/// let audio = Audio::builder(MockBackend::new(2))
///     .chunk_callback(chunk_forwarder(tx, None))
///     .build()?;
/// # Ok::<(), splutter::SplutterError>(())
/// ```
pub fn chunk_forwarder(
    sender: mpsc::Sender<AudioChunk>,
    events: Option<EventCallback>,
) -> ChunkCallback {
    chunk_callback(move |chunk: AudioChunk| match sender.try_send(chunk) {
        Ok(()) => {}
        Err(TrySendError::Full(chunk)) => {
            tracing::warn!(
                channel = chunk.channel,
                sequence = chunk.sequence,
                "chunk queue full, dropping chunk"
            );
            if let Some(ref events) = events {
                events(SplutterEvent::ChunkDropped {
                    channel: chunk.channel,
                    sequence: chunk.sequence,
                });
            }
        }
        Err(TrySendError::Closed(_)) => {}
    })
}
