//! Destinations for recorded chunks.
//!
//! Chunks reach sinks through the [`Router`](crate::pipeline::Router), one
//! `write` per recorded block. Two sinks ship with the crate:
//!
//! - [`SequenceFileSink`]: one raw `.f32` file per block, numbered `0000001.f32`, ...
//! - [`PerChannelSink`]: sends each input channel's blocks to its own sinks
//!
//! Upload clients and encoders implement [`Sink`] themselves.

mod per_channel;
mod sequence;

pub use per_channel::PerChannelSink;
pub use sequence::SequenceFileSink;

use crate::{AudioChunk, SinkError};
use async_trait::async_trait;

/// A destination for recorded blocks.
///
/// Every chunk carries its input channel index and a per-channel sequence
/// number, so a sink can keep channels apart without extra bookkeeping.
/// Methods take `&self`; sinks with state use interior mutability.
///
/// # Example
///
/// ```
/// use splutter::{AudioChunk, Sink, SinkError};
/// use async_trait::async_trait;
///
/// /// Logs block boundaries per channel.
/// struct BlockLog;
///
/// #[async_trait]
/// impl Sink for BlockLog {
///     fn name(&self) -> &str {
///         "block-log"
///     }
///
///     async fn write(&self, chunk: &AudioChunk) -> Result<(), SinkError> {
///         println!(
///             "input {} block {} ({:?})",
///             chunk.channel,
///             chunk.sequence,
///             chunk.duration()
///         );
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Sink: Send + Sync {
    /// Name used in logs and in [`SplutterEvent::SinkError`](crate::SplutterEvent::SinkError).
    fn name(&self) -> &str;

    /// Prepares the destination before the first chunk arrives.
    ///
    /// A failure here stops [`spawn_router`](crate::pipeline::spawn_router)
    /// with `SinkStartFailed`.
    async fn on_start(&self) -> Result<(), SinkError> {
        Ok(())
    }

    /// Persists one recorded block.
    ///
    /// Called in arrival order. A failed write is reported and the chunk is
    /// not retried.
    async fn write(&self, chunk: &AudioChunk) -> Result<(), SinkError>;

    /// Flushes and closes the destination once the router has drained.
    async fn on_stop(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Keeps `(channel, sequence)` of every block it sees.
    #[derive(Default)]
    struct BlockIndex {
        seen: Mutex<Vec<(usize, u64)>>,
    }

    #[async_trait]
    impl Sink for BlockIndex {
        fn name(&self) -> &str {
            "block-index"
        }

        async fn write(&self, chunk: &AudioChunk) -> Result<(), SinkError> {
            self.seen.lock().push((chunk.channel, chunk.sequence));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_default_hooks_succeed() {
        let sink = BlockIndex::default();
        sink.on_start().await.unwrap();
        sink.on_stop().await.unwrap();
        assert!(sink.seen.lock().is_empty());
    }

    #[tokio::test]
    async fn test_interleaved_channels_stay_distinguishable() {
        let sink = BlockIndex::default();
        for sequence in 0..2 {
            for channel in [1, 0] {
                let chunk = AudioChunk::new(vec![0.0; 256], channel, sequence, 48000);
                sink.write(&chunk).await.unwrap();
            }
        }

        assert_eq!(*sink.seen.lock(), vec![(1, 0), (0, 0), (1, 1), (0, 1)]);
    }

    #[test]
    fn test_sink_is_object_safe_and_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Arc<dyn Sink>>();
        let sink: Arc<dyn Sink> = Arc::new(BlockIndex::default());
        assert_eq!(sink.name(), "block-index");
    }
}
