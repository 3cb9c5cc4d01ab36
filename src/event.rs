//! Callbacks and runtime events.
//!
//! Three callbacks connect the core to its collaborators:
//!
//! - [`ChunkCallback`]: receives every recorded block (runs on the audio thread)
//! - [`StateCallback`]: observes channel state transitions (runs on the caller's thread)
//! - [`EventCallback`]: non-fatal runtime notifications for logging/metrics

use std::sync::Arc;

use crate::{AudioChunk, ChannelState};

/// Runtime events emitted outside the synchronous command path.
///
/// These are informational; capture and routing continue after any of them.
///
/// # Example
///
/// ```
/// use splutter::SplutterEvent;
///
/// fn handle_event(event: SplutterEvent) {
///     match event {
///         SplutterEvent::ChunkDropped { channel, sequence } => {
///             eprintln!("dropped block {sequence} of channel {channel}");
///         }
///         SplutterEvent::SinkError { sink_name, error } => {
///             eprintln!("sink '{sink_name}' error: {error}");
///         }
///         SplutterEvent::StreamError { reason } => {
///             eprintln!("stream error: {reason}");
///         }
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub enum SplutterEvent {
    /// A recorded block could not be queued for delivery because the
    /// consumer fell behind.
    ChunkDropped {
        /// Input channel of the dropped block.
        channel: usize,
        /// Sequence number of the dropped block.
        sequence: u64,
    },

    /// A sink failed to write a chunk. The chunk is not retried.
    SinkError {
        /// Name of the sink that errored.
        sink_name: String,
        /// Description of the error.
        error: String,
    },

    /// The audio device reported an error.
    StreamError {
        /// Description reported by the backend.
        reason: String,
    },
}

/// Receives each recorded block together with its channel index.
///
/// Invoked on the engine's real-time thread: implementations must not block.
/// Use [`chunk_forwarder`](crate::chunk_forwarder) to hand chunks to async code.
pub type ChunkCallback = Arc<dyn Fn(AudioChunk) + Send + Sync>;

/// Observes `(channel_index, new_state)` after every channel transition.
pub type StateCallback = Arc<dyn Fn(usize, ChannelState) + Send + Sync>;

/// Receives [`SplutterEvent`]s.
pub type EventCallback = Arc<dyn Fn(SplutterEvent) + Send + Sync>;

/// Creates a [`ChunkCallback`] from a closure.
///
/// # Example
///
/// ```
/// use splutter::chunk_callback;
///
/// let on_chunk = chunk_callback(|chunk| {
///     println!("channel {}: {} samples", chunk.channel, chunk.len());
/// });
/// ```
pub fn chunk_callback<F>(f: F) -> ChunkCallback
where
    F: Fn(AudioChunk) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Creates a [`StateCallback`] from a closure.
pub fn state_callback<F>(f: F) -> StateCallback
where
    F: Fn(usize, ChannelState) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Creates an [`EventCallback`] from a closure.
pub fn event_callback<F>(f: F) -> EventCallback
where
    F: Fn(SplutterEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}
