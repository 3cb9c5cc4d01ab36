//! Builder pattern for [`Audio`].

use crate::graph::{AudioBackend, ChannelInterpretation};
use crate::{
    chunk_callback, state_callback, Audio, AudioChunk, ChannelState, ChunkCallback,
    RoutingConfig, SplutterError, StateCallback,
};

/// Builder for configuring a routing coordinator.
///
/// Use [`Audio::builder()`] to create a new builder.
///
/// # Example
///
/// ```
/// use splutter::{Audio, MockBackend};
///
/// let audio = Audio::builder(MockBackend::new(2))
///     .buffer_size(4096)
///     .lowpass_cutoff(8000.0)
///     .on_channel_state_change(|index, state| println!("channel {index}: {state}"))
///     .build()?;
///
/// assert_eq!(audio.processor_buffer_size(), 4096);
/// # Ok::<(), splutter::SplutterError>(())
/// ```
pub struct AudioBuilder<B: AudioBackend> {
    backend: B,
    config: RoutingConfig,
    on_chunk: Option<ChunkCallback>,
    on_state_change: Option<StateCallback>,
}

impl<B: AudioBackend> AudioBuilder<B> {
    pub(crate) fn new(backend: B) -> Self {
        Self {
            backend,
            config: RoutingConfig::default(),
            on_chunk: None,
            on_state_change: None,
        }
    }

    /// Replaces the whole routing configuration.
    pub fn config(mut self, config: RoutingConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the processor block size, which is also the chunk length.
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.config.buffer_size = size;
        self
    }

    /// Sets the per-channel lowpass cutoff in Hz.
    pub fn lowpass_cutoff(mut self, cutoff_hz: f32) -> Self {
        self.config.lowpass_cutoff_hz = cutoff_hz;
        self
    }

    /// Sets how the destination interprets merged channels.
    pub fn channel_interpretation(mut self, interpretation: ChannelInterpretation) -> Self {
        self.config.channel_interpretation = interpretation;
        self
    }

    /// Sets the callback receiving recorded chunks.
    ///
    /// The callback runs on the engine thread, once per block, for every
    /// recording channel. Keep it short; hand chunks off with
    /// [`chunk_forwarder`](crate::pipeline::chunk_forwarder) for anything slow.
    pub fn on_chunk<F>(mut self, callback: F) -> Self
    where
        F: Fn(AudioChunk) + Send + Sync + 'static,
    {
        self.on_chunk = Some(chunk_callback(callback));
        self
    }

    /// Sets an already shared chunk callback.
    pub fn chunk_callback(mut self, callback: ChunkCallback) -> Self {
        self.on_chunk = Some(callback);
        self
    }

    /// Sets the listener notified on every channel state transition.
    pub fn on_channel_state_change<F>(mut self, callback: F) -> Self
    where
        F: Fn(usize, ChannelState) + Send + Sync + 'static,
    {
        self.on_state_change = Some(state_callback(callback));
        self
    }

    /// Validates the configuration and creates the coordinator.
    ///
    /// No context is created until [`Audio::resume`] is called.
    ///
    /// # Errors
    ///
    /// Returns `InvalidBufferSize` or `InvalidConfig` for unusable settings.
    pub fn build(self) -> Result<Audio<B>, SplutterError> {
        self.config.validate()?;
        Ok(Audio::from_parts(
            self.backend,
            self.config,
            self.on_chunk,
            self.on_state_change,
        ))
    }
}
