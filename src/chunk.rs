//! Recorded audio block with metadata.

use std::sync::Arc;
use std::time::Duration;

/// One recorded block from a single input channel.
///
/// `AudioChunk` is what the [`ChunkCallback`](crate::ChunkCallback) receives
/// while a channel is recording. Samples are single-precision amplitudes in
/// the device's native range, and the block length is the processor buffer
/// size fixed at construction.
///
/// Samples are stored in an `Arc<Vec<f32>>` so forwarding a chunk to several
/// sinks does not copy audio.
///
/// # Example
///
/// ```
/// use splutter::AudioChunk;
/// use std::time::Duration;
///
/// let chunk = AudioChunk::new(vec![0.0; 4800], 1, 0, 48000);
/// assert_eq!(chunk.duration(), Duration::from_millis(100));
/// assert_eq!(chunk.channel, 1);
/// ```
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Mono samples for one block.
    pub samples: Arc<Vec<f32>>,

    /// Index of the input channel that produced this block.
    pub channel: usize,

    /// Number of blocks this channel processed before this one.
    ///
    /// Gaps between consecutive chunks of a channel mean the channel was
    /// not recording for those blocks.
    pub sequence: u64,

    /// Sample rate in Hz of the audio context.
    pub sample_rate: u32,
}

impl AudioChunk {
    /// Creates a new chunk, taking ownership of the samples.
    pub fn new(samples: Vec<f32>, channel: usize, sequence: u64, sample_rate: u32) -> Self {
        Self::from_arc(Arc::new(samples), channel, sequence, sample_rate)
    }

    /// Creates a chunk from already shared samples.
    pub fn from_arc(
        samples: Arc<Vec<f32>>,
        channel: usize,
        sequence: u64,
        sample_rate: u32,
    ) -> Self {
        Self {
            samples,
            channel,
            sequence,
            sample_rate,
        }
    }

    /// Returns the playback duration of this chunk.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }

    /// Returns the number of samples in this chunk.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns `true` if this chunk contains no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Serializes the samples as raw little-endian `f32` bytes.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_16384_at_48khz() {
        let chunk = AudioChunk::new(vec![0.0; 16384], 0, 0, 48000);
        let expected = Duration::from_secs_f64(16384.0 / 48000.0);
        assert_eq!(chunk.duration(), expected);
    }

    #[test]
    fn test_zero_sample_rate() {
        let chunk = AudioChunk::new(vec![0.0; 100], 0, 0, 0);
        assert_eq!(chunk.duration(), Duration::ZERO);
    }

    #[test]
    fn test_empty_chunk() {
        let chunk = AudioChunk::new(vec![], 3, 7, 44100);
        assert!(chunk.is_empty());
        assert_eq!(chunk.len(), 0);
        assert!(chunk.to_le_bytes().is_empty());
    }

    #[test]
    fn test_le_bytes_layout() {
        let chunk = AudioChunk::new(vec![1.0, -0.5], 0, 0, 48000);
        let bytes = chunk.to_le_bytes();
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[0..4], &1.0f32.to_le_bytes());
        assert_eq!(&bytes[4..8], &(-0.5f32).to_le_bytes());
    }

    #[test]
    fn test_clone_shares_samples() {
        let chunk = AudioChunk::new(vec![0.25; 256], 0, 0, 48000);
        let cloned = chunk.clone();
        assert!(Arc::ptr_eq(&chunk.samples, &cloned.samples));
    }
}
