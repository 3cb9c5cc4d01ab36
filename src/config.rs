//! Configuration types for routing and the hardware engine.

use std::time::Duration;

use crate::graph::ChannelInterpretation;
use crate::SplutterError;

/// Default processor block size in samples.
pub const DEFAULT_BUFFER_SIZE: usize = 16384;

/// Smallest block size a processor node accepts.
pub const MIN_BUFFER_SIZE: usize = 256;

/// Largest block size a processor node accepts.
pub const MAX_BUFFER_SIZE: usize = 16384;

/// Configuration for the routing coordinator and its per-channel nodes.
///
/// Use [`RoutingConfig::default()`] for the standard setup, or customize as needed.
///
/// # Example
///
/// ```
/// use splutter::RoutingConfig;
///
/// let config = RoutingConfig {
///     buffer_size: 4096,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct RoutingConfig {
    /// Samples per processor block, and therefore per recorded chunk.
    ///
    /// Must be a power of two between 256 and 16384.
    /// Default: 16384
    pub buffer_size: usize,

    /// Cutoff of the per-channel lowpass filter in Hz.
    ///
    /// Default: 6000
    pub lowpass_cutoff_hz: f32,

    /// Quality factor of the per-channel lowpass filter.
    ///
    /// Default: 1/√2 (Butterworth)
    pub lowpass_q: f32,

    /// How the destination interprets merged channels.
    ///
    /// `Discrete` keeps every input lane on its own output channel instead
    /// of letting the engine downmix.
    /// Default: `Discrete`
    pub channel_interpretation: ChannelInterpretation,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            lowpass_cutoff_hz: 6000.0,
            lowpass_q: std::f32::consts::FRAC_1_SQRT_2,
            channel_interpretation: ChannelInterpretation::Discrete,
        }
    }
}

impl RoutingConfig {
    /// Checks that every value is usable by the engines.
    ///
    /// # Errors
    ///
    /// Returns `InvalidBufferSize` or `InvalidConfig` for out-of-range values.
    pub fn validate(&self) -> Result<(), SplutterError> {
        if !self.buffer_size.is_power_of_two()
            || !(MIN_BUFFER_SIZE..=MAX_BUFFER_SIZE).contains(&self.buffer_size)
        {
            return Err(SplutterError::InvalidBufferSize {
                size: self.buffer_size,
            });
        }
        if !self.lowpass_cutoff_hz.is_finite() || self.lowpass_cutoff_hz <= 0.0 {
            return Err(SplutterError::InvalidConfig {
                reason: format!("lowpass cutoff {}Hz", self.lowpass_cutoff_hz),
            });
        }
        if !self.lowpass_q.is_finite() || self.lowpass_q <= 0.0 {
            return Err(SplutterError::InvalidConfig {
                reason: format!("lowpass q {}", self.lowpass_q),
            });
        }
        Ok(())
    }
}

/// Configuration for the CPAL-backed engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Capacity of the ring buffer between the input device and the graph.
    ///
    /// Input that arrives while the graph is not pulling (context suspended,
    /// nothing routed) overwrites nothing; new samples are dropped once full.
    /// Default: 2 seconds
    pub input_buffer_duration: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            input_buffer_duration: Duration::from_secs(2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_config_defaults() {
        let config = RoutingConfig::default();
        assert_eq!(config.buffer_size, 16384);
        assert!((config.lowpass_cutoff_hz - 6000.0).abs() < f32::EPSILON);
        assert_eq!(
            config.channel_interpretation,
            ChannelInterpretation::Discrete
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_buffer_size_must_be_power_of_two() {
        let config = RoutingConfig {
            buffer_size: 1000,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SplutterError::InvalidBufferSize { size: 1000 })
        ));
    }

    #[test]
    fn test_buffer_size_range() {
        for size in [128, 32768] {
            let config = RoutingConfig {
                buffer_size: size,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "{size} should be rejected");
        }
        for size in [256, 1024, 16384] {
            let config = RoutingConfig {
                buffer_size: size,
                ..Default::default()
            };
            assert!(config.validate().is_ok(), "{size} should be accepted");
        }
    }

    #[test]
    fn test_negative_cutoff_rejected() {
        let config = RoutingConfig {
            lowpass_cutoff_hz: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SplutterError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_engine_config_defaults() {
        assert_eq!(
            EngineConfig::default().input_buffer_duration,
            Duration::from_secs(2)
        );
    }
}
