//! Error types for splutter.
//!
//! Errors are split into two categories:
//! - **Caller errors** ([`SplutterError`]): returned synchronously from routing
//!   commands and engine setup
//! - **Sink errors** ([`SinkError`]): raised by chunk destinations and surfaced
//!   through the [`EventCallback`](crate::EventCallback)

use std::path::PathBuf;

/// Errors returned by the routing coordinator and the audio engines.
///
/// Routing commands fail fast: calling them before the audio context exists,
/// or before an input stream has been handled, is an error rather than a
/// silent no-op.
#[derive(Debug, thiserror::Error)]
pub enum SplutterError {
    /// A routing command was issued before [`Audio::resume()`] created the context.
    ///
    /// [`Audio::resume()`]: crate::Audio::resume
    #[error("audio context not created (call resume first)")]
    ContextNotCreated,

    /// A channel command was issued before any input stream was handled.
    #[error("no input stream handled yet")]
    NoInputStream,

    /// The input channel index does not exist.
    #[error("unknown input channel {index} ({available} available)")]
    UnknownInputChannel {
        /// Requested input channel.
        index: usize,
        /// Number of known input channels.
        available: usize,
    },

    /// The output channel index does not exist on the destination.
    #[error("unknown output channel {index} ({available} available)")]
    UnknownOutputChannel {
        /// Requested output channel.
        index: usize,
        /// Number of destination channels.
        available: usize,
    },

    /// The processor block size is not a supported power of two.
    #[error("invalid buffer size {size} (must be a power of two between 256 and 16384)")]
    InvalidBufferSize {
        /// The rejected block size.
        size: usize,
    },

    /// A configuration value is out of range.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// What was wrong.
        reason: String,
    },

    /// The engine rejected a graph operation.
    #[error("graph error: {0}")]
    Graph(String),

    /// The requested audio device was not found.
    #[error("device not found: {name}")]
    DeviceNotFound {
        /// Name of the device that wasn't found.
        name: String,
    },

    /// No default input device is configured on this system.
    #[error("no default input device configured")]
    NoDefaultInputDevice,

    /// No default output device is configured on this system.
    #[error("no default output device configured")]
    NoDefaultOutputDevice,

    /// The device's sample format is not supported.
    #[error("unsupported sample format: {format}")]
    UnsupportedFormat {
        /// The format that wasn't supported.
        format: String,
    },

    /// The input device cannot capture at the context sample rate.
    #[error("sample rate {requested}Hz not supported by {device}")]
    UnsupportedSampleRate {
        /// The context sample rate.
        requested: u32,
        /// Device that rejected it.
        device: String,
    },

    /// A sink failed to start.
    #[error("sink '{sink_name}' failed to start: {reason}")]
    SinkStartFailed {
        /// Name of the sink that failed.
        sink_name: String,
        /// Reason for the failure.
        reason: String,
    },

    /// An error from the underlying audio library (CPAL).
    #[error("audio backend error: {0}")]
    BackendError(String),
}

impl SplutterError {
    /// Creates a graph error with the given message.
    pub fn graph(msg: impl Into<String>) -> Self {
        Self::Graph(msg.into())
    }
}

/// Errors that can occur within a [`Sink`](crate::Sink) implementation.
///
/// Sink errors are recoverable - the router emits a
/// [`SplutterEvent::SinkError`] and moves on to the next chunk. Chunks are
/// not retried.
///
/// [`SplutterEvent::SinkError`]: crate::SplutterEvent::SinkError
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// File I/O error.
    #[error("file error: {path}: {source}")]
    FileError {
        /// Path to the file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Custom error for user-implemented sinks.
    #[error("{0}")]
    Custom(String),
}

impl SinkError {
    /// Creates a custom sink error with the given message.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Creates a file error for the given path.
    pub fn file_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileError {
            path: path.into(),
            source,
        }
    }
}
