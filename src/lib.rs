//! # splutter
//!
//! **Note:** This crate is under active development. The API may change before 1.0.
//!
//! Multi-channel audio capture with per-channel routing and chunked recording.
//!
//! `splutter` splits a live multi-channel input into mono lanes, lets you
//! route any input lane to any output channel, and taps recording lanes into
//! fixed-size chunks for persistence or upload.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use splutter::pipeline::{chunk_forwarder, spawn_router, Router, DEFAULT_CHUNK_QUEUE};
//! use splutter::{Audio, CpalBackend, CpalInput, SequenceFileSink, Sink};
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//!
//! # async fn run() -> Result<(), splutter::SplutterError> {
//! let (tx, rx) = mpsc::channel(DEFAULT_CHUNK_QUEUE);
//! let sinks: Vec<Arc<dyn Sink>> = vec![Arc::new(SequenceFileSink::new("take-1"))];
//! let router = spawn_router(Router::new(sinks), rx).await?;
//!
//! let mut audio = Audio::builder(CpalBackend::new())
//!     .chunk_callback(chunk_forwarder(tx, None))
//!     .on_channel_state_change(|index, state| tracing::info!(index, %state, "channel"))
//!     .build()?;
//!
//! audio.resume()?;
//! audio.handle_input_stream(CpalInput::default_device())?;
//! audio.unmute_output_for_input(0, 0)?; // monitor input 0 on output 0
//! audio.record_channel(1)?;             // record input 1 silently
//!
//! // ...
//!
//! audio.close()?;
//! router.stop().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! input stream → splitter → lowpass[i] → processor[i] → merger[o] → destination
//!                                            │
//!                                            └─ chunks → forwarder → router → sinks
//! ```
//!
//! - **[`Audio`]**: owns the context and the [`ConnectionMatrix`]; every
//!   command edits channel state and graph edges together
//! - **[`Channel`]**: per-input state machine; its processor runs on the
//!   engine thread and only reads the state
//! - **[`graph`]**: engine abstraction with a CPAL implementation and an
//!   in-memory mock for tests
//! - **[`pipeline`]**: moves chunks off the engine thread to async sinks
//!
//! The engine callback never blocks: state is atomic, and chunks leave
//! through a bounded `try_send` queue.

#![warn(missing_docs)]
// Audio code requires intentional numeric casts between sample formats
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
// unwrap/expect allowed in tests only
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
// These doc lints are too strict for internal implementation details
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

mod audio;
mod builder;
mod channel;
mod chunk;
mod config;
mod error;
mod event;
pub mod graph;
pub mod pipeline;
mod routing;
mod sink;

pub use audio::Audio;
pub use builder::AudioBuilder;
pub use channel::{Channel, ChannelCommand, ChannelState};
pub use chunk::AudioChunk;
pub use config::{
    EngineConfig, RoutingConfig, DEFAULT_BUFFER_SIZE, MAX_BUFFER_SIZE, MIN_BUFFER_SIZE,
};
pub use error::{SinkError, SplutterError};
pub use event::{
    chunk_callback, event_callback, state_callback, ChunkCallback, EventCallback, SplutterEvent,
    StateCallback,
};
pub use graph::{
    default_input_device_name, list_input_devices, list_output_devices, AudioBackend,
    AudioContext, ChannelInterpretation, ContextState, CpalBackend, CpalContext, CpalInput,
    MockBackend, MockContext, MockProbe, MockStream,
};
pub use pipeline::chunk_forwarder;
pub use routing::{ConnectionMatrix, ConnectionState};
pub use sink::{PerChannelSink, SequenceFileSink, Sink};
