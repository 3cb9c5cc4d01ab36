//! Audio-processing graph abstraction.
//!
//! The routing core never touches audio samples directly between nodes. It
//! holds opaque [`NodeId`] handles and drives an engine through
//! [`AudioContext`]:
//!
//! ```text
//! stream source → splitter → lowpass[i] → processor[i] → merger → destination
//! ```
//!
//! Two engines ship with the crate:
//!
//! - [`CpalBackend`]: renders the graph into a real output device
//! - [`MockBackend`]: records graph edits in memory, for tests and CI
//!
//! Engines may reject disconnecting an edge that was never connected, so
//! callers track wiring themselves and only disconnect edges they know exist.

mod cpal_backend;
mod engine;
mod lowpass;
mod mock;

pub use cpal_backend::{
    default_input_device_name, list_input_devices, list_output_devices, CpalBackend,
    CpalContext, CpalInput,
};
pub use mock::{MockBackend, MockContext, MockProbe, MockStream};

pub(crate) use engine::RenderGraph;
pub(crate) use lowpass::Biquad;

use crate::SplutterError;

/// Opaque handle to a node owned by an [`AudioContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A directed connection from one node output to another node input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    /// Node producing audio.
    pub from: NodeId,
    /// Output port on `from`.
    pub output: usize,
    /// Node consuming audio.
    pub to: NodeId,
    /// Input port on `to`.
    pub input: usize,
}

impl Edge {
    /// Creates an edge `from:output -> to:input`.
    pub fn new(from: NodeId, output: usize, to: NodeId, input: usize) -> Self {
        Self {
            from,
            output,
            to,
            input,
        }
    }
}

impl std::fmt::Display for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{}",
            self.from, self.output, self.to, self.input
        )
    }
}

/// Run state of an audio context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// Created or paused; no blocks are rendered.
    Suspended,
    /// Rendering blocks on the engine's schedule.
    Running,
    /// Torn down; the context cannot be resumed.
    Closed,
}

/// How a multi-channel input is mapped onto a node's channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelInterpretation {
    /// Up/down-mix using speaker layouts (mono is copied to left and right).
    Speakers,
    /// Channel `i` maps to channel `i`; extra channels are dropped, missing
    /// ones are silent.
    #[default]
    Discrete,
}

/// Per-block audio callback hosted by a processor node.
///
/// Called on the engine's real-time thread once per fixed-size block. The
/// engine may reuse `input` across calls; implementations that keep the
/// samples must copy them.
pub trait BlockProcessor: Send {
    /// Processes one block. `input` and `output` have the block size.
    fn process(&mut self, input: &[f32], output: &mut [f32]);
}

/// Factory for audio contexts.
///
/// The routing coordinator calls [`create_context`](Self::create_context)
/// once, on its first resume.
pub trait AudioBackend {
    /// Context type produced by this backend.
    type Context: AudioContext;

    /// Creates a new context.
    ///
    /// # Errors
    ///
    /// Returns an error if the output device cannot be opened.
    fn create_context(&self) -> Result<Self::Context, SplutterError>;
}

/// A live audio engine instance and the graph it renders.
pub trait AudioContext {
    /// Input stream accepted by [`create_stream_source`](Self::create_stream_source).
    type Stream;

    /// Returns the current run state.
    fn state(&self) -> ContextState;

    /// Stops rendering. Suspending a suspended context is a no-op.
    fn suspend(&mut self) -> Result<(), SplutterError>;

    /// Starts rendering. The engine may begin delivering blocks after this returns.
    fn resume(&mut self) -> Result<(), SplutterError>;

    /// Releases the device. The context cannot be used afterwards.
    fn close(&mut self) -> Result<(), SplutterError>;

    /// Sample rate in Hz.
    fn sample_rate(&self) -> u32;

    /// Largest channel count the destination supports.
    fn max_output_channels(&self) -> usize;

    /// Sets the destination channel count and interpretation, returning the
    /// channel count actually applied.
    fn configure_destination(
        &mut self,
        channels: usize,
        interpretation: ChannelInterpretation,
    ) -> Result<usize, SplutterError>;

    /// The destination node (one input port).
    fn destination(&self) -> NodeId;

    /// Creates a source node for `stream`, returning it with its channel count.
    fn create_stream_source(
        &mut self,
        stream: Self::Stream,
    ) -> Result<(NodeId, usize), SplutterError>;

    /// Creates a node splitting one multi-channel input into `outputs` mono outputs.
    fn create_splitter(&mut self, outputs: usize) -> Result<NodeId, SplutterError>;

    /// Creates a node merging `inputs` mono inputs into one multi-channel output.
    fn create_merger(&mut self, inputs: usize) -> Result<NodeId, SplutterError>;

    /// Creates a mono lowpass filter node.
    fn create_lowpass(&mut self, cutoff_hz: f32, q: f32) -> Result<NodeId, SplutterError>;

    /// Creates a mono node that hands fixed-size blocks to `processor`.
    fn create_processor(
        &mut self,
        block_size: usize,
        processor: Box<dyn BlockProcessor>,
    ) -> Result<NodeId, SplutterError>;

    /// Adds an edge to the graph.
    fn connect(&mut self, edge: Edge) -> Result<(), SplutterError>;

    /// Removes an edge from the graph.
    fn disconnect(&mut self, edge: Edge) -> Result<(), SplutterError>;

    /// Removes a node and every edge touching it.
    fn release(&mut self, node: NodeId) -> Result<(), SplutterError>;
}
