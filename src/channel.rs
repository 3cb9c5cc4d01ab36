//! Per-input-channel state machine and block processor.
//!
//! Each input channel owns a lowpass → processor node pair. The processor's
//! block callback runs on the engine thread and only ever *reads* the
//! channel state; commands mutate it from the control thread. The state is
//! shared through an atomic, so neither side ever waits on the other.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::graph::{AudioContext, BlockProcessor, Edge, NodeId};
use crate::{AudioChunk, ChunkCallback, RoutingConfig, SplutterError, StateCallback};

/// Mute/record/output status of one input channel.
///
/// Variants are ordered by capability, not magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ChannelState {
    /// Node graph not yet wired; every command is a no-op.
    Connecting = 0,
    /// Wired, silent, not recording.
    Connected = 1,
    /// Passing audio through, not recording.
    Outputting = 2,
    /// Capturing chunks, silent on output.
    Recording = 3,
    /// Passing audio through and capturing chunks.
    OutputtingAndRecording = 4,
}

/// Commands accepted by a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelCommand {
    /// Pass audio through to the output.
    Unmute,
    /// Silence the output.
    Mute,
    /// Start delivering chunks.
    Record,
    /// Stop delivering chunks.
    Stop,
}

impl ChannelState {
    /// Returns the state reached by applying `command`.
    ///
    /// `Connecting` absorbs every command.
    pub fn transition(self, command: ChannelCommand) -> Self {
        use ChannelCommand::{Mute, Record, Stop, Unmute};
        use ChannelState::{Connected, Connecting, Outputting, OutputtingAndRecording, Recording};

        match (self, command) {
            (Connecting, _) => Connecting,

            (Connected | Outputting, Unmute) => Outputting,
            (Recording | OutputtingAndRecording, Unmute) => OutputtingAndRecording,

            (Connected | Outputting, Mute) => Connected,
            (Recording | OutputtingAndRecording, Mute) => Recording,

            (Connected | Recording, Record) => Recording,
            (Outputting | OutputtingAndRecording, Record) => OutputtingAndRecording,

            (Connected | Recording, Stop) => Connected,
            (Outputting | OutputtingAndRecording, Stop) => Outputting,
        }
    }

    /// Returns `true` unless the state passes audio through.
    pub fn is_muted(self) -> bool {
        !matches!(self, Self::Outputting | Self::OutputtingAndRecording)
    }

    /// Returns `true` if the state delivers chunks.
    pub fn is_recording(self) -> bool {
        matches!(self, Self::Recording | Self::OutputtingAndRecording)
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connected,
            2 => Self::Outputting,
            3 => Self::Recording,
            4 => Self::OutputtingAndRecording,
            _ => Self::Connecting,
        }
    }
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Outputting => "outputting",
            Self::Recording => "recording",
            Self::OutputtingAndRecording => "outputting and recording",
        };
        f.write_str(name)
    }
}

/// Channel state readable from the engine thread.
struct SharedState(AtomicU8);

impl SharedState {
    fn new(state: ChannelState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    fn load(&self) -> ChannelState {
        ChannelState::from_u8(self.0.load(Ordering::SeqCst))
    }

    fn store(&self, state: ChannelState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }
}

/// Block callback installed on a channel's processor node.
struct ChannelProcessor {
    index: usize,
    state: Arc<SharedState>,
    on_chunk: Option<ChunkCallback>,
    /// Owned copy of the current input block, reused across blocks.
    block: Vec<f32>,
    /// Pre-allocated block of zeros written while muted.
    silence: Vec<f32>,
    sample_rate: u32,
    sequence: u64,
}

impl BlockProcessor for ChannelProcessor {
    fn process(&mut self, input: &[f32], output: &mut [f32]) {
        // The engine reuses its input buffer between blocks.
        self.block.clear();
        self.block.extend_from_slice(input);
        let state = self.state.load();

        if state.is_recording() {
            if let Some(ref on_chunk) = self.on_chunk {
                on_chunk(AudioChunk::new(
                    self.block.clone(),
                    self.index,
                    self.sequence,
                    self.sample_rate,
                ));
            }
        }
        self.sequence += 1;

        let source: &[f32] = if state.is_muted() {
            &self.silence
        } else {
            &self.block
        };
        let len = output.len().min(source.len());
        output[..len].copy_from_slice(&source[..len]);
        output[len..].fill(0.0);
    }
}

/// One input channel: its node pair and its state machine.
///
/// Channels are created and owned by [`Audio`](crate::Audio), which keeps
/// the connection matrix in step with every command. Read access is public;
/// commands go through the coordinator.
pub struct Channel {
    index: usize,
    state: Arc<SharedState>,
    input: NodeId,
    output: NodeId,
    listener: Option<StateCallback>,
}

impl Channel {
    /// Wires `lowpass → processor` for input channel `index`.
    pub(crate) fn new<C: AudioContext>(
        index: usize,
        listener: Option<StateCallback>,
        on_chunk: Option<ChunkCallback>,
        context: &mut C,
        config: &RoutingConfig,
    ) -> Result<Self, SplutterError> {
        let state = Arc::new(SharedState::new(ChannelState::Connecting));

        let input = context.create_lowpass(config.lowpass_cutoff_hz, config.lowpass_q)?;
        let processor = ChannelProcessor {
            index,
            state: Arc::clone(&state),
            on_chunk,
            block: Vec::with_capacity(config.buffer_size),
            silence: vec![0.0; config.buffer_size],
            sample_rate: context.sample_rate(),
            sequence: 0,
        };
        let output = match context.create_processor(config.buffer_size, Box::new(processor)) {
            Ok(node) => node,
            Err(e) => {
                let _ = context.release(input);
                return Err(e);
            }
        };
        if let Err(e) = context.connect(Edge::new(input, 0, output, 0)) {
            let _ = context.release(output);
            let _ = context.release(input);
            return Err(e);
        }

        state.store(ChannelState::Connected);
        tracing::debug!(channel = index, %input, %output, "channel connected");

        Ok(Self {
            index,
            state,
            input,
            output,
            listener,
        })
    }

    fn apply(&self, command: ChannelCommand) {
        let current = self.state.load();
        if current == ChannelState::Connecting {
            return;
        }

        let next = current.transition(command);
        self.state.store(next);
        tracing::debug!(channel = self.index, ?command, from = %current, to = %next, "channel state");

        if let Some(ref listener) = self.listener {
            listener(self.index, next);
        }
    }

    pub(crate) fn unmute(&self) {
        self.apply(ChannelCommand::Unmute);
    }

    pub(crate) fn mute(&self) {
        self.apply(ChannelCommand::Mute);
    }

    pub(crate) fn record(&self) {
        self.apply(ChannelCommand::Record);
    }

    pub(crate) fn stop(&self) {
        self.apply(ChannelCommand::Stop);
    }

    /// Index of the input channel, stable for the channel's lifetime.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Current state.
    pub fn state(&self) -> ChannelState {
        self.state.load()
    }

    /// Returns `true` unless the channel passes audio through.
    pub fn is_muted(&self) -> bool {
        self.state().is_muted()
    }

    /// Returns `true` while the channel delivers chunks.
    pub fn is_recording(&self) -> bool {
        self.state().is_recording()
    }

    /// The lowpass node fed by the splitter.
    pub fn input_node(&self) -> NodeId {
        self.input
    }

    /// The processor node wired to the merger.
    pub fn output_node(&self) -> NodeId {
        self.output
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("index", &self.index)
            .field("state", &self.state())
            .field("input", &self.input)
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}
