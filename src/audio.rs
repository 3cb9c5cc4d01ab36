//! The routing coordinator.

use crate::graph::{AudioBackend, AudioContext, ContextState, Edge, NodeId};
use crate::{
    AudioBuilder, Channel, ChannelState, ChunkCallback, ConnectionMatrix, ConnectionState,
    RoutingConfig, SplutterError, StateCallback,
};

/// Nodes belonging to the currently handled input stream.
struct InputStage {
    source: NodeId,
    splitter: NodeId,
    /// Splitter outputs wired to channel inputs, counted from 0.
    wired: usize,
}

/// The context plus the nodes that live as long as it does.
struct Engine<C> {
    context: C,
    merger: NodeId,
    output_channels: usize,
    input: Option<InputStage>,
}

impl<C: AudioContext> Engine<C> {
    fn create<B>(backend: &B, config: &RoutingConfig) -> Result<Self, SplutterError>
    where
        B: AudioBackend<Context = C>,
    {
        let mut context = backend.create_context()?;
        // Some engines start running and reject a resume that wasn't preceded by a suspend.
        context.suspend()?;

        let max_channels = context.max_output_channels();
        let output_channels =
            context.configure_destination(max_channels, config.channel_interpretation)?;

        let merger = context.create_merger(output_channels)?;
        let destination = context.destination();
        context.connect(Edge::new(merger, 0, destination, 0))?;

        tracing::info!(
            sample_rate = context.sample_rate(),
            output_channels,
            "audio context created"
        );

        Ok(Self {
            context,
            merger,
            output_channels,
            input: None,
        })
    }
}

/// Routes live input channels to output channels and taps recorded
/// channels into a chunk callback.
///
/// `Audio` owns the engine context, the stream splitter, the merger feeding
/// the destination, one [`Channel`] per detected input, and a
/// [`ConnectionMatrix`] that always matches the processor → merger edges in
/// the graph.
///
/// While a channel records, some engines stop pulling its processor unless
/// the processor has a path to the destination. The coordinator therefore
/// keeps at least one merger edge alive for every recording channel, even
/// when that channel is muted.
///
/// # Example
///
/// ```
/// use splutter::{Audio, ChannelState, MockBackend, MockStream};
///
/// let mut audio = Audio::builder(MockBackend::new(2))
///     .buffer_size(1024)
///     .on_chunk(|chunk| println!("channel {}: {} samples", chunk.channel, chunk.len()))
///     .build()?;
///
/// audio.resume()?;
/// let inputs = audio.handle_input_stream(MockStream::new(2))?;
/// assert_eq!(inputs, 2);
///
/// audio.unmute_output_for_input(0, 1)?;
/// assert_eq!(audio.channel_state(0), Some(ChannelState::Outputting));
///
/// audio.stop_all()?;
/// # Ok::<(), splutter::SplutterError>(())
/// ```
pub struct Audio<B: AudioBackend> {
    backend: B,
    config: RoutingConfig,
    on_chunk: Option<ChunkCallback>,
    on_state_change: Option<StateCallback>,
    engine: Option<Engine<B::Context>>,
    channels: Vec<Channel>,
    connections: ConnectionMatrix,
}

impl<B: AudioBackend> Audio<B> {
    /// Creates a builder for a coordinator driving `backend`.
    pub fn builder(backend: B) -> AudioBuilder<B> {
        AudioBuilder::new(backend)
    }

    pub(crate) fn from_parts(
        backend: B,
        config: RoutingConfig,
        on_chunk: Option<ChunkCallback>,
        on_state_change: Option<StateCallback>,
    ) -> Self {
        Self {
            backend,
            config,
            on_chunk,
            on_state_change,
            engine: None,
            channels: Vec::new(),
            connections: ConnectionMatrix::new(),
        }
    }

    /// Creates the context on first call, then resumes it if suspended.
    ///
    /// The first call suspends the new context, opens the destination to
    /// every available channel, and wires a merger into it.
    ///
    /// # Errors
    ///
    /// Returns any error the backend reports while creating or resuming the context.
    pub fn resume(&mut self) -> Result<(), SplutterError> {
        if self.engine.is_none() {
            self.engine = Some(Engine::create(&self.backend, &self.config)?);
        }
        let Some(engine) = self.engine.as_mut() else {
            return Err(SplutterError::ContextNotCreated);
        };

        if engine.context.state() == ContextState::Suspended {
            engine.context.resume()?;
        }
        Ok(())
    }

    /// Attaches a new input stream and returns its channel count.
    ///
    /// The previous stream's source and splitter are unwired and released.
    /// Channels already seen keep their state; new indices get a fresh
    /// [`Channel`] and a matrix row of `NotConnected` cells.
    ///
    /// # Errors
    ///
    /// Returns `ContextNotCreated` before [`resume`](Self::resume), or any graph error.
    pub fn handle_input_stream(
        &mut self,
        stream: <B::Context as AudioContext>::Stream,
    ) -> Result<usize, SplutterError> {
        let engine = self
            .engine
            .as_mut()
            .ok_or(SplutterError::ContextNotCreated)?;

        // The previous stage is forgotten only once fully unwired.
        if let Some(previous) = engine.input.as_mut() {
            while previous.wired > 0 {
                let index = previous.wired - 1;
                engine.context.disconnect(Edge::new(
                    previous.splitter,
                    index,
                    self.channels[index].input_node(),
                    0,
                ))?;
                previous.wired = index;
            }
        }
        if let Some(previous) = engine.input.take() {
            engine.context.release(previous.splitter)?;
            engine.context.release(previous.source)?;
            tracing::debug!(source = %previous.source, "previous input stream released");
        }

        let (source, channels) = engine.context.create_stream_source(stream)?;
        let splitter = engine.context.create_splitter(channels)?;
        engine.context.connect(Edge::new(source, 0, splitter, 0))?;
        let stage = engine.input.insert(InputStage {
            source,
            splitter,
            wired: 0,
        });

        for index in 0..channels {
            if index == self.channels.len() {
                let channel = Channel::new(
                    index,
                    self.on_state_change.clone(),
                    self.on_chunk.clone(),
                    &mut engine.context,
                    &self.config,
                )?;
                self.channels.push(channel);
            }
            let input = self.channels[index].input_node();
            engine.context.connect(Edge::new(splitter, index, input, 0))?;
            stage.wired += 1;
        }

        self.connections
            .grow(self.channels.len(), engine.output_channels);

        tracing::info!(
            channels,
            known_channels = self.channels.len(),
            "input stream attached"
        );
        Ok(channels)
    }

    /// Starts recording `input`.
    ///
    /// Does nothing if the channel is already recording. A channel with no
    /// connected output is first wired to output 0.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown channel, or if wiring output 0 fails.
    pub fn record_channel(&mut self, input: usize) -> Result<(), SplutterError> {
        self.check_input(input)?;
        if self.channels[input].is_recording() {
            return Ok(());
        }

        if self.connections.connected_count(input) == 0 {
            self.check_output(0)?;
            self.connect_output(input, 0)?;
        }
        self.channels[input].record();
        Ok(())
    }

    /// Stops recording `input`.
    ///
    /// A channel that ends up muted loses all its output edges; one that is
    /// still outputting keeps them.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown channel, or if a disconnect fails.
    pub fn stop_record_channel(&mut self, input: usize) -> Result<(), SplutterError> {
        self.check_input(input)?;
        self.channels[input].stop();

        if self.channels[input].is_muted() {
            for output in self.connections.connected_in_row(input) {
                self.disconnect_output(input, output)?;
            }
        }
        Ok(())
    }

    /// Routes `input` to `output` and unmutes the channel.
    ///
    /// If the channel is recording while muted, its other outputs are
    /// disconnected so only `output` stays wired.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown channel or output, or on a graph failure.
    pub fn unmute_output_for_input(
        &mut self,
        input: usize,
        output: usize,
    ) -> Result<(), SplutterError> {
        self.check_input(input)?;
        self.check_output(output)?;

        if !self.connections.get(input, output).is_connected() {
            self.connect_output(input, output)?;
        }

        let channel = &self.channels[input];
        if channel.is_recording() && channel.is_muted() {
            for other in self.connections.connected_in_row(input) {
                if other != output {
                    self.disconnect_output(input, other)?;
                }
            }
        }

        if self.channels[input].is_muted() {
            self.channels[input].unmute();
        }
        Ok(())
    }

    /// Unroutes `input` from `output` and mutes the channel.
    ///
    /// Does nothing if the pair is not connected. The edge stays in place
    /// when it is the last one keeping a recording channel alive; the
    /// channel is muted either way.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown channel or output, or if the disconnect fails.
    pub fn mute_output_for_input(
        &mut self,
        input: usize,
        output: usize,
    ) -> Result<(), SplutterError> {
        self.check_input(input)?;
        self.check_output(output)?;

        if !self.connections.get(input, output).is_connected() {
            return Ok(());
        }

        if !self.channels[input].is_recording() || self.connections.connected_count(input) > 1 {
            self.disconnect_output(input, output)?;
        }
        self.channels[input].mute();
        Ok(())
    }

    /// Stops every recording, mutes every route, then suspends the context.
    ///
    /// Nodes stay allocated, so a later [`resume`](Self::resume) picks up
    /// where this left off. Without a context this is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the first graph or backend error; the remaining steps are
    /// safe to retry.
    pub fn stop_all(&mut self) -> Result<(), SplutterError> {
        if self.engine.is_none() {
            return Ok(());
        }

        let outputs = self.output_channel_count();
        for input in 0..self.channels.len() {
            self.stop_record_channel(input)?;
            for output in 0..outputs {
                self.mute_output_for_input(input, output)?;
            }
        }

        if let Some(engine) = self.engine.as_mut() {
            engine.context.suspend()?;
        }
        tracing::info!(channels = self.channels.len(), "all channels stopped");
        Ok(())
    }

    /// Stops everything and closes the context.
    ///
    /// # Errors
    ///
    /// Returns any error from [`stop_all`](Self::stop_all) or from closing.
    pub fn close(mut self) -> Result<(), SplutterError> {
        self.stop_all()?;
        if let Some(mut engine) = self.engine.take() {
            engine.context.close()?;
        }
        Ok(())
    }

    /// Sample rate of the context, once created.
    pub fn sample_rate(&self) -> Option<u32> {
        self.engine.as_ref().map(|e| e.context.sample_rate())
    }

    /// Samples per processor block, and per recorded chunk.
    pub fn processor_buffer_size(&self) -> usize {
        self.config.buffer_size
    }

    /// Number of input channels seen across all handled streams.
    pub fn input_channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of destination channels; 0 before the context exists.
    pub fn output_channel_count(&self) -> usize {
        self.engine.as_ref().map_or(0, |e| e.output_channels)
    }

    /// Number of channels currently recording.
    pub fn recording_channel_count(&self) -> usize {
        self.channels.iter().filter(|c| c.is_recording()).count()
    }

    /// Run state of the context, once created.
    pub fn context_state(&self) -> Option<ContextState> {
        self.engine.as_ref().map(|e| e.context.state())
    }

    /// The channel for `input`, if it has been seen.
    pub fn channel(&self, input: usize) -> Option<&Channel> {
        self.channels.get(input)
    }

    /// All known channels, by index.
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// State of `input`'s channel, if it has been seen.
    pub fn channel_state(&self, input: usize) -> Option<ChannelState> {
        self.channels.get(input).map(Channel::state)
    }

    /// Wiring state of one (input, output) pair.
    pub fn connection(&self, input: usize, output: usize) -> ConnectionState {
        self.connections.get(input, output)
    }

    /// Outputs currently wired for `input`, ascending.
    pub fn connected_outputs(&self, input: usize) -> Vec<usize> {
        self.connections.connected_in_row(input)
    }

    /// The full connection matrix.
    pub fn connections(&self) -> &ConnectionMatrix {
        &self.connections
    }

    fn check_input(&self, input: usize) -> Result<(), SplutterError> {
        if self.engine.is_none() {
            return Err(SplutterError::ContextNotCreated);
        }
        if self.channels.is_empty() {
            return Err(SplutterError::NoInputStream);
        }
        if input >= self.channels.len() {
            return Err(SplutterError::UnknownInputChannel {
                index: input,
                available: self.channels.len(),
            });
        }
        Ok(())
    }

    fn check_output(&self, output: usize) -> Result<(), SplutterError> {
        let available = self.output_channel_count();
        if output >= available {
            return Err(SplutterError::UnknownOutputChannel {
                index: output,
                available,
            });
        }
        Ok(())
    }

    fn merger_edge(&self, input: usize, output: usize) -> Result<Edge, SplutterError> {
        let engine = self
            .engine
            .as_ref()
            .ok_or(SplutterError::ContextNotCreated)?;
        Ok(Edge::new(
            self.channels[input].output_node(),
            0,
            engine.merger,
            output,
        ))
    }

    fn connect_output(&mut self, input: usize, output: usize) -> Result<(), SplutterError> {
        let edge = self.merger_edge(input, output)?;
        if let Some(engine) = self.engine.as_mut() {
            engine.context.connect(edge)?;
        }
        self.connections
            .set(input, output, ConnectionState::Connected);
        tracing::debug!(input, output, %edge, "output connected");
        Ok(())
    }

    fn disconnect_output(&mut self, input: usize, output: usize) -> Result<(), SplutterError> {
        let edge = self.merger_edge(input, output)?;
        if let Some(engine) = self.engine.as_mut() {
            engine.context.disconnect(edge)?;
        }
        self.connections
            .set(input, output, ConnectionState::NotConnected);
        tracing::debug!(input, output, %edge, "output disconnected");
        Ok(())
    }
}

impl<B: AudioBackend> std::fmt::Debug for Audio<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Audio")
            .field("config", &self.config)
            .field("context_state", &self.context_state())
            .field("channels", &self.channels)
            .field("connections", &self.connections)
            .finish_non_exhaustive()
    }
}
