//! In-memory audio engine for testing without hardware.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::graph::{
    AudioBackend, AudioContext, BlockProcessor, ChannelInterpretation, ContextState, Edge, NodeId,
};
use crate::SplutterError;

/// A synthetic multi-channel input stream for [`MockBackend`].
///
/// # Example
///
/// ```
/// use splutter::MockStream;
///
/// let stream = MockStream::new(2).with_label("interface");
/// assert_eq!(stream.channels(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct MockStream {
    channels: usize,
    label: String,
}

impl MockStream {
    /// Creates a stream with the given channel count.
    pub fn new(channels: usize) -> Self {
        Self {
            channels,
            label: "mock".to_string(),
        }
    }

    /// Sets a label, for telling streams apart in tests.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Returns the channel count.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Returns the label.
    pub fn label(&self) -> &str {
        &self.label
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum MockNodeKind {
    Destination,
    Source { channels: usize },
    Splitter { outputs: usize },
    Merger { inputs: usize },
    Lowpass { cutoff_hz: f32 },
    Processor { block_size: usize },
}

impl MockNodeKind {
    fn output_ports(self) -> usize {
        match self {
            Self::Destination => 0,
            Self::Splitter { outputs } => outputs,
            _ => 1,
        }
    }

    fn input_ports(self) -> usize {
        match self {
            Self::Source { .. } => 0,
            Self::Merger { inputs } => inputs,
            _ => 1,
        }
    }
}

struct MockNode {
    kind: MockNodeKind,
    processor: Option<Box<dyn BlockProcessor>>,
}

struct MockState {
    contexts_created: usize,
    state: Option<ContextState>,
    suspend_calls: usize,
    resume_calls: usize,
    destination_channels: usize,
    interpretation: ChannelInterpretation,
    nodes: BTreeMap<NodeId, MockNode>,
    edges: HashSet<Edge>,
    next_id: u32,
    /// Connects/disconnects allowed before edits start failing.
    edit_budget: Option<usize>,
}

impl MockState {
    fn spend_edit(&mut self, edit: &str) -> Result<(), SplutterError> {
        match self.edit_budget.as_mut() {
            Some(0) => Err(SplutterError::graph(format!("injected {edit} failure"))),
            Some(remaining) => {
                *remaining -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn node(&self, id: NodeId) -> Result<MockNodeKind, SplutterError> {
        self.nodes
            .get(&id)
            .map(|n| n.kind)
            .ok_or_else(|| SplutterError::graph(format!("unknown node {id}")))
    }

    fn add_node(&mut self, kind: MockNodeKind, processor: Option<Box<dyn BlockProcessor>>) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, MockNode { kind, processor });
        id
    }

    fn ensure_open(&self) -> Result<(), SplutterError> {
        match self.state {
            Some(ContextState::Closed) => Err(SplutterError::graph("context closed")),
            None => Err(SplutterError::ContextNotCreated),
            _ => Ok(()),
        }
    }
}

/// A hardware-free [`AudioBackend`] that records every graph edit.
///
/// The mock is deliberately strict: connecting an edge twice or
/// disconnecting an edge that does not exist is an error, so any drift
/// between a caller's bookkeeping and the real wiring fails loudly.
///
/// # Example
///
/// ```
/// use splutter::{Audio, MockBackend, MockStream};
///
/// let backend = MockBackend::new(2);
/// let probe = backend.probe();
///
/// let mut audio = Audio::builder(backend).build()?;
/// audio.resume()?;
/// audio.handle_input_stream(MockStream::new(2))?;
/// audio.record_channel(0)?;
///
/// let output = audio.channel(0).unwrap().output_node();
/// assert!(probe.merger_inputs_from(output).contains(&0));
/// # Ok::<(), splutter::SplutterError>(())
/// ```
#[derive(Clone)]
pub struct MockBackend {
    shared: Arc<Mutex<MockState>>,
    sample_rate: u32,
    max_output_channels: usize,
}

impl MockBackend {
    /// Creates a backend whose destination supports `max_output_channels`.
    pub fn new(max_output_channels: usize) -> Self {
        Self {
            shared: Arc::new(Mutex::new(MockState {
                contexts_created: 0,
                state: None,
                suspend_calls: 0,
                resume_calls: 0,
                destination_channels: 2.min(max_output_channels),
                interpretation: ChannelInterpretation::Speakers,
                nodes: BTreeMap::new(),
                edges: HashSet::new(),
                next_id: 1,
                edit_budget: None,
            })),
            sample_rate: 48000,
            max_output_channels,
        }
    }

    /// Sets the sample rate reported by created contexts.
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Returns a probe for inspecting the engine after the backend is moved.
    pub fn probe(&self) -> MockProbe {
        MockProbe {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl AudioBackend for MockBackend {
    type Context = MockContext;

    fn create_context(&self) -> Result<MockContext, SplutterError> {
        let mut shared = self.shared.lock();
        shared.contexts_created += 1;
        // Contexts start running, as most engines do.
        shared.state = Some(ContextState::Running);
        shared.nodes.clear();
        shared.edges.clear();
        let destination = shared.add_node(MockNodeKind::Destination, None);

        Ok(MockContext {
            shared: Arc::clone(&self.shared),
            destination,
            sample_rate: self.sample_rate,
            max_output_channels: self.max_output_channels,
        })
    }
}

/// Context produced by [`MockBackend`].
pub struct MockContext {
    shared: Arc<Mutex<MockState>>,
    destination: NodeId,
    sample_rate: u32,
    max_output_channels: usize,
}

impl AudioContext for MockContext {
    type Stream = MockStream;

    fn state(&self) -> ContextState {
        self.shared.lock().state.unwrap_or(ContextState::Closed)
    }

    fn suspend(&mut self) -> Result<(), SplutterError> {
        let mut shared = self.shared.lock();
        shared.ensure_open()?;
        shared.suspend_calls += 1;
        shared.state = Some(ContextState::Suspended);
        Ok(())
    }

    fn resume(&mut self) -> Result<(), SplutterError> {
        let mut shared = self.shared.lock();
        shared.ensure_open()?;
        // Mirrors engines that reject resuming a context that was never suspended.
        if shared.state == Some(ContextState::Running) {
            return Err(SplutterError::graph("context already running"));
        }
        shared.resume_calls += 1;
        shared.state = Some(ContextState::Running);
        Ok(())
    }

    fn close(&mut self) -> Result<(), SplutterError> {
        let mut shared = self.shared.lock();
        shared.ensure_open()?;
        shared.state = Some(ContextState::Closed);
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn max_output_channels(&self) -> usize {
        self.max_output_channels
    }

    fn configure_destination(
        &mut self,
        channels: usize,
        interpretation: ChannelInterpretation,
    ) -> Result<usize, SplutterError> {
        let mut shared = self.shared.lock();
        shared.ensure_open()?;
        let channels = channels.min(self.max_output_channels);
        shared.destination_channels = channels;
        shared.interpretation = interpretation;
        Ok(channels)
    }

    fn destination(&self) -> NodeId {
        self.destination
    }

    fn create_stream_source(
        &mut self,
        stream: MockStream,
    ) -> Result<(NodeId, usize), SplutterError> {
        let mut shared = self.shared.lock();
        shared.ensure_open()?;
        let channels = stream.channels;
        Ok((
            shared.add_node(MockNodeKind::Source { channels }, None),
            channels,
        ))
    }

    fn create_splitter(&mut self, outputs: usize) -> Result<NodeId, SplutterError> {
        let mut shared = self.shared.lock();
        shared.ensure_open()?;
        Ok(shared.add_node(MockNodeKind::Splitter { outputs }, None))
    }

    fn create_merger(&mut self, inputs: usize) -> Result<NodeId, SplutterError> {
        let mut shared = self.shared.lock();
        shared.ensure_open()?;
        Ok(shared.add_node(MockNodeKind::Merger { inputs }, None))
    }

    fn create_lowpass(&mut self, cutoff_hz: f32, _q: f32) -> Result<NodeId, SplutterError> {
        let mut shared = self.shared.lock();
        shared.ensure_open()?;
        Ok(shared.add_node(MockNodeKind::Lowpass { cutoff_hz }, None))
    }

    fn create_processor(
        &mut self,
        block_size: usize,
        processor: Box<dyn BlockProcessor>,
    ) -> Result<NodeId, SplutterError> {
        let mut shared = self.shared.lock();
        shared.ensure_open()?;
        Ok(shared.add_node(MockNodeKind::Processor { block_size }, Some(processor)))
    }

    fn connect(&mut self, edge: Edge) -> Result<(), SplutterError> {
        let mut shared = self.shared.lock();
        shared.ensure_open()?;
        shared.spend_edit("connect")?;
        if edge.output >= shared.node(edge.from)?.output_ports()
            || edge.input >= shared.node(edge.to)?.input_ports()
        {
            return Err(SplutterError::graph(format!("invalid ports on {edge}")));
        }
        if !shared.edges.insert(edge) {
            return Err(SplutterError::graph(format!("edge {edge} already connected")));
        }
        Ok(())
    }

    fn disconnect(&mut self, edge: Edge) -> Result<(), SplutterError> {
        let mut shared = self.shared.lock();
        shared.ensure_open()?;
        shared.spend_edit("disconnect")?;
        if !shared.edges.remove(&edge) {
            return Err(SplutterError::graph(format!("edge {edge} not connected")));
        }
        Ok(())
    }

    fn release(&mut self, node: NodeId) -> Result<(), SplutterError> {
        let mut shared = self.shared.lock();
        shared.ensure_open()?;
        shared
            .nodes
            .remove(&node)
            .ok_or_else(|| SplutterError::graph(format!("unknown node {node}")))?;
        shared.edges.retain(|e| e.from != node && e.to != node);
        Ok(())
    }
}

/// Read access to a [`MockBackend`]'s engine state.
#[derive(Clone)]
pub struct MockProbe {
    shared: Arc<Mutex<MockState>>,
}

impl MockProbe {
    /// Number of contexts the backend has created.
    pub fn contexts_created(&self) -> usize {
        self.shared.lock().contexts_created
    }

    /// Run state of the current context, if one exists.
    pub fn context_state(&self) -> Option<ContextState> {
        self.shared.lock().state
    }

    /// Number of `suspend` calls on the current context.
    pub fn suspend_calls(&self) -> usize {
        self.shared.lock().suspend_calls
    }

    /// Number of successful `resume` calls on the current context.
    pub fn resume_calls(&self) -> usize {
        self.shared.lock().resume_calls
    }

    /// Destination channel count and interpretation.
    pub fn destination_config(&self) -> (usize, ChannelInterpretation) {
        let shared = self.shared.lock();
        (shared.destination_channels, shared.interpretation)
    }

    /// All edges currently in the graph.
    pub fn edges(&self) -> Vec<Edge> {
        self.shared.lock().edges.iter().copied().collect()
    }

    /// Returns `true` if `edge` is in the graph.
    pub fn is_connected(&self, edge: Edge) -> bool {
        self.shared.lock().edges.contains(&edge)
    }

    /// Number of live nodes, including the destination.
    pub fn node_count(&self) -> usize {
        self.shared.lock().nodes.len()
    }

    /// Merger input ports fed by output 0 of `node`.
    pub fn merger_inputs_from(&self, node: NodeId) -> BTreeSet<usize> {
        let shared = self.shared.lock();
        shared
            .edges
            .iter()
            .filter(|e| e.from == node && e.output == 0)
            .filter(|e| {
                matches!(
                    shared.nodes.get(&e.to).map(|n| n.kind),
                    Some(MockNodeKind::Merger { .. })
                )
            })
            .map(|e| e.input)
            .collect()
    }

    /// Number of edges ending at `node`.
    pub fn inbound_edges(&self, node: NodeId) -> usize {
        self.shared.lock().edges.iter().filter(|e| e.to == node).count()
    }

    /// Cutoff of a lowpass node.
    pub fn lowpass_cutoff(&self, node: NodeId) -> Option<f32> {
        match self.shared.lock().nodes.get(&node)?.kind {
            MockNodeKind::Lowpass { cutoff_hz } => Some(cutoff_hz),
            _ => None,
        }
    }

    /// Runs a processor node's block callback on `input`, as the engine's
    /// real-time thread would, and returns the output block.
    ///
    /// Returns `None` if `node` is not a processor.
    pub fn process_block(&self, node: NodeId, input: &[f32]) -> Option<Vec<f32>> {
        let mut shared = self.shared.lock();
        let mock = shared.nodes.get_mut(&node)?;
        let MockNodeKind::Processor { block_size } = mock.kind else {
            return None;
        };
        let processor = mock.processor.as_mut()?;

        let mut block = vec![0.0; block_size];
        let len = input.len().min(block_size);
        block[..len].copy_from_slice(&input[..len]);
        // Sentinel values prove the processor writes every output sample.
        let mut output = vec![f32::NAN; block_size];
        processor.process(&block, &mut output);
        Some(output)
    }

    /// Makes every subsequent connect/disconnect fail, or stops failing.
    pub fn fail_graph_edits(&self, fail: bool) {
        self.shared.lock().edit_budget = fail.then_some(0);
    }

    /// Lets `edits` more connects/disconnects succeed, then fails the rest.
    pub fn fail_graph_edits_after(&self, edits: usize) {
        self.shared.lock().edit_budget = Some(edits);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Doubler;

    impl BlockProcessor for Doubler {
        fn process(&mut self, input: &[f32], output: &mut [f32]) {
            for (o, i) in output.iter_mut().zip(input) {
                *o = i * 2.0;
            }
        }
    }

    #[test]
    fn test_context_starts_running() {
        let backend = MockBackend::new(2);
        let probe = backend.probe();
        assert_eq!(probe.context_state(), None);

        let context = backend.create_context().unwrap();
        assert_eq!(context.state(), ContextState::Running);
        assert_eq!(probe.contexts_created(), 1);
    }

    #[test]
    fn test_resume_without_suspend_fails() {
        let backend = MockBackend::new(2);
        let mut context = backend.create_context().unwrap();
        assert!(context.resume().is_err());

        context.suspend().unwrap();
        context.resume().unwrap();
        assert_eq!(context.state(), ContextState::Running);
    }

    #[test]
    fn test_strict_edges() {
        let backend = MockBackend::new(2);
        let mut context = backend.create_context().unwrap();
        let merger = context.create_merger(2).unwrap();
        let edge = Edge::new(merger, 0, context.destination(), 0);

        assert!(context.disconnect(edge).is_err());
        context.connect(edge).unwrap();
        assert!(context.connect(edge).is_err());
        context.disconnect(edge).unwrap();
    }

    #[test]
    fn test_configure_destination_clamps() {
        let backend = MockBackend::new(4);
        let probe = backend.probe();
        let mut context = backend.create_context().unwrap();
        let applied = context
            .configure_destination(8, ChannelInterpretation::Discrete)
            .unwrap();
        assert_eq!(applied, 4);
        assert_eq!(
            probe.destination_config(),
            (4, ChannelInterpretation::Discrete)
        );
    }

    #[test]
    fn test_process_block_drives_processor() {
        let backend = MockBackend::new(2);
        let probe = backend.probe();
        let mut context = backend.create_context().unwrap();
        let node = context.create_processor(4, Box::new(Doubler)).unwrap();

        let output = probe.process_block(node, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(output, vec![2.0, 4.0, 6.0, 8.0]);

        let merger = context.create_merger(1).unwrap();
        assert!(probe.process_block(merger, &[1.0]).is_none());
    }

    #[test]
    fn test_release_drops_edges() {
        let backend = MockBackend::new(2);
        let probe = backend.probe();
        let mut context = backend.create_context().unwrap();
        let merger = context.create_merger(2).unwrap();
        context
            .connect(Edge::new(merger, 0, context.destination(), 0))
            .unwrap();

        context.release(merger).unwrap();
        assert!(probe.edges().is_empty());
        assert_eq!(probe.node_count(), 1);
    }

    #[test]
    fn test_closed_context_rejects_edits() {
        let backend = MockBackend::new(2);
        let mut context = backend.create_context().unwrap();
        context.close().unwrap();
        assert!(context.create_merger(2).is_err());
        assert_eq!(context.state(), ContextState::Closed);
    }
}
