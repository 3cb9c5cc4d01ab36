//! Pull-based software render graph.
//!
//! The graph renders in fixed quanta of [`RENDER_QUANTUM`] frames. Each
//! quantum, nodes are processed in depth-first order from the destination,
//! so only nodes with a path to the destination run. A processor node that
//! is not wired to the destination therefore never sees its block callback,
//! which is why recording channels must keep at least one edge to the merger.

use std::collections::{BTreeMap, HashSet};

use ringbuf::traits::Consumer;

use crate::graph::{Biquad, BlockProcessor, ChannelInterpretation, Edge, NodeId};
use crate::SplutterError;

/// Frames rendered per graph pass.
pub(crate) const RENDER_QUANTUM: usize = 128;

/// One port's audio for one quantum: a buffer per channel.
type Bus = Vec<Vec<f32>>;

enum NodeKind {
    Source {
        consumer: ringbuf::HeapCons<f32>,
        channels: usize,
        scratch: Vec<f32>,
    },
    Splitter {
        outputs: usize,
    },
    Merger {
        inputs: usize,
    },
    Lowpass(Biquad),
    Processor(ProcessorNode),
    Destination {
        channels: usize,
        interpretation: ChannelInterpretation,
    },
}

/// Block-based processor with one block of latency.
///
/// Quanta accumulate into `input_block`; once it is full the processor is
/// invoked and its output is played back over the following block.
struct ProcessorNode {
    processor: Box<dyn BlockProcessor>,
    input_block: Vec<f32>,
    output_block: Vec<f32>,
    next_output: Vec<f32>,
    position: usize,
}

impl ProcessorNode {
    fn new(block_size: usize, processor: Box<dyn BlockProcessor>) -> Self {
        Self {
            processor,
            input_block: vec![0.0; block_size],
            output_block: vec![0.0; block_size],
            next_output: vec![0.0; block_size],
            position: 0,
        }
    }

    fn process_quantum(&mut self, input: &[f32], output: &mut [f32]) {
        let end = self.position + input.len();
        output.copy_from_slice(&self.output_block[self.position..end]);
        self.input_block[self.position..end].copy_from_slice(input);
        self.position = end;

        if self.position == self.input_block.len() {
            self.processor
                .process(&self.input_block, &mut self.next_output);
            std::mem::swap(&mut self.output_block, &mut self.next_output);
            self.position = 0;
        }
    }
}

impl NodeKind {
    fn input_ports(&self) -> usize {
        match self {
            Self::Source { .. } => 0,
            Self::Merger { inputs } => *inputs,
            _ => 1,
        }
    }

    fn output_ports(&self) -> usize {
        match self {
            Self::Splitter { outputs } => *outputs,
            Self::Destination { .. } => 0,
            _ => 1,
        }
    }

    fn input_channels(&self) -> usize {
        match self {
            Self::Splitter { outputs } => *outputs,
            Self::Destination { channels, .. } => *channels,
            _ => 1,
        }
    }

    fn output_channels(&self) -> usize {
        match self {
            Self::Source { channels, .. } => *channels,
            Self::Merger { inputs } => *inputs,
            _ => 1,
        }
    }

    fn interpretation(&self) -> ChannelInterpretation {
        match self {
            Self::Splitter { .. } => ChannelInterpretation::Discrete,
            Self::Destination { interpretation, .. } => *interpretation,
            _ => ChannelInterpretation::Speakers,
        }
    }

    /// Renders one quantum from `inputs` into `outputs` without allocating.
    fn process(&mut self, inputs: &[Bus], outputs: &mut [Bus]) {
        match self {
            Self::Source {
                consumer,
                channels,
                scratch,
            } => {
                let read = consumer.pop_slice(scratch);
                scratch[read..].fill(0.0);
                let bus = &mut outputs[0];
                for (frame, samples) in scratch.chunks_exact((*channels).max(1)).enumerate() {
                    for (channel, sample) in samples.iter().enumerate() {
                        bus[channel][frame] = *sample;
                    }
                }
            }
            Self::Splitter { .. } => {
                for (port, bus) in outputs.iter_mut().enumerate() {
                    if let Some(channel) = inputs[0].get(port) {
                        bus[0].copy_from_slice(channel);
                    }
                }
            }
            Self::Merger { .. } => {
                for (channel, bus) in outputs[0].iter_mut().zip(inputs) {
                    channel.copy_from_slice(&bus[0]);
                }
            }
            Self::Lowpass(filter) => {
                let output = &mut outputs[0][0];
                output.copy_from_slice(&inputs[0][0]);
                filter.process(output);
            }
            Self::Processor(node) => node.process_quantum(&inputs[0][0], &mut outputs[0][0]),
            // Read straight from its input bus by the graph.
            Self::Destination { .. } => {}
        }
    }
}

fn silence() -> Vec<f32> {
    vec![0.0; RENDER_QUANTUM]
}

/// Sums `src` into `dest`, converting channel layouts.
fn mix_into(dest: &mut Bus, src: &Bus, interpretation: ChannelInterpretation) {
    fn add(dest: &mut [f32], src: &[f32], gain: f32) {
        for (d, s) in dest.iter_mut().zip(src) {
            *d += s * gain;
        }
    }

    if interpretation == ChannelInterpretation::Speakers && src.len() != dest.len() {
        if dest.len() == 1 {
            let gain = 1.0 / src.len() as f32;
            for channel in src {
                add(&mut dest[0], channel, gain);
            }
            return;
        }
        if src.len() == 1 {
            for channel in dest.iter_mut().take(2) {
                add(channel, &src[0], 1.0);
            }
            return;
        }
    }

    for (d, s) in dest.iter_mut().zip(src) {
        add(d, s, 1.0);
    }
}

/// A node and its port buffers, sized once when the node is added.
struct Node {
    kind: NodeKind,
    inputs: Vec<Bus>,
    outputs: Vec<Bus>,
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        Self {
            inputs: vec![vec![silence(); kind.input_channels()]; kind.input_ports()],
            outputs: vec![vec![silence(); kind.output_channels()]; kind.output_ports()],
            kind,
        }
    }
}

/// The node graph rendered by an engine.
pub(crate) struct RenderGraph {
    nodes: BTreeMap<NodeId, Node>,
    edges: HashSet<Edge>,
    order: Vec<NodeId>,
    destination: NodeId,
    next_id: u32,
    sample_rate: u32,
    running: bool,
    /// Rendered destination quantum and read position, for devices whose
    /// callback sizes are not multiples of the quantum.
    pending: Bus,
    pending_pos: usize,
}

impl RenderGraph {
    pub fn new(sample_rate: u32, destination_channels: usize) -> Self {
        let destination = NodeId(0);
        let mut nodes = BTreeMap::new();
        nodes.insert(
            destination,
            Node::new(NodeKind::Destination {
                channels: destination_channels,
                interpretation: ChannelInterpretation::Speakers,
            }),
        );

        Self {
            nodes,
            edges: HashSet::new(),
            order: vec![destination],
            destination,
            next_id: 1,
            sample_rate,
            running: false,
            pending: vec![silence(); destination_channels],
            pending_pos: RENDER_QUANTUM,
        }
    }

    pub fn destination(&self) -> NodeId {
        self.destination
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    pub fn configure_destination(
        &mut self,
        channels: usize,
        interpretation: ChannelInterpretation,
    ) {
        self.nodes.insert(
            self.destination,
            Node::new(NodeKind::Destination {
                channels,
                interpretation,
            }),
        );
        self.pending = vec![silence(); channels];
        self.pending_pos = RENDER_QUANTUM;
    }

    fn add_node(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, Node::new(kind));
        id
    }

    pub fn add_source(&mut self, consumer: ringbuf::HeapCons<f32>, channels: usize) -> NodeId {
        self.add_node(NodeKind::Source {
            consumer,
            channels,
            scratch: vec![0.0; RENDER_QUANTUM * channels],
        })
    }

    pub fn add_splitter(&mut self, outputs: usize) -> NodeId {
        self.add_node(NodeKind::Splitter { outputs })
    }

    pub fn add_merger(&mut self, inputs: usize) -> NodeId {
        self.add_node(NodeKind::Merger { inputs })
    }

    pub fn add_lowpass(&mut self, cutoff_hz: f32, q: f32) -> NodeId {
        let filter = Biquad::lowpass(cutoff_hz, q, self.sample_rate);
        self.add_node(NodeKind::Lowpass(filter))
    }

    pub fn add_processor(
        &mut self,
        block_size: usize,
        processor: Box<dyn BlockProcessor>,
    ) -> Result<NodeId, SplutterError> {
        if block_size == 0 || block_size % RENDER_QUANTUM != 0 {
            return Err(SplutterError::InvalidBufferSize { size: block_size });
        }
        Ok(self.add_node(NodeKind::Processor(ProcessorNode::new(
            block_size, processor,
        ))))
    }

    /// Adds an edge. Connecting an existing edge is a no-op.
    pub fn connect(&mut self, edge: Edge) -> Result<(), SplutterError> {
        let from = self
            .nodes
            .get(&edge.from)
            .ok_or_else(|| SplutterError::graph(format!("unknown node {}", edge.from)))?;
        if edge.output >= from.kind.output_ports() {
            return Err(SplutterError::graph(format!(
                "{} has no output {}",
                edge.from, edge.output
            )));
        }
        let to = self
            .nodes
            .get(&edge.to)
            .ok_or_else(|| SplutterError::graph(format!("unknown node {}", edge.to)))?;
        if edge.input >= to.kind.input_ports() {
            return Err(SplutterError::graph(format!(
                "{} has no input {}",
                edge.to, edge.input
            )));
        }

        if self.edges.insert(edge) {
            self.update_processing_order();
        }
        Ok(())
    }

    /// Removes an edge. Fails if the edge does not exist.
    pub fn disconnect(&mut self, edge: Edge) -> Result<(), SplutterError> {
        if !self.edges.remove(&edge) {
            return Err(SplutterError::graph(format!("edge {edge} not connected")));
        }
        self.update_processing_order();
        Ok(())
    }

    pub fn remove_node(&mut self, node: NodeId) -> Result<(), SplutterError> {
        if node == self.destination {
            return Err(SplutterError::graph("cannot release the destination"));
        }
        self.nodes
            .remove(&node)
            .ok_or_else(|| SplutterError::graph(format!("unknown node {node}")))?;
        self.edges.retain(|e| e.from != node && e.to != node);
        self.update_processing_order();
        Ok(())
    }

    /// Recomputes the depth-first processing order from the destination.
    fn update_processing_order(&mut self) {
        fn visit(
            node: NodeId,
            edges: &HashSet<Edge>,
            visited: &mut HashSet<NodeId>,
            order: &mut Vec<NodeId>,
        ) {
            if !visited.insert(node) {
                return;
            }
            let mut sources: Vec<NodeId> = edges
                .iter()
                .filter(|e| e.to == node)
                .map(|e| e.from)
                .collect();
            sources.sort_unstable();
            for source in sources {
                visit(source, edges, visited, order);
            }
            order.push(node);
        }

        let previous: HashSet<NodeId> = self.order.iter().copied().collect();
        let mut visited = HashSet::new();
        let mut order = Vec::with_capacity(self.nodes.len());
        visit(self.destination, &self.edges, &mut visited, &mut order);

        // Sources joining the render path start from fresh input, not from
        // whatever queued up while they were unrouted.
        for id in order.iter().filter(|id| !previous.contains(id)) {
            if let Some(Node {
                kind: NodeKind::Source { consumer, .. },
                ..
            }) = self.nodes.get_mut(id)
            {
                consumer.clear();
            }
        }

        self.order = order;
    }

    /// Renders one quantum and returns the destination bus.
    ///
    /// Runs on the device thread, so it only touches buffers allocated when
    /// nodes were added.
    pub fn render_quantum(&mut self) -> &Bus {
        for &id in &self.order {
            let Some(node) = self.nodes.get_mut(&id) else {
                continue;
            };
            let interpretation = node.kind.interpretation();
            let mut inputs = std::mem::take(&mut node.inputs);
            for channel in inputs.iter_mut().flatten() {
                channel.fill(0.0);
            }

            for edge in self.edges.iter().filter(|e| e.to == id) {
                let source = self
                    .nodes
                    .get(&edge.from)
                    .and_then(|n| n.outputs.get(edge.output));
                if let (Some(bus), Some(input)) = (source, inputs.get_mut(edge.input)) {
                    mix_into(input, bus, interpretation);
                }
            }

            if let Some(node) = self.nodes.get_mut(&id) {
                node.inputs = inputs;
                node.kind.process(&node.inputs, &mut node.outputs);
            }
        }

        let rendered = self
            .nodes
            .get(&self.destination)
            .and_then(|n| n.inputs.first());
        for (index, channel) in self.pending.iter_mut().enumerate() {
            match rendered.and_then(|bus| bus.get(index)) {
                Some(samples) => channel.copy_from_slice(samples),
                None => channel.fill(0.0),
            }
        }
        &self.pending
    }

    /// Fills an interleaved device buffer with `device_channels` channels.
    ///
    /// Destination channels beyond the device's are dropped; device channels
    /// beyond the destination's are silent. Writes silence while suspended.
    pub fn fill_interleaved(&mut self, data: &mut [f32], device_channels: usize) {
        if !self.running || device_channels == 0 {
            data.fill(0.0);
            return;
        }

        for frame in data.chunks_mut(device_channels) {
            if self.pending_pos >= RENDER_QUANTUM {
                self.render_quantum();
                self.pending_pos = 0;
            }
            for (channel, sample) in frame.iter_mut().enumerate() {
                *sample = self
                    .pending
                    .get(channel)
                    .map_or(0.0, |buffer| buffer[self.pending_pos]);
            }
            self.pending_pos += 1;
        }
    }

    #[cfg(test)]
    fn is_scheduled(&self, node: NodeId) -> bool {
        self.order.contains(&node)
    }
}
