//! Fixed topology routing graph of a track.
//!
//! The control side edits a `RoutingGraph` and publishes it to the audio side
//! wrapped in a `GraphProcessor`, which owns every buffer the graph renders into.

use dasp_sample::FloatSample;
use failure::Fail;

use crate::audio::{self, Precision, NUM_CHANNELS};
use crate::instrument::Instrument;
use crate::midi;
use crate::time::SampleRate;

pub type NodeId = usize;

/// Pin channel used for MIDI connections.
pub const MIDI_CHANNEL_INDEX: usize = 0x1000;

#[derive(Debug, Fail, PartialEq)]
pub enum GraphError {
  #[fail(display = "The instrument slot is already occupied by node {}", node)]
  InstrumentSlotOccupied { node: NodeId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
  AudioInput,
  ProcessingStage,
  AudioOutput,
  MidiInput,
  MidiOutput,
  Instrument,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pin {
  pub node: NodeId,
  pub channel: usize,
}

impl Pin {
  pub fn audio(node: NodeId, channel: usize) -> Pin {
    Pin { node, channel }
  }

  pub fn midi(node: NodeId) -> Pin {
    Pin {
      node,
      channel: MIDI_CHANNEL_INDEX,
    }
  }

  pub fn is_midi(&self) -> bool {
    self.channel == MIDI_CHANNEL_INDEX
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
  pub source: Pin,
  pub destination: Pin,
}

#[derive(Debug, Clone)]
pub struct RoutingGraph {
  nodes: Vec<NodeKind>,
  connections: Vec<Connection>,
  order: Vec<NodeId>,
  version: u64,

  audio_input: NodeId,
  processing_stage: NodeId,
  audio_output: NodeId,
  midi_input: NodeId,
  midi_output: NodeId,
  instrument: Option<NodeId>,
}

impl RoutingGraph {
  /// Graph with the stereo path `input -> stage -> output` and `midi in -> midi out`.
  pub fn new() -> RoutingGraph {
    let mut graph = RoutingGraph {
      nodes: Vec::new(),
      connections: Vec::new(),
      order: Vec::new(),
      version: 0,
      audio_input: 0,
      processing_stage: 0,
      audio_output: 0,
      midi_input: 0,
      midi_output: 0,
      instrument: None,
    };

    graph.audio_input = graph.add_node(NodeKind::AudioInput);
    graph.processing_stage = graph.add_node(NodeKind::ProcessingStage);
    graph.audio_output = graph.add_node(NodeKind::AudioOutput);
    graph.midi_input = graph.add_node(NodeKind::MidiInput);
    graph.midi_output = graph.add_node(NodeKind::MidiOutput);

    for channel in 0..NUM_CHANNELS {
      graph.connect(
        Pin::audio(graph.audio_input, channel),
        Pin::audio(graph.processing_stage, channel),
      );
      graph.connect(
        Pin::audio(graph.processing_stage, channel),
        Pin::audio(graph.audio_output, channel),
      );
    }
    graph.connect(Pin::midi(graph.midi_input), Pin::midi(graph.midi_output));

    graph.update_order();
    graph
  }

  fn add_node(&mut self, kind: NodeKind) -> NodeId {
    self.nodes.push(kind);
    self.nodes.len() - 1
  }

  fn connect(&mut self, source: Pin, destination: Pin) {
    let connection = Connection {
      source,
      destination,
    };
    if !self.connections.contains(&connection) {
      self.connections.push(connection);
    }
  }

  /// Inserts the instrument node, wiring its outputs to the track output and
  /// the MIDI input to it. Only one instrument fits in the slot.
  pub fn attach_instrument(&mut self) -> Result<NodeId, GraphError> {
    if let Some(node) = self.instrument {
      return Err(GraphError::InstrumentSlotOccupied { node });
    }

    let node = self.add_node(NodeKind::Instrument);
    for channel in 0..NUM_CHANNELS {
      self.connect(Pin::audio(node, channel), Pin::audio(self.audio_output, channel));
    }
    self.connect(Pin::midi(self.midi_input), Pin::midi(node));
    self.instrument = Some(node);

    self.update_order();
    self.version += 1;
    Ok(node)
  }

  /// Kahn's ordering so that every node renders after its sources.
  fn update_order(&mut self) {
    let mut pending: Vec<usize> = vec![0; self.nodes.len()];
    for connection in self.connections.iter() {
      pending[connection.destination.node] += 1;
    }

    let mut order = Vec::with_capacity(self.nodes.len());
    let mut ready: Vec<NodeId> = (0..self.nodes.len())
      .filter(|node| pending[*node] == 0)
      .rev()
      .collect();

    while let Some(node) = ready.pop() {
      order.push(node);
      for connection in self.connections.iter().filter(|c| c.source.node == node) {
        let destination = connection.destination.node;
        pending[destination] -= 1;
        if pending[destination] == 0 {
          ready.push(destination);
        }
      }
    }

    self.order = order;
  }

  pub fn node_kind(&self, node: NodeId) -> Option<NodeKind> {
    self.nodes.get(node).cloned()
  }

  pub fn num_nodes(&self) -> usize {
    self.nodes.len()
  }

  pub fn connections(&self) -> &[Connection] {
    &self.connections
  }

  pub fn order(&self) -> &[NodeId] {
    &self.order
  }

  pub fn version(&self) -> u64 {
    self.version
  }

  pub fn instrument(&self) -> Option<NodeId> {
    self.instrument
  }

  pub fn audio_output(&self) -> NodeId {
    self.audio_output
  }

  pub fn midi_input(&self) -> NodeId {
    self.midi_input
  }

  pub fn midi_output(&self) -> NodeId {
    self.midi_output
  }

  pub fn is_connected(&self, source: Pin, destination: Pin) -> bool {
    self.connections.contains(&Connection {
      source,
      destination,
    })
  }
}

impl Default for RoutingGraph {
  fn default() -> Self {
    RoutingGraph::new()
  }
}

/// Scratch buffers, one per node and precision.
struct Scratch {
  single: Vec<audio::Buffer<f32>>,
  double: Vec<audio::Buffer<f64>>,
}

impl Scratch {
  fn new(num_nodes: usize, max_frames: usize) -> Scratch {
    Scratch {
      single: (0..num_nodes)
        .map(|_| audio::Buffer::new(NUM_CHANNELS, max_frames))
        .collect(),
      double: (0..num_nodes)
        .map(|_| audio::Buffer::new(NUM_CHANNELS, max_frames))
        .collect(),
    }
  }
}

/// Selects the scratch buffers and the instrument entry point of a precision.
trait GraphSample: FloatSample {
  fn buffers(scratch: &mut Scratch) -> &mut [audio::Buffer<Self>];

  fn render_instrument(
    instrument: &mut dyn Instrument,
    midi: &midi::Buffer,
    audio: &mut audio::Buffer<Self>,
  );
}

impl GraphSample for f32 {
  fn buffers(scratch: &mut Scratch) -> &mut [audio::Buffer<f32>] {
    &mut scratch.single
  }

  fn render_instrument(
    instrument: &mut dyn Instrument,
    midi: &midi::Buffer,
    audio: &mut audio::Buffer<f32>,
  ) {
    instrument.process(midi, audio)
  }
}

impl GraphSample for f64 {
  fn buffers(scratch: &mut Scratch) -> &mut [audio::Buffer<f64>] {
    &mut scratch.double
  }

  fn render_instrument(
    instrument: &mut dyn Instrument,
    midi: &midi::Buffer,
    audio: &mut audio::Buffer<f64>,
  ) {
    instrument.process_double(midi, audio)
  }
}

/// Mutable destination and shared source out of the same slice.
fn split_pair<T>(items: &mut [T], destination: usize, source: usize) -> (&mut T, &T) {
  if destination < source {
    let (left, right) = items.split_at_mut(source);
    (&mut left[destination], &right[0])
  } else {
    let (left, right) = items.split_at_mut(destination);
    (&mut right[0], &left[source])
  }
}

/// Audio side of the routing graph.
pub struct GraphProcessor {
  layout: RoutingGraph,
  instrument: Option<Box<dyn Instrument>>,
  scratch: Scratch,
  no_midi: midi::Buffer,
  precision: Precision,
}

impl GraphProcessor {
  /// Builds a processor for `layout`, preparing the instrument for the given format.
  /// Called on the control side, so it may allocate.
  pub fn new(
    layout: RoutingGraph,
    mut instrument: Option<Box<dyn Instrument>>,
    sample_rate: SampleRate,
    max_frames: usize,
    precision: Precision,
  ) -> GraphProcessor {
    if let Some(instrument) = instrument.as_mut() {
      instrument.prepare(sample_rate, max_frames);
      instrument.set_precision(precision);
    }
    let scratch = Scratch::new(layout.num_nodes(), max_frames);
    GraphProcessor {
      layout,
      instrument,
      scratch,
      no_midi: midi::Buffer::new(),
      precision,
    }
  }

  pub fn prepare(&mut self, sample_rate: SampleRate, max_frames: usize) {
    self.scratch = Scratch::new(self.layout.num_nodes(), max_frames);
    if let Some(instrument) = self.instrument.as_mut() {
      instrument.prepare(sample_rate, max_frames);
    }
  }

  pub fn set_precision(&mut self, precision: Precision) {
    self.precision = precision;
    if let Some(instrument) = self.instrument.as_mut() {
      instrument.set_precision(precision);
    }
  }

  pub fn precision(&self) -> Precision {
    self.precision
  }

  pub fn version(&self) -> u64 {
    self.layout.version()
  }

  pub fn has_instrument(&self) -> bool {
    self.instrument.is_some()
  }

  pub fn process(&mut self, audio: &mut audio::Buffer<f32>, midi: &midi::Buffer, bypassed: bool) {
    self.render(audio, midi, bypassed)
  }

  pub fn process_double(
    &mut self,
    audio: &mut audio::Buffer<f64>,
    midi: &midi::Buffer,
    bypassed: bool,
  ) {
    self.render(audio, midi, bypassed)
  }

  /// Renders every node in order. `audio` is both the track input and output;
  /// `midi` is left untouched, which is the MIDI pass-through.
  fn render<S: GraphSample>(
    &mut self,
    audio: &mut audio::Buffer<S>,
    midi: &midi::Buffer,
    instrument_bypassed: bool,
  ) {
    let GraphProcessor {
      layout,
      instrument,
      scratch,
      no_midi,
      ..
    } = self;

    let buffers = S::buffers(scratch);
    let frames = audio.frames();

    for &node in layout.order.iter() {
      buffers[node].set_frames(frames);
      buffers[node].clear();

      for connection in layout.connections.iter() {
        if connection.destination.node != node || connection.destination.is_midi() {
          continue;
        }
        let (destination, source) = split_pair(buffers, node, connection.source.node);
        destination.add_channel_from(
          connection.destination.channel,
          source,
          connection.source.channel,
        );
      }

      match layout.nodes[node] {
        NodeKind::AudioInput => buffers[node].copy_from(audio),
        NodeKind::Instrument => {
          if let Some(instrument) = instrument.as_mut() {
            let events = if layout.is_connected(Pin::midi(layout.midi_input), Pin::midi(node)) {
              &*midi
            } else {
              &*no_midi
            };
            S::render_instrument(&mut **instrument, events, &mut buffers[node]);
            if instrument_bypassed {
              buffers[node].clear();
            }
          }
        }
        NodeKind::ProcessingStage
        | NodeKind::AudioOutput
        | NodeKind::MidiInput
        | NodeKind::MidiOutput => {}
      }
    }

    audio.copy_from(&buffers[layout.audio_output]);
  }
}
