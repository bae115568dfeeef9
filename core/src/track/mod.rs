//! A track of the studio.
//!
//! Every track is split in two halves. `Track` lives on the control side and owns
//! the editable state (metadata, routing layout, note sequence). `TrackProcessor`
//! lives on the audio thread and renders blocks. Structural changes travel from the
//! former to the latter as boxed values over a bounded channel and are swapped in at
//! the start of a block; the values they replace travel back to be dropped off the
//! audio thread. Gain, pan and bypass are shared atomics.

pub mod effects;
pub mod graph;
pub mod live;
pub mod sequence;

use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use crossbeam_channel::{self, Receiver, Sender, TrySendError};
use failure::Fail;
use log::{debug, warn};
use uuid::Uuid;

use crate::audio::{self, Precision};
use crate::color::Color;
use crate::instrument::Instrument;
use crate::midi::{self, Message};
use crate::protocol::{packets, Writer};
use crate::time::{BlockTime, ClockTime, HostClock, SampleRate, TicksTime};
use crate::transport::TransportPosition;

use self::effects::EffectChain;
use self::graph::{GraphProcessor, RoutingGraph};
use self::live::{live_event_queue, LiveEvent, LiveEventReceiver, LiveEventSender};
use self::sequence::NoteSequence;

/// The MIDI data record announces its length with a single byte.
pub const MAX_SERIALIZED_NOTES: usize = 255;

const COMMAND_CHANNEL_CAPACITY: usize = 16;

/// All notes off on MIDI channel 1.
const ALL_NOTES_OFF: [u8; 3] = [0xb0, 123, 0];

/// Pan law reported in mixer info records.
pub const PAN_RULE_BALANCED: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackId(Uuid);

impl TrackId {
  pub fn new() -> TrackId {
    TrackId(Uuid::new_v4())
  }
}

impl Default for TrackId {
  fn default() -> Self {
    TrackId::new()
  }
}

impl fmt::Display for TrackId {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "{}", self.0.simple())
  }
}

#[derive(Debug, Fail)]
pub enum TrackError {
  #[fail(display = "Track {} already has an instrument attached", track)]
  InstrumentAlreadyAttached { track: TrackId },

  #[fail(display = "Failed to queue a live event for track {}: {}", track, cause)]
  LiveQueue { track: TrackId, cause: String },

  #[fail(display = "The engine is not accepting updates for track {}", track)]
  EngineBusy { track: TrackId },

  #[fail(display = "The engine has released track {}", track)]
  EngineDisconnected { track: TrackId },
}

/// Note event with a timestamp expressed in some external time format.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedMessage {
  pub timestamp: f64,
  pub message: Message,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackSettings {
  pub sample_rate: SampleRate,
  pub max_frames: usize,
  pub ticks_per_quarter_note: u32,
  pub live_queue_capacity: usize,
}

struct SharedState {
  gain: AtomicU32,
  pan: AtomicU32,
  bypassed: AtomicBool,
  soloed: AtomicBool,
}

impl SharedState {
  fn new() -> SharedState {
    SharedState {
      gain: AtomicU32::new(1.0f32.to_bits()),
      pan: AtomicU32::new(0.0f32.to_bits()),
      bypassed: AtomicBool::new(false),
      soloed: AtomicBool::new(false),
    }
  }

  fn gain(&self) -> f32 {
    f32::from_bits(self.gain.load(Ordering::Relaxed))
  }

  fn pan(&self) -> f32 {
    f32::from_bits(self.pan.load(Ordering::Relaxed))
  }
}

enum TrackCommand {
  ReplaceGraph(Box<GraphProcessor>),
  ReplaceSequence(Box<NoteSequence>),
  SetPrecision(Precision),
}

enum Retired {
  Graph(Box<GraphProcessor>),
  Sequence(Box<NoteSequence>),
}

pub struct Track {
  id: TrackId,
  name: String,
  color: Color,

  settings: TrackSettings,
  precision: Precision,
  clock: HostClock,

  graph: RoutingGraph,
  instrument_name: Option<String>,
  sequence: NoteSequence,
  shared: Arc<SharedState>,

  live_tx: LiveEventSender,
  command_tx: Sender<TrackCommand>,
  retire_rx: Receiver<Retired>,
  broadcast_tx: Sender<Vec<u8>>,
}

impl Track {
  /// Creates both halves of a track. Packets pushed to the client go to `broadcast_tx`.
  pub fn new<N, C>(
    name: N,
    color: C,
    settings: TrackSettings,
    clock: HostClock,
    broadcast_tx: Sender<Vec<u8>>,
  ) -> (Track, TrackProcessor)
  where
    N: Into<String>,
    C: Into<Color>,
  {
    let id = TrackId::new();
    let shared = Arc::new(SharedState::new());
    let graph = RoutingGraph::new();
    let (live_tx, live_rx) = live_event_queue(settings.live_queue_capacity);
    let (command_tx, command_rx) = crossbeam_channel::bounded(COMMAND_CHANNEL_CAPACITY);
    let (retire_tx, retire_rx) = crossbeam_channel::bounded(COMMAND_CHANNEL_CAPACITY);

    let processor = TrackProcessor {
      id,
      sample_rate: settings.sample_rate,
      graph: Box::new(GraphProcessor::new(
        graph.clone(),
        None,
        settings.sample_rate,
        settings.max_frames,
        Precision::Single,
      )),
      sequence: Box::new(NoteSequence::new()),
      effects: EffectChain::new(),
      shared: shared.clone(),
      live_rx,
      command_rx,
      retire_tx,
    };

    let track = Track {
      id,
      name: name.into(),
      color: color.into(),
      settings,
      precision: Precision::Single,
      clock,
      graph,
      instrument_name: None,
      sequence: NoteSequence::new(),
      shared,
      live_tx,
      command_tx,
      retire_rx,
      broadcast_tx,
    };

    (track, processor)
  }

  pub fn id(&self) -> TrackId {
    self.id
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn set_name<T: Into<String>>(&mut self, name: T) {
    self.name = name.into();
  }

  pub fn color(&self) -> &Color {
    &self.color
  }

  pub fn set_color<T: Into<Color>>(&mut self, color: T) {
    self.color = color.into();
  }

  /// Linear gain of the second effect stage.
  pub fn gain(&self) -> f32 {
    self.shared.gain()
  }

  pub fn set_gain(&self, gain: f32) {
    if gain.is_finite() {
      self
        .shared
        .gain
        .store(gain.max(0.0).to_bits(), Ordering::Relaxed);
    }
  }

  pub fn pan(&self) -> f32 {
    self.shared.pan()
  }

  pub fn set_pan(&self, pan: f32) {
    if pan.is_finite() {
      self
        .shared
        .pan
        .store(pan.max(-1.0).min(1.0).to_bits(), Ordering::Relaxed);
    }
  }

  pub fn is_bypassed(&self) -> bool {
    self.shared.bypassed.load(Ordering::Acquire)
  }

  /// While any track is soloed, only soloed tracks reach the mix.
  pub fn set_soloed(&self, soloed: bool) {
    self.shared.soloed.store(soloed, Ordering::Relaxed);
  }

  pub fn is_soloed(&self) -> bool {
    self.shared.soloed.load(Ordering::Relaxed)
  }

  pub fn instrument_name(&self) -> Option<&str> {
    self.instrument_name.as_ref().map(String::as_str)
  }

  pub fn has_instrument(&self) -> bool {
    self.graph.instrument().is_some()
  }

  pub fn graph(&self) -> &RoutingGraph {
    &self.graph
  }

  pub fn sequence(&self) -> &NoteSequence {
    &self.sequence
  }

  pub fn precision(&self) -> Precision {
    self.precision
  }

  /// Inserts `instrument` into the routing graph and publishes the new graph.
  /// A track takes a single instrument; a second one is rejected and dropped.
  pub fn set_generator(&mut self, instrument: Box<dyn Instrument>) -> Result<(), TrackError> {
    let name = instrument.name().to_string();
    let mut graph = self.graph.clone();
    graph
      .attach_instrument()
      .map_err(|_| TrackError::InstrumentAlreadyAttached { track: self.id })?;

    let processor = GraphProcessor::new(
      graph.clone(),
      Some(instrument),
      self.settings.sample_rate,
      self.settings.max_frames,
      self.precision,
    );
    self.send(TrackCommand::ReplaceGraph(Box::new(processor)))?;
    self.graph = graph;
    self.instrument_name = Some(name);

    debug!("Instrument attached to track {}", self.id);
    Ok(())
  }

  /// Bypasses the instrument. The all notes off goes into the live queue before the
  /// flag is published, so the block that sees the flag also drains the note offs.
  pub fn set_muted(&self, muted: bool) {
    if !self.has_instrument() {
      return;
    }
    if let Err(err) = self.push_live_event(ALL_NOTES_OFF) {
      warn!("{}", err);
    }
    self.shared.bypassed.store(muted, Ordering::Release);
  }

  /// Adds the note messages to the sequence, rescaling timestamps from `time_format`
  /// units per quarter note into ticks, then pushes the resulting MIDI data to the client.
  pub fn add_midi_events(
    &mut self,
    events: &[TimedMessage],
    time_format: u32,
  ) -> Result<(), TrackError> {
    let ticks_per_quarter_note = self.settings.ticks_per_quarter_note;
    for event in events.iter().filter(|e| e.message.is_note_on_or_off()) {
      let tick = TicksTime::from_time_format(event.timestamp, time_format, ticks_per_quarter_note);
      self.sequence.add_event(tick, event.message);
    }

    self.send(TrackCommand::ReplaceSequence(Box::new(self.sequence.clone())))?;

    let mut packet = packets::track_midi_data_packet();
    self.write_midi_data(&mut packet);
    drop(self.broadcast_tx.send(packet.into_bytes()));
    Ok(())
  }

  /// Writes the MIDI data record: id, count and the paired notes in tick order.
  pub fn write_midi_data(&self, writer: &mut Writer) {
    let pairs = self.sequence.matched_pairs();
    let count = pairs.len().min(MAX_SERIALIZED_NOTES);
    if count < pairs.len() {
      warn!(
        "Track {} has {} notes but only {} fit in a MIDI data record",
        self.id,
        pairs.len(),
        count
      );
    }

    writer
      .write_string(&self.id.to_string())
      .write_u16(count as u16);
    for pair in pairs.iter().take(count) {
      writer
        .write_u8(pair.key)
        .write_u8(pair.velocity)
        .write_u32(pair.on_tick.to_u32())
        .write_u32(pair.duration.to_u32());
    }
  }

  pub fn write_track_info(&self, writer: &mut Writer) {
    writer
      .write_string(&self.name)
      .write_string(self.color.as_str())
      .write_f32(self.gain())
      .write_bool(self.is_bypassed())
      .write_bool(false);
  }

  /// Writes the mixer record: id, pan in percent, pan law, solo and the loaded plugin names.
  pub fn write_mixer_info(&self, writer: &mut Writer) {
    let pan = (self.pan() * 100.0).round() as i8;
    writer
      .write_string(&self.id.to_string())
      .write_i8(pan)
      .write_u8(PAN_RULE_BALANCED)
      .write_bool(self.is_soloed());
    match self.instrument_name() {
      Some(name) => {
        writer.write_u8(1).write_string(name);
      }
      None => {
        writer.write_u8(0);
      }
    }
  }

  pub fn set_processing_precision(&mut self, precision: Precision) -> Result<(), TrackError> {
    self.send(TrackCommand::SetPrecision(precision))?;
    self.precision = precision;
    Ok(())
  }

  /// Queues a raw MIDI event stamped with the current time.
  pub fn push_live_event(&self, data: [u8; 3]) -> Result<(), TrackError> {
    let event = LiveEvent {
      data,
      timestamp: self.clock.now(),
    };
    self.live_tx.push(event).map_err(|cause| TrackError::LiveQueue {
      track: self.id,
      cause: cause.to_string(),
    })
  }

  pub fn queued_live_events(&self) -> usize {
    self.live_tx.len()
  }

  /// Drops whatever the audio side has replaced since the last call.
  pub fn collect_garbage(&self) -> usize {
    self
      .retire_rx
      .try_iter()
      .map(|retired| match retired {
        Retired::Graph(graph) => drop(graph),
        Retired::Sequence(sequence) => drop(sequence),
      })
      .count()
  }

  fn send(&self, command: TrackCommand) -> Result<(), TrackError> {
    self.collect_garbage();
    self.command_tx.try_send(command).map_err(|err| match err {
      TrySendError::Full(_) => TrackError::EngineBusy { track: self.id },
      TrySendError::Disconnected(_) => TrackError::EngineDisconnected { track: self.id },
    })
  }
}

/// Audio side of a track. Nothing here allocates, locks or blocks once prepared.
pub struct TrackProcessor {
  id: TrackId,
  sample_rate: SampleRate,
  graph: Box<GraphProcessor>,
  sequence: Box<NoteSequence>,
  effects: EffectChain,
  shared: Arc<SharedState>,
  live_rx: LiveEventReceiver,
  command_rx: Receiver<TrackCommand>,
  retire_tx: Sender<Retired>,
}

impl TrackProcessor {
  pub fn id(&self) -> TrackId {
    self.id
  }

  /// Propagates the stream format to the graph and the effect chain.
  /// Must be called before the first block of a new format, off the real-time path.
  pub fn prepare(&mut self, sample_rate: SampleRate, max_frames: usize) {
    self.apply_commands();
    self.sample_rate = sample_rate;
    self.graph.prepare(sample_rate, max_frames);
    self.effects.prepare(sample_rate, max_frames);
  }

  pub fn graph_version(&self) -> u64 {
    self.graph.version()
  }

  pub fn precision(&self) -> Precision {
    self.graph.precision()
  }

  pub fn has_instrument(&self) -> bool {
    self.graph.has_instrument()
  }

  pub fn is_soloed(&self) -> bool {
    self.shared.soloed.load(Ordering::Relaxed)
  }

  pub fn process_block(
    &mut self,
    audio: &mut audio::Buffer<f32>,
    midi: &mut midi::Buffer,
    transport: TransportPosition,
    now: ClockTime,
  ) {
    let bypassed = self.merge_events(audio.frames(), midi, transport, now);
    self.graph.process(audio, midi, bypassed);

    self.effects.pan_mut().set_position(self.shared.pan());
    self.effects.gain_mut().set_linear(self.shared.gain());
    self.effects.process(audio);
  }

  /// Same as `process_block` without the effect chain, which only runs in single precision.
  pub fn process_block_double(
    &mut self,
    audio: &mut audio::Buffer<f64>,
    midi: &mut midi::Buffer,
    transport: TransportPosition,
    now: ClockTime,
  ) {
    let bypassed = self.merge_events(audio.frames(), midi, transport, now);
    self.graph.process_double(audio, midi, bypassed);
  }

  /// Swaps in pending updates, then fills `midi` with the sequence events of the
  /// block window and the due live events. Returns the bypass state for the block.
  fn merge_events(
    &mut self,
    frames: usize,
    midi: &mut midi::Buffer,
    transport: TransportPosition,
    now: ClockTime,
  ) -> bool {
    self.apply_commands();

    let bypassed = self.shared.bypassed.load(Ordering::Acquire);

    if transport.is_playing {
      let span = transport.block_span(frames, self.sample_rate);
      self
        .sequence
        .write_block(transport.start_tick(), span, frames, midi);
    }

    let block = BlockTime::new(now, self.sample_rate, frames);
    self.live_rx.drain_into(&block, midi);

    midi.sort();
    bypassed
  }

  fn apply_commands(&mut self) {
    while let Ok(command) = self.command_rx.try_recv() {
      match command {
        TrackCommand::ReplaceGraph(mut graph) => {
          mem::swap(&mut self.graph, &mut graph);
          self.retire(Retired::Graph(graph));
        }
        TrackCommand::ReplaceSequence(mut sequence) => {
          mem::swap(&mut self.sequence, &mut sequence);
          self.retire(Retired::Sequence(sequence));
        }
        TrackCommand::SetPrecision(precision) => self.graph.set_precision(precision),
      }
    }
  }

  fn retire(&self, retired: Retired) {
    // only drops here when the control side stopped collecting
    drop(self.retire_tx.try_send(retired));
  }
}
