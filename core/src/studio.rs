use crossbeam_channel::{self, Receiver, Sender, TryIter, TrySendError};
use failure::Fail;
use log::{debug, info};

use crate::audio::{self, NUM_CHANNELS};
use crate::color::Color;
use crate::config::Config;
use crate::instrument::{
  Instrument, InstrumentDescription, InstrumentHost, InstrumentLoader, LoadCallback,
};
use crate::midi;
use crate::protocol::{packets, Writer};
use crate::time::{ClockTime, HostClock, SampleRate, Tempo};
use crate::track::{Track, TrackError, TrackId, TrackProcessor};
use crate::transport::Transport;

const ENGINE_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Fail)]
pub enum StudioError {
  #[fail(display = "The studio is limited to {} tracks", max)]
  TooManyTracks { max: usize },

  #[fail(display = "Track {} not found", track)]
  TrackNotFound { track: TrackId },

  #[fail(display = "The engine is not accepting commands")]
  EngineBusy,

  #[fail(display = "The engine has stopped")]
  EngineDisconnected,

  #[fail(display = "{}", _0)]
  Track(#[cause] TrackError),
}

impl From<TrackError> for StudioError {
  fn from(err: TrackError) -> Self {
    StudioError::Track(err)
  }
}

impl<T> From<TrySendError<T>> for StudioError {
  fn from(err: TrySendError<T>) -> Self {
    match err {
      TrySendError::Full(_) => StudioError::EngineBusy,
      TrySendError::Disconnected(_) => StudioError::EngineDisconnected,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransportCommand {
  Play { restart: bool },
  Stop,
  SetTempo(Tempo),
  SetPosition(f64),
}

enum EngineCommand {
  AddTrack(Box<TrackProcessor>),
  RemoveTrack(TrackId),
  Transport(TransportCommand),
}

/// Registry of tracks, owned by the controller thread.
pub struct Studio {
  config: Config,
  clock: HostClock,
  tracks: Vec<Track>,
  instruments: Box<dyn InstrumentHost>,

  engine_tx: Sender<EngineCommand>,
  retire_rx: Receiver<Box<TrackProcessor>>,

  broadcast_tx: Sender<Vec<u8>>,
  broadcast_rx: Receiver<Vec<u8>>,
}

impl Studio {
  pub fn new(config: Config, instruments: Box<dyn InstrumentHost>) -> (Studio, StudioProcessor) {
    let clock = HostClock::new();
    let (engine_tx, engine_rx) = crossbeam_channel::bounded(ENGINE_CHANNEL_CAPACITY);
    let (retire_tx, retire_rx) = crossbeam_channel::bounded(config.engine.max_tracks.max(1));
    let (broadcast_tx, broadcast_rx) = crossbeam_channel::unbounded();

    let processor = StudioProcessor::new(&config, engine_rx, retire_tx);

    let studio = Studio {
      config,
      clock,
      tracks: Vec::new(),
      instruments,
      engine_tx,
      retire_rx,
      broadcast_tx,
      broadcast_rx,
    };

    (studio, processor)
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  /// Clock used to stamp live events; the engine must read the same one.
  pub fn clock(&self) -> HostClock {
    self.clock
  }

  pub fn instruments(&self) -> &dyn InstrumentHost {
    &*self.instruments
  }

  pub fn tracks(&self) -> &[Track] {
    &self.tracks
  }

  pub fn track(&self, index: usize) -> Option<&Track> {
    self.tracks.get(index)
  }

  pub fn track_mut(&mut self, index: usize) -> Option<&mut Track> {
    self.tracks.get_mut(index)
  }

  pub fn track_by_id(&self, id: TrackId) -> Option<&Track> {
    self.tracks.iter().find(|track| track.id() == id)
  }

  pub fn track_by_id_mut(&mut self, id: TrackId) -> Option<&mut Track> {
    self.tracks.iter_mut().find(|track| track.id() == id)
  }

  pub fn create_track<N, C>(&mut self, name: N, color: C) -> Result<TrackId, StudioError>
  where
    N: Into<String>,
    C: Into<Color>,
  {
    let max = self.config.engine.max_tracks;
    if self.tracks.len() >= max {
      return Err(StudioError::TooManyTracks { max });
    }

    self.collect_garbage();

    let (track, processor) = Track::new(
      name,
      color,
      self.config.track_settings(),
      self.clock,
      self.broadcast_tx.clone(),
    );
    self
      .engine_tx
      .try_send(EngineCommand::AddTrack(Box::new(processor)))?;

    let id = track.id();
    info!("Created track {} ({})", track.name(), id);
    self.tracks.push(track);
    Ok(id)
  }

  pub fn remove_track(&mut self, id: TrackId) -> Result<Track, StudioError> {
    let index = self
      .tracks
      .iter()
      .position(|track| track.id() == id)
      .ok_or(StudioError::TrackNotFound { track: id })?;

    self.engine_tx.try_send(EngineCommand::RemoveTrack(id))?;
    info!("Removed track {}", id);
    Ok(self.tracks.remove(index))
  }

  /// Starts loading an instrument; the callback runs on the loader's thread.
  pub fn load_instrument_async(&self, description: InstrumentDescription, callback: LoadCallback) {
    debug!("Loading instrument {} ...", description.identifier);
    self.instruments.load_async(description, callback);
  }

  /// Attaches a loaded instrument to a track that may have been removed meanwhile.
  pub fn attach_instrument(
    &mut self,
    id: TrackId,
    instrument: Box<dyn Instrument>,
  ) -> Result<&mut Track, StudioError> {
    let track = self
      .tracks
      .iter_mut()
      .find(|track| track.id() == id)
      .ok_or(StudioError::TrackNotFound { track: id })?;
    track.set_generator(instrument)?;
    Ok(track)
  }

  pub fn play(&self, restart: bool) -> Result<(), StudioError> {
    self.transport(TransportCommand::Play { restart })
  }

  pub fn stop(&self) -> Result<(), StudioError> {
    self.transport(TransportCommand::Stop)
  }

  pub fn set_tempo(&self, bpm: f64) -> Result<(), StudioError> {
    self.transport(TransportCommand::SetTempo(Tempo::new(bpm)))
  }

  pub fn set_position(&self, quarters: f64) -> Result<(), StudioError> {
    self.transport(TransportCommand::SetPosition(quarters))
  }

  fn transport(&self, command: TransportCommand) -> Result<(), StudioError> {
    self
      .engine_tx
      .try_send(EngineCommand::Transport(command))
      .map_err(StudioError::from)
  }

  /// The track list synchronisation packet: resolution, count and every track's info.
  pub fn track_list_packet(&self) -> Writer {
    let ticks_per_quarter_note = self.config.engine.ticks_per_quarter_note.min(u32::from(u16::MAX));
    let count = self.tracks.len().min(usize::from(u8::MAX));
    let mut writer = packets::sync_track_info_packet(ticks_per_quarter_note as u16, count as u8);
    for track in self.tracks.iter().take(count) {
      writer.write_string(&track.id().to_string());
      track.write_track_info(&mut writer);
    }
    writer
  }

  /// The mixer state of every track: pan, pan law, solo and plugin names.
  pub fn mixer_info_packet(&self) -> Writer {
    let count = self.tracks.len().min(usize::from(u8::MAX));
    let mut writer = packets::track_mixer_info_packet(count as u8);
    for track in self.tracks.iter().take(count) {
      track.write_mixer_info(&mut writer);
    }
    writer
  }

  /// Pushes the mixer state of a single track to every client.
  pub fn broadcast_mixer_info(&self, index: usize) {
    if let Some(track) = self.tracks.get(index) {
      let mut writer = packets::track_mixer_info_packet(1);
      track.write_mixer_info(&mut writer);
      drop(self.broadcast_tx.send(writer.into_bytes()));
    }
  }

  pub fn broadcast_track_list(&self) {
    drop(self.broadcast_tx.send(self.track_list_packet().into_bytes()));
  }

  /// Packets queued for every client since the last call.
  pub fn pending_broadcasts(&self) -> TryIter<'_, Vec<u8>> {
    self.broadcast_rx.try_iter()
  }

  /// Drops the values the engine has released.
  pub fn collect_garbage(&self) -> usize {
    let tracks = self.retire_rx.try_iter().count();
    let updates: usize = self.tracks.iter().map(Track::collect_garbage).sum();
    tracks + updates
  }
}

/// Audio side of the studio: owns the transport and renders every track.
pub struct StudioProcessor {
  sample_rate: SampleRate,
  transport: Transport,
  tracks: Vec<Box<TrackProcessor>>,
  track_audio: audio::Buffer<f32>,
  events: midi::Buffer,

  engine_rx: Receiver<EngineCommand>,
  retire_tx: Sender<Box<TrackProcessor>>,
}

impl StudioProcessor {
  fn new(
    config: &Config,
    engine_rx: Receiver<EngineCommand>,
    retire_tx: Sender<Box<TrackProcessor>>,
  ) -> StudioProcessor {
    StudioProcessor {
      sample_rate: config.audio.sample_rate,
      transport: Transport::new(config.audio.sample_rate, config.engine.ticks_per_quarter_note),
      tracks: Vec::with_capacity(config.engine.max_tracks),
      track_audio: audio::Buffer::new(NUM_CHANNELS, config.audio.frames),
      events: midi::Buffer::with_capacity(config.engine.event_buffer_capacity),
      engine_rx,
      retire_tx,
    }
  }

  /// Changes the stream format. Not real-time safe.
  pub fn prepare(&mut self, sample_rate: SampleRate, max_frames: usize) {
    self.apply_commands();
    self.sample_rate = sample_rate;
    self.transport.set_sample_rate(sample_rate);
    self.track_audio = audio::Buffer::new(NUM_CHANNELS, max_frames);
    for track in self.tracks.iter_mut() {
      track.prepare(sample_rate, max_frames);
    }
  }

  pub fn sample_rate(&self) -> SampleRate {
    self.sample_rate
  }

  pub fn transport(&self) -> &Transport {
    &self.transport
  }

  pub fn num_tracks(&self) -> usize {
    self.tracks.len()
  }

  /// Renders one block of the mix into `output`, starting at host time `now`.
  pub fn process(&mut self, output: &mut audio::Buffer<f32>, now: ClockTime) {
    self.apply_commands();

    let frames = output.frames().min(self.track_audio.max_frames());
    output.set_frames(frames);
    output.clear();

    let position = self.transport.snapshot();
    let any_soloed = self.tracks.iter().any(|track| track.is_soloed());
    for track in self.tracks.iter_mut() {
      self.track_audio.set_frames(frames);
      self.track_audio.clear();
      self.events.reset();
      // silenced tracks keep running so their voices and sequence stay in time
      track.process_block(&mut self.track_audio, &mut self.events, position, now);
      if any_soloed && !track.is_soloed() {
        continue;
      }
      for channel in 0..output.num_channels().min(NUM_CHANNELS) {
        output.add_channel_from(channel, &self.track_audio, channel);
      }
    }

    self.transport.advance(frames);
  }

  fn apply_commands(&mut self) {
    while let Ok(command) = self.engine_rx.try_recv() {
      match command {
        EngineCommand::AddTrack(track) => {
          if self.tracks.len() < self.tracks.capacity() {
            self.tracks.push(track);
          } else {
            drop(self.retire_tx.try_send(track));
          }
        }
        EngineCommand::RemoveTrack(id) => {
          if let Some(index) = self.tracks.iter().position(|track| track.id() == id) {
            let track = self.tracks.remove(index);
            drop(self.retire_tx.try_send(track));
          }
        }
        EngineCommand::Transport(command) => match command {
          TransportCommand::Play { restart } => {
            self.transport.play(restart);
          }
          TransportCommand::Stop => self.transport.stop(),
          TransportCommand::SetTempo(tempo) => self.transport.set_tempo(tempo),
          TransportCommand::SetPosition(quarters) => self.transport.set_position(quarters),
        },
      }
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::instrument::{BuiltinInstruments, InstrumentCatalog};
  use crate::protocol::Reader;

  fn config() -> Config {
    let mut config = Config::default();
    config.audio.sample_rate = 48_000;
    config.audio.frames = 480;
    config.engine.max_tracks = 2;
    config
  }

  fn studio() -> (Studio, StudioProcessor) {
    Studio::new(config(), Box::new(BuiltinInstruments::inline()))
  }

  #[test]
  pub fn create_and_remove_tracks() {
    let (mut studio, mut processor) = studio();
    let lead = studio.create_track("Lead", "#ff0000").unwrap();
    let bass = studio.create_track("Bass", "#00ff00").unwrap();
    match studio.create_track("Drums", "#0000ff") {
      Err(StudioError::TooManyTracks { max }) => assert_eq!(max, 2),
      other => panic!("unexpected result {:?}", other),
    }

    let mut output = audio::Buffer::new(2, 480);
    processor.process(&mut output, ClockTime::zero());
    assert_eq!(processor.num_tracks(), 2);

    assert_eq!(studio.remove_track(lead).unwrap().name(), "Lead");
    assert!(studio.track_by_id(lead).is_none());
    assert_eq!(studio.track(0).map(|t| t.id()), Some(bass));

    processor.process(&mut output, ClockTime::zero());
    assert_eq!(processor.num_tracks(), 1);
    assert_eq!(studio.collect_garbage(), 1);
  }

  #[test]
  pub fn transport_commands_reach_the_engine() {
    let (studio, mut processor) = studio();
    studio.set_tempo(60.0).unwrap();
    studio.play(false).unwrap();

    let mut output = audio::Buffer::new(2, 480);
    processor.process(&mut output, ClockTime::zero());
    assert!(processor.transport().is_playing());
    assert_eq!(processor.transport().get_tempo().bpm(), 60.0);
    assert!((processor.transport().get_position() - 0.01).abs() < 1e-9);

    studio.stop().unwrap();
    studio.set_position(2.0).unwrap();
    processor.process(&mut output, ClockTime::zero());
    assert!(!processor.transport().is_playing());
    assert_eq!(processor.transport().get_position(), 2.0);
  }

  #[test]
  pub fn mixes_instrument_tracks() {
    let (mut studio, mut processor) = studio();
    synth_track(&mut studio, "Lead");
    studio.track(0).unwrap().push_live_event([0x90, 69, 127]).unwrap();

    let mut output = audio::Buffer::new(2, 480);
    processor.process(&mut output, studio.clock().now());
    assert!(output.channel(0).iter().any(|s| *s != 0.0));
  }

  fn synth_track(studio: &mut Studio, name: &str) -> TrackId {
    let id = studio.create_track(name, "#ff0000").unwrap();
    let description = studio
      .instruments()
      .type_for_identifier("builtin:synth1")
      .unwrap();
    let (tx, rx) = crossbeam_channel::unbounded();
    studio.load_instrument_async(description, Box::new(move |result| drop(tx.send(result))));
    let instrument = rx.try_recv().unwrap().unwrap();
    studio.attach_instrument(id, instrument).unwrap();
    id
  }

  #[test]
  pub fn soloed_tracks_silence_the_rest() {
    let (mut studio, mut processor) = studio();
    synth_track(&mut studio, "Lead");
    synth_track(&mut studio, "Bass");
    studio.track(0).unwrap().set_soloed(true);
    studio.track(1).unwrap().push_live_event([0x90, 69, 127]).unwrap();

    let mut output = audio::Buffer::new(2, 480);
    processor.process(&mut output, studio.clock().now());
    assert!(output.channel(0).iter().all(|s| *s == 0.0));

    studio.track(0).unwrap().set_soloed(false);
    processor.process(&mut output, studio.clock().now());
    assert!(output.channel(0).iter().any(|s| *s != 0.0));
  }

  #[test]
  pub fn mixer_info_packet() {
    let (mut studio, _processor) = studio();
    let lead = synth_track(&mut studio, "Lead");
    let bass = studio.create_track("Bass", "#00ff00").unwrap();
    studio.track(1).unwrap().set_pan(-0.25);
    studio.track(1).unwrap().set_soloed(true);

    let bytes = studio.mixer_info_packet().into_bytes();
    let mut reader = Reader::new(&bytes);
    assert_eq!(reader.read_u8(), Ok(3));
    assert_eq!(reader.read_u8(), Ok(2));

    assert_eq!(reader.read_string(), Ok(lead.to_string()));
    assert_eq!(reader.read_i8(), Ok(0));
    assert_eq!(reader.read_u8(), Ok(crate::track::PAN_RULE_BALANCED));
    assert_eq!(reader.read_bool(), Ok(false));
    assert_eq!(reader.read_u8(), Ok(1));
    assert_eq!(reader.read_string(), Ok("Synth1".to_string()));

    assert_eq!(reader.read_string(), Ok(bass.to_string()));
    assert_eq!(reader.read_i8(), Ok(-25));
    assert_eq!(reader.read_u8(), Ok(crate::track::PAN_RULE_BALANCED));
    assert_eq!(reader.read_bool(), Ok(true));
    assert_eq!(reader.read_u8(), Ok(0));
    assert_eq!(reader.remaining(), 0);

    studio.broadcast_mixer_info(1);
    studio.broadcast_mixer_info(7);
    assert_eq!(studio.pending_broadcasts().count(), 1);
  }

  #[test]
  pub fn attach_to_a_removed_track_fails() {
    let (mut studio, _processor) = studio();
    let id = studio.create_track("Lead", "#ff0000").unwrap();
    studio.remove_track(id).unwrap();
    let instrument = Box::new(crate::instrument::synth::Synth::new(
      "Synth1",
      Default::default(),
    ));
    match studio.attach_instrument(id, instrument) {
      Err(StudioError::TrackNotFound { track }) => assert_eq!(track, id),
      _ => panic!("expected TrackNotFound"),
    }
  }

  #[test]
  pub fn track_list_packet() {
    let (mut studio, _processor) = studio();
    let id = studio.create_track("Lead", "#ff0000").unwrap();
    let bytes = studio.track_list_packet().into_bytes();
    let mut reader = Reader::new(&bytes);
    assert_eq!(reader.read_u8(), Ok(1));
    assert_eq!(reader.read_u16(), Ok(96));
    assert_eq!(reader.read_u8(), Ok(1));
    assert_eq!(reader.read_string(), Ok(id.to_string()));
    assert_eq!(reader.read_string(), Ok("Lead".to_string()));

    studio.broadcast_track_list();
    assert_eq!(studio.pending_broadcasts().count(), 1);
    assert_eq!(studio.pending_broadcasts().count(), 0);
  }
}
