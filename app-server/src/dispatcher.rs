use crossbeam_channel::Sender;
use failure::Fail;
use log::{debug, info, trace, warn};

use echo_studio_core::color::Color;
use echo_studio_core::instrument::{InstrumentCatalog, InstrumentDescription, LoadResult};
use echo_studio_core::protocol::packets::{self, EXPLORER_INSTRUMENTS};
use echo_studio_core::protocol::requests::PAN_PERCENT_RANGE;
use echo_studio_core::protocol::{ProtocolError, Request, IDENTIFIER_SEPARATOR};
use echo_studio_core::studio::{Studio, StudioError};
use echo_studio_core::track::{TrackError, TrackId};

use crate::server::{Message as ServerMessage, ALL_PORTS};

#[derive(Debug, Fail)]
pub enum DispatchError {
  #[fail(display = "Malformed message from client {}: {}", port, cause)]
  Protocol {
    port: u16,
    #[cause]
    cause: ProtocolError,
  },

  #[fail(display = "{}", _0)]
  Studio(#[cause] StudioError),

  #[fail(display = "{}", _0)]
  Track(#[cause] TrackError),
}

impl From<StudioError> for DispatchError {
  fn from(err: StudioError) -> Self {
    DispatchError::Studio(err)
  }
}

impl From<TrackError> for DispatchError {
  fn from(err: TrackError) -> Self {
    DispatchError::Track(err)
  }
}

/// Queues packets for the WebSocket router.
#[derive(Clone)]
pub struct Outbox {
  server_tx: Sender<ServerMessage>,
}

impl Outbox {
  pub fn new(server_tx: Sender<ServerMessage>) -> Outbox {
    Outbox { server_tx }
  }

  pub fn reply(&self, port: u16, data: Vec<u8>) {
    drop(self.server_tx.send(ServerMessage::Outgoing { data, port }));
  }

  pub fn broadcast(&self, data: Vec<u8>) {
    self.reply(ALL_PORTS, data);
  }
}

/// The outcome of an instrument load requested by a client.
pub struct LoadCompletion {
  pub track: TrackId,
  pub reply_id: i32,
  pub port: u16,
  /// Give the track the instrument's name once attached
  pub rename: bool,
  pub result: LoadResult,
}

/// Executes client requests against the studio.
///
/// Instrument loads complete on the loader's thread. Their results come back through
/// the completion channel and must be handed to `complete_load` by the owner of the
/// studio, which is where the track id is checked against the tracks still alive.
pub struct Dispatcher {
  completion_tx: Sender<LoadCompletion>,
}

impl Dispatcher {
  pub fn new(completion_tx: Sender<LoadCompletion>) -> Dispatcher {
    Dispatcher { completion_tx }
  }

  pub fn handle(
    &self,
    studio: &mut Studio,
    port: u16,
    data: &[u8],
    outbox: &Outbox,
  ) -> Result<(), DispatchError> {
    let request =
      Request::decode(data).map_err(|cause| DispatchError::Protocol { port, cause })?;
    debug!("[{}] {:?}", port, request.opcode());

    let result = self.execute(studio, port, request, outbox);
    Self::flush_broadcasts(studio, outbox);
    result
  }

  pub fn complete_load(&self, studio: &mut Studio, completion: LoadCompletion, outbox: &Outbox) {
    let LoadCompletion {
      track,
      reply_id,
      port,
      rename,
      result,
    } = completion;

    let error = match result {
      Ok(instrument) => {
        let name = instrument.name().to_string();
        match studio.attach_instrument(track, instrument) {
          Ok(track) => {
            if rename {
              track.set_name(name.as_str());
            }
            info!("Instrument {} attached to track {}", name, track.id());
            studio.broadcast_track_list();
            String::new()
          }
          Err(err) => {
            warn!("{}", err);
            err.to_string()
          }
        }
      }
      Err(err) => {
        warn!("Failed to load an instrument for track {}: {}", track, err);
        err
      }
    };

    let mut packet = packets::reply_packet(reply_id as u32);
    packet.write_string(error.as_str());
    outbox.reply(port, packet.into_bytes());

    Self::flush_broadcasts(studio, outbox);
  }

  fn execute(
    &self,
    studio: &mut Studio,
    port: u16,
    request: Request,
    outbox: &Outbox,
  ) -> Result<(), DispatchError> {
    match request {
      Request::Reply => {}

      Request::GetExplorerData {
        reply_id,
        kind,
        path,
      } => Self::explorer_data(studio, port, reply_id, kind, path.as_str(), outbox),

      Request::CreateTrack {
        reply_id,
        name,
        color,
        identifier,
      } => {
        let color = if color.is_empty() {
          Color::default()
        } else {
          Color::from(color)
        };
        let track = studio.create_track(name, color)?;

        let description = if identifier.is_empty() {
          None
        } else {
          let description = studio.instruments().type_for_identifier(identifier.as_str());
          if description.is_none() {
            debug!("No instrument type for {}", identifier);
          }
          description
        };

        studio.broadcast_track_list();

        if let Some(description) = description {
          self.load_instrument(studio, track, reply_id, port, true, description);
        }
      }

      Request::Refresh => studio.broadcast_track_list(),

      Request::MidiMessage { track_index, data } => match studio.track(usize::from(track_index)) {
        Some(track) => track.push_live_event(data)?,
        None => trace!("Ignoring MIDI for the missing track {}", track_index),
      },

      Request::UpdateTrackInfo {
        track_index,
        name,
        color,
        gain,
        muted,
        soloed,
        pan,
      } => {
        let index = usize::from(track_index);
        let track = match studio.track_mut(index) {
          Some(track) => track,
          None => {
            warn!("Cannot update the missing track {}", track_index);
            return Ok(());
          }
        };
        if !name.is_empty() {
          track.set_name(name);
        }
        if !color.is_empty() {
          track.set_color(color);
        }
        if gain >= 0.0 {
          track.set_gain(gain);
        }
        if muted != track.is_bypassed() {
          track.set_muted(muted);
        }
        track.set_soloed(soloed);
        if PAN_PERCENT_RANGE.contains(&pan) {
          track.set_pan(f32::from(pan) / 100.0);
        }
        studio.broadcast_track_list();
        studio.broadcast_mixer_info(index);
      }

      Request::LoadInstrument {
        reply_id,
        track_index,
        identifier,
      } => {
        let track = studio.track(usize::from(track_index)).map(|track| track.id());
        let description = studio.instruments().type_for_identifier(identifier.as_str());
        match (track, description) {
          (Some(track), Some(description)) => {
            self.load_instrument(studio, track, reply_id, port, false, description)
          }
          (None, _) => Self::reply_error(
            port,
            reply_id,
            format!("Track {} not found", track_index),
            outbox,
          ),
          (_, None) => Self::reply_error(
            port,
            reply_id,
            format!("Unknown instrument identifier: {}", identifier),
            outbox,
          ),
        }
      }

      Request::AddMidiEvents {
        track_index,
        time_format,
        events,
      } => match studio.track_mut(usize::from(track_index)) {
        Some(track) => track.add_midi_events(&events, u32::from(time_format))?,
        None => warn!("Dropping {} events for the missing track {}", events.len(), track_index),
      },

      Request::SetTransport {
        playing,
        bpm,
        ppq_position,
      } => {
        studio.set_tempo(bpm)?;
        studio.set_position(ppq_position)?;
        if playing {
          studio.play(false)?;
        } else {
          studio.stop()?;
        }
      }

      Request::GetTracksMixerInfo => outbox.reply(port, studio.mixer_info_packet().into_bytes()),
    }
    Ok(())
  }

  fn load_instrument(
    &self,
    studio: &Studio,
    track: TrackId,
    reply_id: i32,
    port: u16,
    rename: bool,
    description: InstrumentDescription,
  ) {
    let completion_tx = self.completion_tx.clone();
    studio.load_instrument_async(
      description,
      Box::new(move |result| {
        drop(completion_tx.send(LoadCompletion {
          track,
          reply_id,
          port,
          rename,
          result,
        }));
      }),
    );
  }

  fn explorer_data(
    studio: &Studio,
    port: u16,
    reply_id: u32,
    kind: u8,
    path: &str,
    outbox: &Outbox,
  ) {
    if kind != EXPLORER_INSTRUMENTS {
      debug!("No explorer data of type {}", kind);
      return;
    }

    let instruments = studio.instruments();
    let mut packet = packets::reply_packet(reply_id);
    if path.is_empty() {
      let manufacturers = instruments.manufacturers();
      packet.write_u32(manufacturers.len() as u32);
      for manufacturer in manufacturers.iter() {
        packet.write_string(manufacturer.as_str());
      }
      packet.write_u32(0);
    } else {
      let types = instruments.types_by_manufacturer(path);
      packet.write_u32(0).write_u32(types.len() as u32);
      for description in types.iter() {
        packet.write_string(&format!(
          "{}{}{}",
          description.name, IDENTIFIER_SEPARATOR, description.identifier
        ));
      }
    }
    outbox.reply(port, packet.into_bytes());
  }

  fn reply_error(port: u16, reply_id: i32, error: String, outbox: &Outbox) {
    warn!("{}", error);
    let mut packet = packets::reply_packet(reply_id as u32);
    packet.write_string(error.as_str());
    outbox.reply(port, packet.into_bytes());
  }

  fn flush_broadcasts(studio: &Studio, outbox: &Outbox) {
    for packet in studio.pending_broadcasts() {
      outbox.broadcast(packet);
    }
  }
}

#[cfg(test)]
mod test {
  use crossbeam_channel::{self, Receiver};

  use echo_studio_core::audio;
  use echo_studio_core::config::Config;
  use echo_studio_core::instrument::BuiltinInstruments;
  use echo_studio_core::protocol::{ClientOpcode, ProtocolError, Reader, ServerOpcode, Writer};
  use echo_studio_core::studio::{Studio, StudioProcessor};
  use echo_studio_core::track::PAN_RULE_BALANCED;

  use super::{DispatchError, Dispatcher, LoadCompletion, Outbox};
  use crate::server::{Message as ServerMessage, ALL_PORTS};

  const PORT: u16 = 5000;

  struct Fixture {
    studio: Studio,
    processor: StudioProcessor,
    dispatcher: Dispatcher,
    completion_rx: Receiver<LoadCompletion>,
    outbox: Outbox,
    server_rx: Receiver<ServerMessage>,
  }

  impl Fixture {
    fn new() -> Fixture {
      let mut config = Config::default();
      config.audio.sample_rate = 48_000;
      config.audio.frames = 480;
      let (studio, processor) = Studio::new(config, Box::new(BuiltinInstruments::inline()));
      let (completion_tx, completion_rx) = crossbeam_channel::unbounded();
      let (server_tx, server_rx) = crossbeam_channel::unbounded();
      Fixture {
        studio,
        processor,
        dispatcher: Dispatcher::new(completion_tx),
        completion_rx,
        outbox: Outbox::new(server_tx),
        server_rx,
      }
    }

    fn handle(&mut self, data: &[u8]) -> Result<(), DispatchError> {
      self
        .dispatcher
        .handle(&mut self.studio, PORT, data, &self.outbox)
    }

    fn complete_loads(&mut self) {
      while let Ok(completion) = self.completion_rx.try_recv() {
        self
          .dispatcher
          .complete_load(&mut self.studio, completion, &self.outbox);
      }
    }

    fn sent(&self) -> Vec<(u16, Vec<u8>)> {
      self
        .server_rx
        .try_iter()
        .filter_map(|msg| match msg {
          ServerMessage::Outgoing { port, data } => Some((port, data)),
          _ => None,
        })
        .collect()
    }
  }

  fn create_track(name: &str, identifier: &str) -> Vec<u8> {
    let mut writer = Writer::new();
    writer
      .write_u8(ServerOpcode::CreateTrack as u8)
      .write_i32(7)
      .write_string(name)
      .write_string("#ff0000")
      .write_u8(0)
      .write_string(identifier);
    writer.into_bytes()
  }

  #[test]
  pub fn create_track_without_instrument_only_broadcasts() {
    let mut fixture = Fixture::new();
    fixture.handle(&create_track("Lead", "")).unwrap();
    fixture.complete_loads();

    let sent = fixture.sent();
    assert_eq!(sent.len(), 1);
    let (port, data) = &sent[0];
    assert_eq!(*port, ALL_PORTS);
    let mut reader = Reader::new(data);
    assert_eq!(reader.read_u8(), Ok(ClientOpcode::SyncTrackInfo as u8));
    assert_eq!(reader.read_u16(), Ok(96));
    assert_eq!(reader.read_u8(), Ok(1));
    let id = reader.read_string().unwrap();
    assert_eq!(id.len(), 32);
    assert_eq!(reader.read_string(), Ok("Lead".to_string()));
    assert!(!fixture.studio.track(0).unwrap().has_instrument());
  }

  #[test]
  pub fn create_track_with_instrument_replies_once() {
    let mut fixture = Fixture::new();
    fixture.handle(&create_track("Lead", "builtin:synth1")).unwrap();
    fixture.complete_loads();

    let sent = fixture.sent();
    let replies: Vec<&Vec<u8>> = sent
      .iter()
      .filter(|(port, _)| *port == PORT)
      .map(|(_, data)| data)
      .collect();
    assert_eq!(replies.len(), 1);
    let mut reader = Reader::new(replies[0]);
    assert_eq!(reader.read_u8(), Ok(ClientOpcode::Reply as u8));
    assert_eq!(reader.read_u32(), Ok(7));
    assert_eq!(reader.read_string(), Ok(String::new()));

    // the first broadcast precedes the reply
    assert_eq!(sent[0].0, ALL_PORTS);

    let track = fixture.studio.track(0).unwrap();
    assert!(track.has_instrument());
    assert_eq!(track.name(), "Synth1");

    track.push_live_event([0x90, 69, 127]).unwrap();
    let mut output = audio::Buffer::new(2, 480);
    fixture
      .processor
      .process(&mut output, fixture.studio.clock().now());
    assert!(output.channel(0).iter().any(|s| *s != 0.0));
  }

  #[test]
  pub fn create_track_with_unknown_identifier_does_not_reply() {
    let mut fixture = Fixture::new();
    fixture.handle(&create_track("Lead", "vendor:missing")).unwrap();
    fixture.complete_loads();

    let sent = fixture.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, ALL_PORTS);
    assert_eq!(fixture.studio.tracks().len(), 1);
    assert_eq!(fixture.studio.track(0).unwrap().name(), "Lead");
  }

  #[test]
  pub fn midi_for_a_missing_track_is_ignored() {
    let mut fixture = Fixture::new();
    fixture.handle(&[ServerOpcode::MidiMessage as u8, 3, 0x90, 60, 100]).unwrap();
    assert!(fixture.sent().is_empty());
  }

  #[test]
  pub fn unknown_opcode_is_rejected() {
    let mut fixture = Fixture::new();
    match fixture.handle(&[42, 1, 2, 3]) {
      Err(DispatchError::Protocol {
        port,
        cause: ProtocolError::UnknownOpcode { opcode },
      }) => {
        assert_eq!(port, PORT);
        assert_eq!(opcode, 42);
      }
      other => panic!("unexpected result {:?}", other),
    }
    assert!(fixture.studio.tracks().is_empty());
  }

  #[test]
  pub fn truncated_create_track_changes_nothing() {
    let mut fixture = Fixture::new();
    let data = create_track("Lead", "");
    match fixture.handle(&data[..data.len() - 2]) {
      Err(DispatchError::Protocol {
        cause: ProtocolError::UnexpectedEnd { .. },
        ..
      }) => {}
      other => panic!("unexpected result {:?}", other),
    }
    assert!(fixture.studio.tracks().is_empty());
    assert!(fixture.sent().is_empty());
  }

  #[test]
  pub fn load_for_a_removed_track_replies_with_an_error() {
    let mut fixture = Fixture::new();
    fixture.handle(&create_track("Lead", "builtin:synth1")).unwrap();
    let id = fixture.studio.track(0).unwrap().id();
    fixture.studio.remove_track(id).unwrap();
    fixture.sent();

    fixture.complete_loads();
    let sent = fixture.sent();
    assert_eq!(sent.len(), 1);
    let mut reader = Reader::new(&sent[0].1);
    assert_eq!(reader.read_u8(), Ok(ClientOpcode::Reply as u8));
    assert_eq!(reader.read_u32(), Ok(7));
    assert!(reader.read_string().unwrap().contains(&id.to_string()));
  }

  #[test]
  pub fn explorer_lists_manufacturers_and_types() {
    let mut fixture = Fixture::new();
    let mut writer = Writer::new();
    writer
      .write_u8(ServerOpcode::GetExplorerData as u8)
      .write_u32(11)
      .write_u8(1)
      .write_string("");
    fixture.handle(writer.as_bytes()).unwrap();

    let sent = fixture.sent();
    assert_eq!(sent.len(), 1);
    let mut reader = Reader::new(&sent[0].1);
    assert_eq!(reader.read_u8(), Ok(ClientOpcode::Reply as u8));
    assert_eq!(reader.read_u32(), Ok(11));
    assert_eq!(reader.read_u32(), Ok(2));
    assert_eq!(reader.read_string(), Ok("Echo".to_string()));
    assert_eq!(reader.read_string(), Ok("Generic".to_string()));
    assert_eq!(reader.read_u32(), Ok(0));

    let mut writer = Writer::new();
    writer
      .write_u8(ServerOpcode::GetExplorerData as u8)
      .write_u32(12)
      .write_u8(1)
      .write_string("Generic");
    fixture.handle(writer.as_bytes()).unwrap();

    let sent = fixture.sent();
    let mut reader = Reader::new(&sent[0].1);
    assert_eq!(reader.read_u8(), Ok(ClientOpcode::Reply as u8));
    assert_eq!(reader.read_u32(), Ok(12));
    assert_eq!(reader.read_u32(), Ok(0));
    assert_eq!(reader.read_u32(), Ok(1));
    assert_eq!(
      reader.read_string(),
      Ok("Test Tone#EIM#builtin:test-tone".to_string())
    );
  }

  fn update_track_info(color: &str, gain: f32, muted: bool, soloed: bool, pan: i8) -> Vec<u8> {
    let mut writer = Writer::new();
    writer
      .write_u8(ServerOpcode::UpdateTrackInfo as u8)
      .write_u8(0)
      .write_string("")
      .write_string(color)
      .write_f32(gain)
      .write_bool(muted)
      .write_bool(soloed)
      .write_i8(pan);
    writer.into_bytes()
  }

  #[test]
  pub fn update_track_info_keeps_empty_fields() {
    let mut fixture = Fixture::new();
    fixture.handle(&create_track("Lead", "")).unwrap();
    fixture.sent();
    fixture
      .handle(&update_track_info("#00ff00", -1.0, true, false, i8::MIN))
      .unwrap();

    let track = fixture.studio.track(0).unwrap();
    assert_eq!(track.name(), "Lead");
    assert_eq!(track.color().as_str(), "#00ff00");
    assert_eq!(track.gain(), 1.0);
    assert_eq!(track.pan(), 0.0);
    assert!(!track.is_bypassed());

    let sent = fixture.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].1[0], ClientOpcode::SyncTrackInfo as u8);
    assert_eq!(sent[1].1[0], ClientOpcode::TrackMixerInfo as u8);
  }

  #[test]
  pub fn gain_only_update_does_not_cut_notes() {
    let mut fixture = Fixture::new();
    fixture.handle(&create_track("Lead", "builtin:synth1")).unwrap();
    fixture.complete_loads();

    fixture
      .handle(&update_track_info("", 0.5, false, false, 0))
      .unwrap();
    let track = fixture.studio.track(0).unwrap();
    assert_eq!(track.gain(), 0.5);
    assert_eq!(track.queued_live_events(), 0);

    fixture
      .handle(&update_track_info("", 0.5, true, false, 0))
      .unwrap();
    let track = fixture.studio.track(0).unwrap();
    assert!(track.is_bypassed());
    assert_eq!(track.queued_live_events(), 1);

    fixture
      .handle(&update_track_info("", 0.25, true, false, 0))
      .unwrap();
    assert_eq!(fixture.studio.track(0).unwrap().queued_live_events(), 1);
  }

  #[test]
  pub fn update_track_info_sets_pan_and_solo() {
    let mut fixture = Fixture::new();
    fixture.handle(&create_track("Lead", "")).unwrap();
    fixture.sent();
    fixture
      .handle(&update_track_info("", -1.0, false, true, 50))
      .unwrap();

    let track = fixture.studio.track(0).unwrap();
    assert_eq!(track.pan(), 0.5);
    assert!(track.is_soloed());

    let sent = fixture.sent();
    let (port, data) = &sent[1];
    assert_eq!(*port, ALL_PORTS);
    let mut reader = Reader::new(data);
    assert_eq!(reader.read_u8(), Ok(ClientOpcode::TrackMixerInfo as u8));
    assert_eq!(reader.read_u8(), Ok(1));
    assert_eq!(reader.read_string(), Ok(track.id().to_string()));
    assert_eq!(reader.read_i8(), Ok(50));
    assert_eq!(reader.read_u8(), Ok(PAN_RULE_BALANCED));
    assert_eq!(reader.read_bool(), Ok(true));
    assert_eq!(reader.read_u8(), Ok(0));
  }

  #[test]
  pub fn mixer_info_is_sent_to_the_requester_only() {
    let mut fixture = Fixture::new();
    fixture.handle(&create_track("Lead", "builtin:synth1")).unwrap();
    fixture.handle(&create_track("Bass", "")).unwrap();
    fixture.complete_loads();
    fixture.sent();

    fixture
      .handle(&[ServerOpcode::GetTracksMixerInfo as u8])
      .unwrap();
    let sent = fixture.sent();
    assert_eq!(sent.len(), 1);
    let (port, data) = &sent[0];
    assert_eq!(*port, PORT);
    let mut reader = Reader::new(data);
    assert_eq!(reader.read_u8(), Ok(ClientOpcode::TrackMixerInfo as u8));
    assert_eq!(reader.read_u8(), Ok(2));
    reader.read_string().unwrap();
    assert_eq!(reader.read_i8(), Ok(0));
    assert_eq!(reader.read_u8(), Ok(PAN_RULE_BALANCED));
    assert_eq!(reader.read_bool(), Ok(false));
    assert_eq!(reader.read_u8(), Ok(1));
    assert_eq!(reader.read_string(), Ok("Synth1".to_string()));
  }

  #[test]
  pub fn load_instrument_keeps_the_track_name() {
    let mut fixture = Fixture::new();
    fixture.handle(&create_track("Keys", "")).unwrap();
    let mut writer = Writer::new();
    writer
      .write_u8(ServerOpcode::LoadInstrument as u8)
      .write_i32(9)
      .write_u8(0)
      .write_string("builtin:saw-lead");
    fixture.handle(writer.as_bytes()).unwrap();
    fixture.complete_loads();

    let track = fixture.studio.track(0).unwrap();
    assert!(track.has_instrument());
    assert_eq!(track.name(), "Keys");
  }
}
