use std::convert::TryFrom;

use super::{ProtocolError, Writer};

/// Separates an instrument name from its identifier in catalog listings.
pub const IDENTIFIER_SEPARATOR: &str = "#EIM#";

/// Catalog listing type for instruments.
pub const EXPLORER_INSTRUMENTS: u8 = 1;

/// Opcodes of messages sent by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerOpcode {
  Reply = 0,
  GetExplorerData = 1,
  CreateTrack = 2,
  Refresh = 3,
  MidiMessage = 4,
  UpdateTrackInfo = 5,
  LoadInstrument = 6,
  AddMidiEvents = 7,
  SetTransport = 8,
  GetTracksMixerInfo = 9,
}

impl TryFrom<u8> for ServerOpcode {
  type Error = ProtocolError;

  fn try_from(opcode: u8) -> Result<Self, Self::Error> {
    match opcode {
      0 => Ok(ServerOpcode::Reply),
      1 => Ok(ServerOpcode::GetExplorerData),
      2 => Ok(ServerOpcode::CreateTrack),
      3 => Ok(ServerOpcode::Refresh),
      4 => Ok(ServerOpcode::MidiMessage),
      5 => Ok(ServerOpcode::UpdateTrackInfo),
      6 => Ok(ServerOpcode::LoadInstrument),
      7 => Ok(ServerOpcode::AddMidiEvents),
      8 => Ok(ServerOpcode::SetTransport),
      9 => Ok(ServerOpcode::GetTracksMixerInfo),
      _ => Err(ProtocolError::UnknownOpcode { opcode }),
    }
  }
}

/// Opcodes of messages sent to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientOpcode {
  Reply = 0,
  SyncTrackInfo = 1,
  TrackMidiData = 2,
  TrackMixerInfo = 3,
}

/// Starts a reply correlated with a request.
pub fn reply_packet(reply_id: u32) -> Writer {
  let mut writer = Writer::new();
  writer
    .write_u8(ClientOpcode::Reply as u8)
    .write_u32(reply_id);
  writer
}

/// Starts a push of the MIDI data of a single track.
pub fn track_midi_data_packet() -> Writer {
  let mut writer = Writer::new();
  writer
    .write_u8(ClientOpcode::TrackMidiData as u8)
    .write_u8(1);
  writer
}

/// Starts a track list synchronisation, `count` tracks must follow.
pub fn sync_track_info_packet(ticks_per_quarter_note: u16, count: u8) -> Writer {
  let mut writer = Writer::new();
  writer
    .write_u8(ClientOpcode::SyncTrackInfo as u8)
    .write_u16(ticks_per_quarter_note)
    .write_u8(count);
  writer
}

/// Starts a mixer state push, `count` track records must follow.
pub fn track_mixer_info_packet(count: u8) -> Writer {
  let mut writer = Writer::new();
  writer
    .write_u8(ClientOpcode::TrackMixerInfo as u8)
    .write_u8(count);
  writer
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  pub fn opcodes() {
    assert_eq!(ServerOpcode::try_from(4), Ok(ServerOpcode::MidiMessage));
    assert_eq!(ServerOpcode::try_from(8), Ok(ServerOpcode::SetTransport));
    assert_eq!(
      ServerOpcode::try_from(9),
      Ok(ServerOpcode::GetTracksMixerInfo)
    );
    assert_eq!(
      ServerOpcode::try_from(42),
      Err(ProtocolError::UnknownOpcode { opcode: 42 })
    );
  }

  #[test]
  pub fn packet_headers() {
    assert_eq!(reply_packet(7).as_bytes(), &[0, 0, 0, 0, 7]);
    assert_eq!(track_midi_data_packet().as_bytes(), &[2, 1]);
    assert_eq!(sync_track_info_packet(96, 3).as_bytes(), &[1, 0, 96, 3]);
    assert_eq!(track_mixer_info_packet(2).as_bytes(), &[3, 2]);
  }
}
