use std::convert::TryFrom;

use super::packets::ServerOpcode;
use super::{ProtocolError, Reader};
use crate::midi::Decoder;
use crate::track::TimedMessage;

/// Bytes taken by each event of an `AddMidiEvents` request.
const TIMED_EVENT_SIZE: usize = 8 + 3;

/// Pan positions travel as percents, anything outside this range leaves the pan unchanged.
pub const PAN_PERCENT_RANGE: std::ops::RangeInclusive<i8> = -100..=100;

/// A fully decoded client message.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
  Reply,
  GetExplorerData {
    reply_id: u32,
    kind: u8,
    path: String,
  },
  CreateTrack {
    reply_id: i32,
    name: String,
    color: String,
    identifier: String,
  },
  Refresh,
  MidiMessage {
    track_index: u8,
    data: [u8; 3],
  },
  UpdateTrackInfo {
    track_index: u8,
    name: String,
    color: String,
    gain: f32,
    muted: bool,
    soloed: bool,
    pan: i8,
  },
  LoadInstrument {
    reply_id: i32,
    track_index: u8,
    identifier: String,
  },
  AddMidiEvents {
    track_index: u8,
    time_format: u16,
    events: Vec<TimedMessage>,
  },
  SetTransport {
    playing: bool,
    bpm: f64,
    ppq_position: f64,
  },
  GetTracksMixerInfo,
}

impl Request {
  /// Decodes a whole message. Nothing is executed unless the payload is complete.
  pub fn decode(data: &[u8]) -> Result<Request, ProtocolError> {
    let mut reader = Reader::new(data);
    let opcode = ServerOpcode::try_from(reader.read_u8()?)?;
    let request = match opcode {
      ServerOpcode::Reply => {
        reader.read_rest();
        Request::Reply
      }

      ServerOpcode::GetExplorerData => Request::GetExplorerData {
        reply_id: reader.read_u32()?,
        kind: reader.read_u8()?,
        path: reader.read_string()?,
      },

      ServerOpcode::CreateTrack => {
        let reply_id = reader.read_i32()?;
        let name = reader.read_string()?;
        let color = reader.read_string()?;
        reader.read_u8()?;
        let identifier = reader.read_string()?;
        Request::CreateTrack {
          reply_id,
          name,
          color,
          identifier,
        }
      }

      ServerOpcode::Refresh => Request::Refresh,

      ServerOpcode::MidiMessage => Request::MidiMessage {
        track_index: reader.read_u8()?,
        data: [reader.read_u8()?, reader.read_u8()?, reader.read_u8()?],
      },

      ServerOpcode::UpdateTrackInfo => Request::UpdateTrackInfo {
        track_index: reader.read_u8()?,
        name: reader.read_string()?,
        color: reader.read_string()?,
        gain: reader.read_f32()?,
        muted: reader.read_bool()?,
        soloed: reader.read_bool()?,
        pan: reader.read_i8()?,
      },

      ServerOpcode::LoadInstrument => Request::LoadInstrument {
        reply_id: reader.read_i32()?,
        track_index: reader.read_u8()?,
        identifier: reader.read_string()?,
      },

      ServerOpcode::AddMidiEvents => {
        let track_index = reader.read_u8()?;
        let time_format = reader.read_u16()?;
        let count = usize::from(reader.read_u16()?);
        let needed = count * TIMED_EVENT_SIZE;
        if needed > reader.remaining() {
          return Err(ProtocolError::UnexpectedEnd {
            needed,
            remaining: reader.remaining(),
          });
        }

        let mut events = Vec::with_capacity(count);
        for _ in 0..count {
          let timestamp = reader.read_f64()?;
          let bytes = [reader.read_u8()?, reader.read_u8()?, reader.read_u8()?];
          if let Some(message) = Decoder::decode_short(&bytes) {
            events.push(TimedMessage { timestamp, message });
          }
        }

        Request::AddMidiEvents {
          track_index,
          time_format,
          events,
        }
      }

      ServerOpcode::SetTransport => Request::SetTransport {
        playing: reader.read_bool()?,
        bpm: reader.read_f64()?,
        ppq_position: reader.read_f64()?,
      },

      ServerOpcode::GetTracksMixerInfo => Request::GetTracksMixerInfo,
    };
    Ok(request)
  }

  pub fn opcode(&self) -> ServerOpcode {
    match self {
      Request::Reply => ServerOpcode::Reply,
      Request::GetExplorerData { .. } => ServerOpcode::GetExplorerData,
      Request::CreateTrack { .. } => ServerOpcode::CreateTrack,
      Request::Refresh => ServerOpcode::Refresh,
      Request::MidiMessage { .. } => ServerOpcode::MidiMessage,
      Request::UpdateTrackInfo { .. } => ServerOpcode::UpdateTrackInfo,
      Request::LoadInstrument { .. } => ServerOpcode::LoadInstrument,
      Request::AddMidiEvents { .. } => ServerOpcode::AddMidiEvents,
      Request::SetTransport { .. } => ServerOpcode::SetTransport,
      Request::GetTracksMixerInfo => ServerOpcode::GetTracksMixerInfo,
    }
  }
}
