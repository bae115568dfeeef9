use crate::midi::messages::{Message, RawMessage};
use crate::midi::types::{U14, U4, U7};

/// Decodes channel voice messages out of a byte stream.
/// System and malformed messages come out as `Message::Unknown`.
pub struct Decoder<'a> {
  pos: usize,
  start: usize,
  data: &'a [u8],
}

impl<'a> Decoder<'a> {
  pub fn new(data: &'a [u8]) -> Decoder<'a> {
    Decoder {
      pos: 0,
      start: 0,
      data,
    }
  }

  /// Decodes the first message of a short (up to three bytes) event.
  pub fn decode_short(data: &[u8]) -> Option<Message> {
    Decoder::new(data).next()
  }

  fn unknown(&self, end: usize) -> Message {
    Message::Unknown(RawMessage::new(&self.data[self.start..end]))
  }

  fn next_data(&mut self) -> Result<U7, usize> {
    match self.data.get(self.pos) {
      Some(&byte) if byte & 0x80 == 0 => {
        self.pos += 1;
        Ok(byte)
      }
      _ => Err(self.pos),
    }
  }

  fn next_data2(&mut self) -> Result<(U7, U7), usize> {
    let d1 = self.next_data()?;
    let d2 = self.next_data()?;
    Ok((d1, d2))
  }

  fn decode_note(&mut self, channel: U4, is_on: bool) -> Message {
    match self.next_data2() {
      Ok((key, velocity)) if is_on => Message::NoteOn {
        channel,
        key,
        velocity,
      },
      Ok((key, velocity)) => Message::NoteOff {
        channel,
        key,
        velocity,
      },
      Err(end) => self.unknown(end),
    }
  }

  fn decode_control_change(&mut self, channel: U4) -> Message {
    match self.next_data2() {
      Ok((120, 0)) => Message::AllSoundOff { channel },
      Ok((123, 0)) => Message::AllNotesOff { channel },
      Ok((controller, value)) => Message::ControlChange {
        channel,
        controller,
        value,
      },
      Err(end) => self.unknown(end),
    }
  }

  fn decode(&mut self, status: u8) -> Message {
    let channel = status & 0x0f;
    match (status >> 4) & 0x0f {
      0b1000 => self.decode_note(channel, false),
      0b1001 => self.decode_note(channel, true),
      0b1010 => match self.next_data2() {
        Ok((key, value)) => Message::PolyphonicKeyPressure {
          channel,
          key,
          value,
        },
        Err(end) => self.unknown(end),
      },
      0b1011 => self.decode_control_change(channel),
      0b1100 => match self.next_data() {
        Ok(value) => Message::ProgramChange { channel, value },
        Err(end) => self.unknown(end),
      },
      0b1101 => match self.next_data() {
        Ok(value) => Message::ChannelPressure { channel, value },
        Err(end) => self.unknown(end),
      },
      0b1110 => match self.next_data2() {
        Ok((lsb, msb)) => Message::PitchBend {
          channel,
          value: (U14::from(msb) << 7) | U14::from(lsb),
        },
        Err(end) => self.unknown(end),
      },
      _ => {
        // system messages and stray data bytes travel through untouched
        while self.next_data().is_ok() {}
        self.unknown(self.pos)
      }
    }
  }
}

impl<'a> Iterator for Decoder<'a> {
  type Item = Message;

  fn next(&mut self) -> Option<Message> {
    if self.pos < self.data.len() {
      let status = self.data[self.pos];
      self.start = self.pos;
      self.pos += 1;
      Some(self.decode(status))
    } else {
      None
    }
  }
}
