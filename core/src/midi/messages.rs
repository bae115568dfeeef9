use crate::midi::types::{U14, U4, U7};

/// Bytes of a message the engine does not interpret, kept so it can be forwarded.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct RawMessage {
  data: [u8; 3],
  len: u8,
}

impl RawMessage {
  pub fn new(bytes: &[u8]) -> RawMessage {
    let len = bytes.len().min(3);
    let mut data = [0u8; 3];
    data[..len].copy_from_slice(&bytes[..len]);
    RawMessage {
      data,
      len: len as u8,
    }
  }

  pub fn bytes(&self) -> &[u8] {
    &self.data[..self.len as usize]
  }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Message {
  NoteOff { channel: U4, key: U7, velocity: U7 },
  NoteOn { channel: U4, key: U7, velocity: U7 },
  PolyphonicKeyPressure { channel: U4, key: U7, value: U7 },
  ControlChange { channel: U4, controller: U7, value: U7 },
  ProgramChange { channel: U4, value: U7 },
  ChannelPressure { channel: U4, value: U7 },
  PitchBend { channel: U4, value: U14 },
  AllSoundOff { channel: U4 },
  AllNotesOff { channel: U4 },
  Unknown(RawMessage),
}

impl Message {
  /// All notes off on a 1-based MIDI channel, as musicians number them.
  pub fn all_notes_off(channel: u8) -> Message {
    Message::AllNotesOff {
      channel: channel.saturating_sub(1) & 0x0f,
    }
  }

  /// A note on with zero velocity is a note off.
  pub fn is_note_on(&self) -> bool {
    match self {
      Message::NoteOn { velocity, .. } => *velocity > 0,
      _ => false,
    }
  }

  pub fn is_note_off(&self) -> bool {
    match self {
      Message::NoteOff { .. } => true,
      Message::NoteOn { velocity, .. } => *velocity == 0,
      _ => false,
    }
  }

  pub fn is_note_on_or_off(&self) -> bool {
    match self {
      Message::NoteOn { .. } | Message::NoteOff { .. } => true,
      _ => false,
    }
  }

  /// Channel and key of note messages.
  pub fn note(&self) -> Option<(U4, U7)> {
    match *self {
      Message::NoteOn { channel, key, .. } | Message::NoteOff { channel, key, .. } => {
        Some((channel, key))
      }
      _ => None,
    }
  }

  pub fn velocity(&self) -> U7 {
    match *self {
      Message::NoteOn { velocity, .. } | Message::NoteOff { velocity, .. } => velocity,
      _ => 0,
    }
  }
}

#[cfg(test)]
mod test {
  use super::{Message, RawMessage};

  #[test]
  pub fn note_classification() {
    let on = Message::NoteOn {
      channel: 0,
      key: 60,
      velocity: 100,
    };
    let silent_on = Message::NoteOn {
      channel: 0,
      key: 60,
      velocity: 0,
    };
    let off = Message::NoteOff {
      channel: 0,
      key: 60,
      velocity: 64,
    };
    assert!(on.is_note_on() && !on.is_note_off());
    assert!(!silent_on.is_note_on() && silent_on.is_note_off());
    assert!(off.is_note_off());
    assert!(on.is_note_on_or_off() && silent_on.is_note_on_or_off() && off.is_note_on_or_off());
    assert!(!Message::all_notes_off(1).is_note_on_or_off());
    assert_eq!(on.note(), Some((0, 60)));
    assert_eq!(on.velocity(), 100);
  }

  #[test]
  pub fn all_notes_off_uses_one_based_channels() {
    assert_eq!(Message::all_notes_off(1), Message::AllNotesOff { channel: 0 });
    assert_eq!(Message::all_notes_off(16), Message::AllNotesOff { channel: 15 });
  }

  #[test]
  pub fn raw_message_keeps_at_most_three_bytes() {
    assert_eq!(RawMessage::new(&[0xf8]).bytes(), &[0xf8]);
    assert_eq!(RawMessage::new(&[1, 2, 3, 4]).bytes(), &[1, 2, 3]);
  }
}
