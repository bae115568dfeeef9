use crate::midi::{self, Message};
use crate::time::TicksTime;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequenceEvent {
  pub tick: TicksTime,
  pub message: Message,
}

/// A note-on matched with the note-off that ends it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairedNote {
  pub key: u8,
  pub velocity: u8,
  pub on_tick: TicksTime,
  pub duration: TicksTime,
}

/// Note events ordered by tick.
#[derive(Debug, Clone, Default)]
pub struct NoteSequence {
  events: Vec<SequenceEvent>,
}

impl NoteSequence {
  pub fn new() -> NoteSequence {
    NoteSequence { events: Vec::new() }
  }

  /// Inserts after any event already at the same tick.
  pub fn add_event(&mut self, tick: TicksTime, message: Message) {
    let index = self.events.partition_point(|event| event.tick <= tick);
    self.events.insert(index, SequenceEvent { tick, message });
  }

  pub fn len(&self) -> usize {
    self.events.len()
  }

  pub fn is_empty(&self) -> bool {
    self.events.is_empty()
  }

  pub fn events(&self) -> &[SequenceEvent] {
    &self.events
  }

  /// Index of the first event at or after `tick`.
  pub fn next_index_at_tick(&self, tick: f64) -> usize {
    self
      .events
      .partition_point(|event| (event.tick.units() as f64) < tick)
  }

  /// Events with `start <= tick < end`.
  pub fn events_in_window(&self, start: f64, end: f64) -> &[SequenceEvent] {
    let first = self.next_index_at_tick(start);
    let count = self.events[first..]
      .iter()
      .take_while(|event| (event.tick.units() as f64) < end)
      .count();
    &self.events[first..first + count]
  }

  /// Pairs every note-on with the next event on the same channel and key.
  /// A note-off ends the note; a note-on retriggers it, which ends the earlier
  /// note at the retrigger tick. Notes that would last zero ticks are left out.
  pub fn matched_pairs(&self) -> Vec<PairedNote> {
    let mut pairs = Vec::new();
    for (index, event) in self.events.iter().enumerate() {
      if !event.message.is_note_on() {
        continue;
      }
      let note = event.message.note();
      let end = self.events[index + 1..]
        .iter()
        .find(|other| other.message.note() == note && other.message.is_note_on_or_off());

      if let (Some(end), Some((_, key))) = (end, note) {
        if end.tick > event.tick {
          pairs.push(PairedNote {
            key,
            velocity: event.message.velocity(),
            on_tick: event.tick,
            duration: end.tick - event.tick,
          });
        }
      }
    }
    pairs
  }

  /// Places the events of the tick window starting at `start_tick` into a block of `frames` samples.
  /// Returns the number of events written.
  pub fn write_block(
    &self,
    start_tick: f64,
    span: f64,
    frames: usize,
    buffer: &mut midi::Buffer,
  ) -> usize {
    if frames == 0 || !span.is_finite() || span <= 0.0 || !start_tick.is_finite() {
      return 0;
    }

    let last = (frames - 1) as f64;
    let mut written = 0;
    for event in self.events_in_window(start_tick, start_tick + span) {
      let position = (event.tick.units() as f64 - start_tick) / span * frames as f64;
      let offset = position.round().max(0.0).min(last) as u32;
      if buffer.push(offset, event.message) {
        written += 1;
      }
    }
    written
  }
}

#[cfg(test)]
mod test {
  use super::{NoteSequence, PairedNote};
  use crate::midi::{self, Message};
  use crate::time::TicksTime;

  fn note_on(key: u8) -> Message {
    Message::NoteOn {
      channel: 0,
      key,
      velocity: 100,
    }
  }

  fn note_off(key: u8) -> Message {
    Message::NoteOff {
      channel: 0,
      key,
      velocity: 0,
    }
  }

  fn sequence(events: &[(u64, Message)]) -> NoteSequence {
    let mut sequence = NoteSequence::new();
    for (tick, message) in events {
      sequence.add_event(TicksTime::new(*tick), *message);
    }
    sequence
  }

  #[test]
  pub fn window_excludes_events_before_and_at_the_end() {
    let sequence = sequence(&[
      (90, note_on(1)),
      (120, note_on(2)),
      (140, note_on(3)),
      (160, note_on(4)),
    ]);

    let mut buffer = midi::Buffer::with_capacity(8);
    assert_eq!(sequence.write_block(100.0, 50.0, 500, &mut buffer), 2);
    let placed: Vec<(u32, u8)> = buffer
      .iter()
      .map(|event| (event.offset, event.message.note().unwrap().1))
      .collect();
    assert_eq!(placed, vec![(200, 2), (400, 3)]);
  }

  #[test]
  pub fn offsets_round_half_away_from_zero() {
    let sequence = sequence(&[(1, note_on(1))]);
    let mut buffer = midi::Buffer::with_capacity(1);
    // 1 / 4 * 10 = 2.5
    sequence.write_block(0.0, 4.0, 10, &mut buffer);
    assert_eq!(buffer.iter().next().map(|e| e.offset), Some(3));
  }

  #[test]
  pub fn degenerate_blocks_write_nothing() {
    let sequence = sequence(&[(0, note_on(1))]);
    let mut buffer = midi::Buffer::with_capacity(1);
    assert_eq!(sequence.write_block(0.0, 0.0, 64, &mut buffer), 0);
    assert_eq!(sequence.write_block(0.0, 10.0, 0, &mut buffer), 0);
    assert_eq!(sequence.write_block(f64::NAN, 10.0, 64, &mut buffer), 0);
    assert!(buffer.is_empty());
  }

  #[test]
  pub fn insertion_is_stable_for_equal_ticks() {
    let sequence = sequence(&[(10, note_on(1)), (5, note_on(2)), (10, note_off(1))]);
    let order: Vec<(u64, bool)> = sequence
      .events()
      .iter()
      .map(|event| (event.tick.units(), event.message.is_note_on()))
      .collect();
    assert_eq!(order, vec![(5, true), (10, true), (10, false)]);
  }

  #[test]
  pub fn pairs_note_on_with_later_note_off() {
    let sequence = sequence(&[
      (0, note_on(60)),
      (48, note_off(60)),
      (48, note_on(62)),
      (96, Message::NoteOn {
        channel: 0,
        key: 62,
        velocity: 0,
      }),
      (100, note_on(64)),
    ]);
    assert_eq!(
      sequence.matched_pairs(),
      vec![
        PairedNote {
          key: 60,
          velocity: 100,
          on_tick: TicksTime::new(0),
          duration: TicksTime::new(48),
        },
        PairedNote {
          key: 62,
          velocity: 100,
          on_tick: TicksTime::new(48),
          duration: TicksTime::new(48),
        },
      ]
    );
  }

  #[test]
  pub fn retriggered_notes_end_at_the_retrigger() {
    let sequence = sequence(&[
      (0, note_on(60)),
      (10, note_on(60)),
      (20, note_off(60)),
      (30, note_on(61)),
      (30, note_off(61)),
      (40, note_on(62)),
    ]);
    let pairs: Vec<(u64, u64)> = sequence
      .matched_pairs()
      .iter()
      .map(|pair| (pair.on_tick.units(), pair.duration.units()))
      .collect();
    assert_eq!(pairs, vec![(0, 10), (10, 10)]);
    assert_eq!(sequence.len(), 6);
  }

  #[test]
  pub fn retrigger_at_the_same_tick_is_left_out() {
    let sequence = sequence(&[(5, note_on(60)), (5, note_on(60)), (9, note_off(60))]);
    let pairs = sequence.matched_pairs();
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].on_tick, TicksTime::new(5));
    assert_eq!(pairs[0].duration, TicksTime::new(4));
  }

  #[test]
  pub fn lookup_by_tick() {
    let sequence = sequence(&[(10, note_on(1)), (20, note_on(2)), (30, note_on(3))]);
    assert_eq!(sequence.next_index_at_tick(0.0), 0);
    assert_eq!(sequence.next_index_at_tick(20.0), 1);
    assert_eq!(sequence.next_index_at_tick(20.5), 2);
    assert_eq!(sequence.next_index_at_tick(31.0), 3);
    assert_eq!(sequence.events_in_window(15.0, 30.0).len(), 1);
  }
}
