use crate::midi::messages::Message;

/// A MIDI event placed at a sample offset inside the current block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Event {
  pub offset: u32,
  pub message: Message,
  order: u32,
}

/// Per-block event buffer. The capacity is fixed when the track is prepared
/// so that filling it on the audio thread never reallocates.
pub struct Buffer {
  events: Vec<Event>,
  next_order: u32,
}

impl Buffer {
  pub fn new() -> Buffer {
    Buffer::with_capacity(0)
  }

  pub fn with_capacity(capacity: usize) -> Buffer {
    Buffer {
      events: Vec::with_capacity(capacity),
      next_order: 0,
    }
  }

  pub fn reset(&mut self) -> &mut Self {
    self.events.clear();
    self.next_order = 0;
    self
  }

  /// Returns false when the buffer is full and the event was dropped.
  pub fn push(&mut self, offset: u32, message: Message) -> bool {
    if self.events.len() == self.events.capacity() {
      return false;
    }
    self.events.push(Event {
      offset,
      message,
      order: self.next_order,
    });
    self.next_order = self.next_order.wrapping_add(1);
    true
  }

  /// Orders the events by offset, keeping insertion order for equal offsets.
  pub fn sort(&mut self) {
    self.events.sort_unstable_by_key(|event| (event.offset, event.order));
  }

  pub fn iter(&self) -> impl Iterator<Item = &Event> {
    self.events.iter()
  }

  pub fn len(&self) -> usize {
    self.events.len()
  }

  pub fn is_empty(&self) -> bool {
    self.events.is_empty()
  }

  pub fn capacity(&self) -> usize {
    self.events.capacity()
  }
}

impl Default for Buffer {
  fn default() -> Self {
    Buffer::new()
  }
}
