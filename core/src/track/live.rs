use crossbeam_channel::{self, Receiver, Sender, TrySendError};
use failure::Fail;

use crate::midi::{self, Decoder};
use crate::time::{BlockTime, ClockTime};

/// A raw MIDI event injected from outside the sequence, stamped with the host clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiveEvent {
  pub data: [u8; 3],
  pub timestamp: ClockTime,
}

#[derive(Debug, Fail, PartialEq)]
pub enum QueueError {
  #[fail(display = "The live event queue is full")]
  Full,

  #[fail(display = "The live event queue has no consumer")]
  Disconnected,
}

/// Creates a queue holding up to `capacity` events in flight plus `capacity`
/// events held back for later blocks.
pub fn live_event_queue(capacity: usize) -> (LiveEventSender, LiveEventReceiver) {
  let capacity = capacity.max(1);
  let (tx, rx) = crossbeam_channel::bounded(capacity);
  (
    LiveEventSender { tx },
    LiveEventReceiver {
      rx,
      held: Vec::with_capacity(capacity),
      hold_capacity: capacity,
    },
  )
}

/// Producer side, cloned by every control thread that injects events.
#[derive(Clone)]
pub struct LiveEventSender {
  tx: Sender<LiveEvent>,
}

impl LiveEventSender {
  pub fn push(&self, event: LiveEvent) -> Result<(), QueueError> {
    self.tx.try_send(event).map_err(|err| match err {
      TrySendError::Full(_) => QueueError::Full,
      TrySendError::Disconnected(_) => QueueError::Disconnected,
    })
  }

  /// Events pushed but not yet taken by the audio thread.
  pub fn len(&self) -> usize {
    self.tx.len()
  }

  pub fn is_empty(&self) -> bool {
    self.tx.is_empty()
  }
}

/// Consumer side, owned by the audio thread.
pub struct LiveEventReceiver {
  rx: Receiver<LiveEvent>,
  held: Vec<LiveEvent>,
  hold_capacity: usize,
}

impl LiveEventReceiver {
  /// Moves every event stamped before the block horizon into `buffer`.
  /// Later events stay queued: in the hold list while it has room, in the channel
  /// otherwise. Only when both are full is the next event delivered at the last
  /// sample of the block, so producers can keep pushing.
  pub fn drain_into(&mut self, block: &BlockTime, buffer: &mut midi::Buffer) -> usize {
    let horizon = block.horizon();
    let last = block.frames.saturating_sub(1) as u32;
    let mut drained = 0;

    let mut index = 0;
    while index < self.held.len() {
      let event = self.held[index];
      if event.timestamp < horizon {
        self.held.swap_remove(index);
        drained += Self::emit(&event, block.offset_of(event.timestamp), buffer);
      } else {
        index += 1;
      }
    }

    loop {
      if self.held.len() >= self.hold_capacity && !self.rx.is_full() {
        break;
      }
      let event = match self.rx.try_recv() {
        Ok(event) => event,
        Err(_) => break,
      };
      if event.timestamp < horizon {
        drained += Self::emit(&event, block.offset_of(event.timestamp), buffer);
      } else if self.held.len() < self.hold_capacity {
        self.held.push(event);
      } else {
        drained += Self::emit(&event, last, buffer);
      }
    }

    drained
  }

  fn emit(event: &LiveEvent, offset: u32, buffer: &mut midi::Buffer) -> usize {
    match Decoder::decode_short(&event.data) {
      Some(message) if buffer.push(offset, message) => 1,
      _ => 0,
    }
  }

  pub fn held(&self) -> usize {
    self.held.len()
  }
}
