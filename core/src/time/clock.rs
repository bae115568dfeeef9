use std::ops::{Add, AddAssign, Sub};
use std::time::Instant;

use super::SampleRate;

pub const NANOS_PER_SECOND: u64 = 1_000_000_000;

pub type UnitType = u64;
pub const UNITS_PER_SECOND: UnitType = NANOS_PER_SECOND as UnitType;

///! High resolution wall clock time, relative to the studio's host clock origin
#[derive(Debug, PartialOrd, Ord, PartialEq, Eq, Clone, Copy, Default)]
pub struct ClockTime(UnitType);

impl ClockTime {
  pub fn zero() -> ClockTime {
    ClockTime(0)
  }

  pub fn new(units: UnitType) -> ClockTime {
    ClockTime(units)
  }

  pub fn from_seconds(seconds: f64) -> ClockTime {
    if seconds.is_finite() && seconds > 0.0 {
      ClockTime((seconds * UNITS_PER_SECOND as f64).round() as UnitType)
    } else {
      ClockTime::zero()
    }
  }

  pub fn from_samples(samples: usize, sample_rate: SampleRate) -> ClockTime {
    let sample_rate = UnitType::from(sample_rate.max(1));
    ClockTime(samples as UnitType * UNITS_PER_SECOND / sample_rate)
  }

  pub fn units(&self) -> UnitType {
    self.0
  }

  pub fn to_seconds(&self) -> f64 {
    self.0 as f64 / UNITS_PER_SECOND as f64
  }
}

impl Add for ClockTime {
  type Output = ClockTime;

  fn add(self, rhs: ClockTime) -> ClockTime {
    ClockTime(self.0.saturating_add(rhs.0))
  }
}

impl AddAssign for ClockTime {
  fn add_assign(&mut self, rhs: ClockTime) {
    *self = *self + rhs;
  }
}

impl Sub for ClockTime {
  type Output = ClockTime;

  fn sub(self, rhs: ClockTime) -> ClockTime {
    ClockTime(self.0.saturating_sub(rhs.0))
  }
}

/// Monotonic clock shared by the control threads (to stamp live events)
/// and the audio thread (to place them inside a block).
#[derive(Debug, Clone, Copy)]
pub struct HostClock {
  origin: Instant,
}

impl HostClock {
  pub fn new() -> HostClock {
    HostClock {
      origin: Instant::now(),
    }
  }

  pub fn now(&self) -> ClockTime {
    let elapsed = self.origin.elapsed();
    ClockTime(elapsed.as_secs() * UNITS_PER_SECOND + UnitType::from(elapsed.subsec_nanos()))
  }
}

impl Default for HostClock {
  fn default() -> Self {
    HostClock::new()
  }
}

/// The wall clock window covered by one audio block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockTime {
  pub start: ClockTime,
  pub sample_rate: SampleRate,
  pub frames: usize,
}

impl BlockTime {
  pub fn new(start: ClockTime, sample_rate: SampleRate, frames: usize) -> BlockTime {
    BlockTime {
      start,
      sample_rate,
      frames,
    }
  }

  /// Events stamped at or after the horizon belong to a later block.
  pub fn horizon(&self) -> ClockTime {
    self.start + ClockTime::from_samples(self.frames, self.sample_rate)
  }

  /// Sample offset for a timestamp, clamped into the block.
  pub fn offset_of(&self, timestamp: ClockTime) -> u32 {
    if self.frames == 0 || timestamp <= self.start {
      return 0;
    }
    let seconds = (timestamp - self.start).to_seconds();
    let offset = (seconds * f64::from(self.sample_rate)).round() as usize;
    offset.min(self.frames - 1) as u32
  }
}
