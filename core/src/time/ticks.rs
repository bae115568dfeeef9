use std::{
  cmp::min,
  ops::{Add, AddAssign, Sub, SubAssign},
};

pub const DEFAULT_TICKS_PER_QUARTER_NOTE: u32 = 96;

///! Musical time, counted in ticks at the studio's ticks-per-quarter-note resolution
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Copy, Clone, Default)]
pub struct TicksTime(u64);

impl TicksTime {
  pub fn new(ticks: u64) -> TicksTime {
    TicksTime(ticks)
  }

  pub fn zero() -> TicksTime {
    TicksTime(0)
  }

  /// Rescales a timestamp expressed in `time_format` units per quarter note
  /// into ticks, rounding to the nearest tick (half away from zero).
  /// Negative or non finite timestamps collapse into tick zero.
  pub fn from_time_format(
    timestamp: f64,
    time_format: u32,
    ticks_per_quarter_note: u32,
  ) -> TicksTime {
    if time_format == 0 || !timestamp.is_finite() || timestamp <= 0.0 {
      return TicksTime::zero();
    }
    let ticks = timestamp / f64::from(time_format) * f64::from(ticks_per_quarter_note);
    TicksTime(ticks.round() as u64)
  }

  pub fn units(&self) -> u64 {
    self.0
  }

  /// Ticks as they travel on the wire, saturated into 32 bits.
  pub fn to_u32(&self) -> u32 {
    min(self.0, u64::from(u32::max_value())) as u32
  }
}

impl Add for TicksTime {
  type Output = TicksTime;
  fn add(self, rhs: TicksTime) -> Self {
    TicksTime::new(self.0.saturating_add(rhs.0))
  }
}

impl AddAssign for TicksTime {
  fn add_assign(&mut self, rhs: TicksTime) {
    *self = *self + rhs;
  }
}

impl Sub for TicksTime {
  type Output = TicksTime;
  fn sub(self, rhs: TicksTime) -> Self {
    TicksTime::new(self.0 - min(self.0, rhs.0))
  }
}

impl SubAssign for TicksTime {
  fn sub_assign(&mut self, rhs: TicksTime) {
    *self = *self - rhs;
  }
}

impl From<TicksTime> for f64 {
  fn from(item: TicksTime) -> Self {
    item.0 as f64
  }
}

impl From<TicksTime> for u64 {
  fn from(item: TicksTime) -> Self {
    item.0
  }
}

#[cfg(test)]
mod test {

  use super::TicksTime;

  #[test]
  pub fn from_time_format_same_resolution_is_exact() {
    for ticks in &[0u64, 1, 47, 96, 95, 12_345, 1_000_000] {
      let time = TicksTime::from_time_format(*ticks as f64, 96, 96);
      assert_eq!(time.units(), *ticks);
    }
  }

  #[test]
  pub fn from_time_format_rescales_and_rounds() {
    // 480 ppq source into 96 ppq: 1 source tick = 0.2 ticks
    assert_eq!(TicksTime::from_time_format(480.0, 480, 96), TicksTime::new(96));
    assert_eq!(TicksTime::from_time_format(7.0, 480, 96), TicksTime::new(1));
    assert_eq!(TicksTime::from_time_format(2.0, 480, 96), TicksTime::new(0));
    // 2.5 ticks rounds half away from zero
    assert_eq!(TicksTime::from_time_format(5.0, 2, 1), TicksTime::new(3));
  }

  #[test]
  pub fn from_time_format_rejects_garbage() {
    assert_eq!(TicksTime::from_time_format(-10.0, 96, 96), TicksTime::zero());
    assert_eq!(TicksTime::from_time_format(f64::NAN, 96, 96), TicksTime::zero());
    assert_eq!(TicksTime::from_time_format(10.0, 0, 96), TicksTime::zero());
  }

  #[test]
  pub fn to_u32_saturates() {
    assert_eq!(TicksTime::new(1234).to_u32(), 1234);
    assert_eq!(TicksTime::new(u64::max_value()).to_u32(), u32::max_value());
  }

  #[test]
  pub fn sub_does_not_underflow() {
    let result = TicksTime::new(30) - TicksTime::new(100);
    assert_eq!(result, TicksTime::zero());
    assert_eq!(TicksTime::new(100) - TicksTime::new(30), TicksTime::new(70));
  }
}
