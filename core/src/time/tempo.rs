pub const DEFAULT_BPM: f64 = 120.0;

const MIN_BPM: f64 = 1.0;
const MAX_BPM: f64 = 999.0;

/// Beats per minute, where a beat is a quarter note
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tempo(f64);

impl Tempo {
  pub fn new(bpm: f64) -> Tempo {
    if bpm.is_finite() {
      Tempo(bpm.max(MIN_BPM).min(MAX_BPM))
    } else {
      Tempo(DEFAULT_BPM)
    }
  }

  pub fn bpm(&self) -> f64 {
    self.0
  }

  /// Quarter notes elapsed while playing `frames` samples.
  pub fn quarters_for(&self, frames: usize, sample_rate: u32) -> f64 {
    frames as f64 / f64::from(sample_rate.max(1)) / 60.0 * self.0
  }
}

impl Default for Tempo {
  fn default() -> Self {
    Tempo(DEFAULT_BPM)
  }
}

impl From<Tempo> for f64 {
  fn from(item: Tempo) -> Self {
    item.0
  }
}
