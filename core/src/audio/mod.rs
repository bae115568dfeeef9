pub mod buffer;

pub use buffer::Buffer;

/// Floating point precision the processing graph runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
  Single,
  Double,
}

impl Default for Precision {
  fn default() -> Self {
    Precision::Single
  }
}

/// Number of audio channels of every track bus.
pub const NUM_CHANNELS: usize = 2;
