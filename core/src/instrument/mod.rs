//! Instruments and the collaborators that list and load them.

pub mod builtin;
pub mod synth;

pub use self::builtin::BuiltinInstruments;

use crate::audio::{self, Precision};
use crate::midi;
use crate::time::SampleRate;

/// A sound generator driven by MIDI.
///
/// Both process methods run on the audio thread and must not allocate or block.
/// Events in `midi` are sorted by offset.
pub trait Instrument: Send {
  fn name(&self) -> &str;

  fn prepare(&mut self, sample_rate: SampleRate, max_frames: usize);

  fn set_precision(&mut self, _precision: Precision) {}

  fn process(&mut self, midi: &midi::Buffer, audio: &mut audio::Buffer<f32>);

  fn process_double(&mut self, midi: &midi::Buffer, audio: &mut audio::Buffer<f64>);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentDescription {
  pub name: String,
  pub manufacturer: String,
  pub identifier: String,
}

impl InstrumentDescription {
  pub fn new<N, M, I>(name: N, manufacturer: M, identifier: I) -> InstrumentDescription
  where
    N: Into<String>,
    M: Into<String>,
    I: Into<String>,
  {
    InstrumentDescription {
      name: name.into(),
      manufacturer: manufacturer.into(),
      identifier: identifier.into(),
    }
  }
}

/// An error message when loading failed.
pub type LoadResult = Result<Box<dyn Instrument>, String>;

pub type LoadCallback = Box<dyn FnOnce(LoadResult) + Send>;

/// Listing of the instrument types that can be loaded.
pub trait InstrumentCatalog {
  fn types(&self) -> &[InstrumentDescription];

  fn type_for_identifier(&self, identifier: &str) -> Option<InstrumentDescription> {
    self
      .types()
      .iter()
      .find(|desc| desc.identifier == identifier)
      .cloned()
  }

  /// Distinct manufacturer names, in catalog order.
  fn manufacturers(&self) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for desc in self.types() {
      if !names.contains(&desc.manufacturer) {
        names.push(desc.manufacturer.clone());
      }
    }
    names
  }

  fn types_by_manufacturer(&self, manufacturer: &str) -> Vec<InstrumentDescription> {
    self
      .types()
      .iter()
      .filter(|desc| desc.manufacturer == manufacturer)
      .cloned()
      .collect()
  }
}

pub trait InstrumentLoader {
  /// Creates an instance of the described type off the calling thread when possible.
  /// The callback runs exactly once, on whatever thread completes the load.
  fn load_async(&self, description: InstrumentDescription, callback: LoadCallback);
}

pub trait InstrumentHost: InstrumentCatalog + InstrumentLoader + Send {}

impl<T> InstrumentHost for T where T: InstrumentCatalog + InstrumentLoader + Send {}
