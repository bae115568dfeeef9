use std::thread;

use crossbeam_channel::{self, Sender};
use failure::Fail;
use log::{debug, info};

use super::synth::{Patch, Synth, Waveform};
use super::{Instrument, InstrumentCatalog, InstrumentDescription, InstrumentLoader, LoadCallback};

#[derive(Debug, Fail)]
pub enum BuiltinError {
  #[fail(display = "Failed to start the instrument loader thread: {}", cause)]
  Start { cause: String },
}

pub const MANUFACTURER: &str = "Echo";

struct LoadRequest {
  description: InstrumentDescription,
  callback: LoadCallback,
}

/// The instruments that ship with the studio.
///
/// `new` loads on a dedicated thread. `inline` completes every load before
/// `load_async` returns, which keeps tests deterministic.
pub struct BuiltinInstruments {
  types: Vec<InstrumentDescription>,
  loader_tx: Option<Sender<LoadRequest>>,
}

impl BuiltinInstruments {
  pub fn new() -> Result<BuiltinInstruments, BuiltinError> {
    let (loader_tx, loader_rx) = crossbeam_channel::unbounded::<LoadRequest>();

    thread::Builder::new()
      .name("instrument-loader".into())
      .spawn(move || {
        for request in loader_rx.iter() {
          debug!("Loading instrument {} ...", request.description.identifier);
          (request.callback)(instantiate(&request.description));
        }
        debug!("Instrument loader finished");
      })
      .map_err(|err| BuiltinError::Start {
        cause: err.to_string(),
      })?;

    info!("Built-in instruments ready");

    Ok(BuiltinInstruments {
      types: catalog(),
      loader_tx: Some(loader_tx),
    })
  }

  pub fn inline() -> BuiltinInstruments {
    BuiltinInstruments {
      types: catalog(),
      loader_tx: None,
    }
  }
}

impl InstrumentCatalog for BuiltinInstruments {
  fn types(&self) -> &[InstrumentDescription] {
    &self.types
  }
}

impl InstrumentLoader for BuiltinInstruments {
  fn load_async(&self, description: InstrumentDescription, callback: LoadCallback) {
    match self.loader_tx.as_ref() {
      Some(loader_tx) => {
        let request = LoadRequest {
          description,
          callback,
        };
        if let Err(err) = loader_tx.send(request) {
          let request = err.into_inner();
          (request.callback)(Err("The instrument loader has stopped".to_string()));
        }
      }
      None => callback(instantiate(&description)),
    }
  }
}

fn catalog() -> Vec<InstrumentDescription> {
  vec![
    InstrumentDescription::new("Synth1", MANUFACTURER, "builtin:synth1"),
    InstrumentDescription::new("Saw Lead", MANUFACTURER, "builtin:saw-lead"),
    InstrumentDescription::new("Square Bass", MANUFACTURER, "builtin:square-bass"),
    InstrumentDescription::new("Test Tone", "Generic", "builtin:test-tone"),
  ]
}

fn instantiate(description: &InstrumentDescription) -> Result<Box<dyn Instrument>, String> {
  let patch = match description.identifier.as_str() {
    "builtin:synth1" => Patch::default(),
    "builtin:saw-lead" => Patch {
      waveform: Waveform::Saw,
      attack: 0.01,
      release: 0.2,
      level: 0.2,
    },
    "builtin:square-bass" => Patch {
      waveform: Waveform::Square,
      attack: 0.002,
      release: 0.08,
      level: 0.2,
    },
    "builtin:test-tone" => Patch {
      attack: 0.0,
      release: 0.0,
      ..Patch::default()
    },
    other => return Err(format!("Unknown instrument identifier: {}", other)),
  };
  Ok(Box::new(Synth::new(description.name.clone(), patch)))
}

#[cfg(test)]
mod test {
  use std::time::Duration;

  use super::BuiltinInstruments;
  use crate::instrument::{InstrumentCatalog, InstrumentDescription, InstrumentLoader};

  #[test]
  pub fn catalog_listing() {
    let instruments = BuiltinInstruments::inline();
    assert_eq!(instruments.manufacturers(), vec!["Echo", "Generic"]);
    assert_eq!(instruments.types_by_manufacturer("Echo").len(), 3);
    assert_eq!(
      instruments
        .type_for_identifier("builtin:synth1")
        .map(|desc| desc.name),
      Some("Synth1".to_string())
    );
  }

  #[test]
  pub fn inline_load() {
    let instruments = BuiltinInstruments::inline();
    let (tx, rx) = crossbeam_channel::unbounded();
    let description = instruments.types()[0].clone();
    instruments.load_async(
      description,
      Box::new(move |result| drop(tx.send(result.map(|i| i.name().to_string())))),
    );
    assert_eq!(rx.try_recv().ok(), Some(Ok("Synth1".to_string())));
  }

  #[test]
  pub fn threaded_load_reports_unknown_identifiers() {
    let instruments = BuiltinInstruments::new().unwrap();
    let (tx, rx) = crossbeam_channel::unbounded();
    instruments.load_async(
      InstrumentDescription::new("Ghost", "Nobody", "builtin:ghost"),
      Box::new(move |result| drop(tx.send(result.is_err()))),
    );
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).ok(), Some(true));
  }
}
