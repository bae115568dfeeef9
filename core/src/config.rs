use failure::Error;

use serde_derive::Deserialize;

use std::fs::File;
use std::io::Read;

use crate::time::ticks::DEFAULT_TICKS_PER_QUARTER_NOTE;
use crate::time::SampleRate;
use crate::track::TrackSettings;

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Audio {
  pub sample_rate: SampleRate,
  pub frames: usize,
}

impl Default for Audio {
  fn default() -> Audio {
    Audio {
      sample_rate: 44100,
      frames: 512,
    }
  }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Engine {
  pub ticks_per_quarter_note: u32,
  /// Live events in flight per track
  pub live_queue_capacity: usize,
  /// Events a track can receive in one block
  pub event_buffer_capacity: usize,
  pub max_tracks: usize,
}

impl Default for Engine {
  fn default() -> Engine {
    Engine {
      ticks_per_quarter_note: DEFAULT_TICKS_PER_QUARTER_NOTE,
      live_queue_capacity: 256,
      event_buffer_capacity: 1024,
      max_tracks: 64,
    }
  }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct Config {
  pub audio: Audio,
  pub engine: Engine,
}

impl Config {
  pub fn from_file<'a, T>(path: T) -> Result<Config, Error>
  where
    T: Into<&'a str>,
  {
    let mut content = String::new();
    let path_str = path.into();
    let mut file = File::open(path_str)?;
    file.read_to_string(&mut content)?;
    let config: Config = toml::from_str(&content)?;
    Ok(config)
  }

  pub fn from_str<'a, T>(content: T) -> Result<Config, Error>
  where
    T: Into<&'a str>,
  {
    let config: Config = toml::from_str(content.into())?;
    Ok(config)
  }

  pub fn track_settings(&self) -> TrackSettings {
    TrackSettings {
      sample_rate: self.audio.sample_rate,
      max_frames: self.audio.frames,
      ticks_per_quarter_note: self.engine.ticks_per_quarter_note,
      live_queue_capacity: self.engine.live_queue_capacity,
    }
  }
}
