use failure::Error;

use serde_derive::Deserialize;

use std::fs::File;
use std::io::Read;

use echo_studio_core::config::Config as StudioConfig;

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
  pub websocket: WebSocket,
  pub studio: StudioConfig,
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
    Self::from_str(content.as_str())
  }

  pub fn from_str<'a, T>(content: T) -> Result<Config, Error>
  where
    T: Into<&'a str>,
  {
    let config: Config = toml::from_str(content.into())?;
    Ok(config)
  }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct WebSocket {
  pub port: u16,
  /// Accept clients from other hosts; only loopback connections are accepted otherwise.
  pub allow_remote: bool,
}

impl Default for WebSocket {
  fn default() -> WebSocket {
    WebSocket {
      port: 3001,
      allow_remote: false,
    }
  }
}

#[cfg(test)]
mod test {
  use super::Config;

  #[test]
  pub fn defaults() {
    let config = Config::from_str("").unwrap();
    assert_eq!(config.websocket.port, 3001);
    assert!(!config.websocket.allow_remote);
    assert_eq!(config.studio.audio.sample_rate, 44100);
  }

  #[test]
  pub fn nested_studio_section() {
    let config = Config::from_str(
      r#"
      [websocket]
      port = 4000
      allow_remote = true

      [studio.engine]
      max_tracks = 8
      "#,
    )
    .unwrap();
    assert_eq!(config.websocket.port, 4000);
    assert!(config.websocket.allow_remote);
    assert_eq!(config.studio.engine.max_tracks, 8);
    assert_eq!(config.studio.engine.ticks_per_quarter_note, 96);
  }
}
