use std::thread;

use log::{debug, info, warn, LevelFilter};

use failure::{Error, Fail};

use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config as LogConfig, Root};
use log4rs::encode::pattern::PatternEncoder;

use echo_studio_core::instrument::BuiltinInstruments;
use echo_studio_core::studio::{Studio, StudioProcessor};

mod config;
use crate::config::Config;

mod controller;
use crate::controller::{Controller, Protocol as ControllerProtocol};

mod dispatcher;
use crate::dispatcher::Outbox;

mod engine;
use crate::engine::Engine;

mod realtime_thread;

mod server;
use crate::server::Server;

const ECHO_STUDIO_CONFIG: &str = "ECHO_STUDIO_CONFIG";
const DEFAULT_ECHO_STUDIO_CONFIG: &str = "studio.toml";

const ECHO_STUDIO_LOG_CONFIG: &str = "ECHO_STUDIO_LOG_CONFIG";
const DEFAULT_ECHO_STUDIO_LOG_CONFIG: &str = "log4rs.yaml";

const DEFAULT_LOG_PATTERN: &str = "{d(%H:%M:%S%.3f)} {l:5} [{T}] {t} - {m}{n}";

#[derive(Debug, Fail)]
enum MainError {
  #[fail(display = "Failed to init logging: {}", cause)]
  LoggingInit { cause: String },

  #[fail(display = "Failed to start the server input thread: {}", cause)]
  ServerInput { cause: String },
}

fn main() -> Result<(), Error> {
  init_logging()?;

  let config = init_config()?;

  let (studio, processor) = init_studio(&config)?;

  let engine = init_engine(processor, &config, &studio)?;

  let server = Server::new(config.websocket.port, config.websocket.allow_remote)?;

  let controller = init_controller(studio, &server)?;

  let result = server.wait();

  controller.stop()?;

  engine.stop()?;

  result
}

fn init_logging() -> Result<(), Error> {
  let log_config_path = std::env::var(ECHO_STUDIO_LOG_CONFIG)
    .unwrap_or_else(|_| DEFAULT_ECHO_STUDIO_LOG_CONFIG.to_string());

  match log4rs::init_file(log_config_path.as_str(), Default::default()) {
    Ok(()) => Ok(()),
    Err(file_err) => {
      let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(DEFAULT_LOG_PATTERN)))
        .build();

      let log_config = LogConfig::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(LevelFilter::Info))
        .map_err(|err| MainError::LoggingInit {
          cause: err.to_string(),
        })?;

      log4rs::init_config(log_config).map_err(|err| MainError::LoggingInit {
        cause: err.to_string(),
      })?;

      warn!(
        "Using the default logging configuration, {} could not be loaded: {}",
        log_config_path, file_err
      );
      Ok(())
    }
  }
}

fn init_config() -> Result<Config, Error> {
  let config_path =
    std::env::var(ECHO_STUDIO_CONFIG).unwrap_or_else(|_| DEFAULT_ECHO_STUDIO_CONFIG.to_string());

  let config = if std::path::Path::new(config_path.as_str()).exists() {
    info!("Loading studio configuration from {} ...", config_path);
    Config::from_file(config_path.as_str())?
  } else {
    warn!("{} not found, using the default configuration", config_path);
    Config::default()
  };
  debug!("{:#?}", config);

  Ok(config)
}

fn init_studio(config: &Config) -> Result<(Studio, StudioProcessor), Error> {
  info!("Initialising the studio ...");

  let instruments = BuiltinInstruments::new()?;

  Ok(Studio::new(config.studio.clone(), Box::new(instruments)))
}

fn init_engine(processor: StudioProcessor, config: &Config, studio: &Studio) -> Result<Engine, Error> {
  let (protocol_tx, protocol_rx) = Engine::new_channel();
  let engine = Engine::new(
    protocol_tx,
    protocol_rx,
    processor,
    config.studio.audio.clone(),
    studio.clock(),
  )?;
  Ok(engine)
}

fn init_controller(studio: Studio, server: &Server) -> Result<Controller, Error> {
  let (protocol_tx, protocol_rx) = Controller::new_channel();

  let receiver = server.receiver();
  let input_tx = protocol_tx.clone();
  thread::Builder::new()
    .name("server-input".into())
    .spawn(move || {
      for msg in receiver.iter() {
        if input_tx.send(ControllerProtocol::ServerInput(msg)).is_err() {
          break;
        }
      }
    })
    .map_err(|err| MainError::ServerInput {
      cause: err.to_string(),
    })?;

  let controller = Controller::new(
    protocol_tx,
    protocol_rx,
    studio,
    Outbox::new(server.sender()),
  )?;
  Ok(controller)
}
