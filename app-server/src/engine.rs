use std::thread;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use failure::Fail;
use log::{debug, info, warn};

use echo_studio_core::audio::{self, NUM_CHANNELS};
use echo_studio_core::config::Audio as AudioConfig;
use echo_studio_core::studio::StudioProcessor;
use echo_studio_core::time::{ClockTime, HostClock};

use crate::realtime_thread::RealTimeAudioPriority;

#[derive(Debug, Fail)]
pub enum EngineError {
  #[fail(display = "Failed to create the Engine thread: {}", cause)]
  Start { cause: String },

  #[fail(display = "Failed to join the Engine thread")]
  Stop,
}

pub enum Protocol {
  Stop,
}

/// Renders the studio at the pace of the configured block size.
struct EngineThread {
  processor: StudioProcessor,
  output: audio::Buffer<f32>,
  clock: HostClock,
  block_duration: Duration,
  _rta_priority: Option<RealTimeAudioPriority>,
}

impl EngineThread {
  fn new(mut processor: StudioProcessor, audio_config: &AudioConfig, clock: HostClock) -> EngineThread {
    let frames = audio_config.frames.max(1);
    processor.prepare(audio_config.sample_rate, frames);

    let block_duration = Duration::from_nanos(
      ClockTime::from_samples(frames, audio_config.sample_rate).units(),
    );

    let _rta_priority = Self::promote_to_real_time(audio_config);

    EngineThread {
      processor,
      output: audio::Buffer::new(NUM_CHANNELS, frames),
      clock,
      block_duration,
      _rta_priority,
    }
  }

  pub fn handle_messages(&mut self, protocol_rx: Receiver<Protocol>) {
    let mut deadline = Instant::now();
    loop {
      match protocol_rx.recv_deadline(deadline) {
        Ok(Protocol::Stop) | Err(RecvTimeoutError::Disconnected) => break,
        Err(RecvTimeoutError::Timeout) => {
          let frames = self.output.max_frames();
          self.output.set_frames(frames);
          self.processor.process(&mut self.output, self.clock.now());
          deadline += self.block_duration;
        }
      }
    }
    debug!("Engine finished");
  }

  fn promote_to_real_time(audio_config: &AudioConfig) -> Option<RealTimeAudioPriority> {
    match RealTimeAudioPriority::promote(audio_config.sample_rate, audio_config.frames) {
      Ok(rta_priority) => {
        debug!("Engine thread has now real-time priority");
        Some(rta_priority)
      }
      Err(err) => {
        warn!("Couldn't promote the Engine thread into real time: {}", err);
        None
      }
    }
  }
}

pub struct Engine {
  handler: JoinHandle<()>,
  protocol_tx: Sender<Protocol>,
}

impl Engine {
  pub fn new_channel() -> (Sender<Protocol>, Receiver<Protocol>) {
    crossbeam_channel::bounded::<Protocol>(1)
  }

  pub fn new(
    protocol_tx: Sender<Protocol>,
    protocol_rx: Receiver<Protocol>,
    processor: StudioProcessor,
    audio_config: AudioConfig,
    clock: HostClock,
  ) -> Result<Engine, EngineError> {
    info!(
      "Starting Engine at {} Hz with {} frames per block ...",
      audio_config.sample_rate, audio_config.frames
    );

    thread::Builder::new()
      .name("engine".into())
      .spawn(move || EngineThread::new(processor, &audio_config, clock).handle_messages(protocol_rx))
      .map_err(|err| EngineError::Start {
        cause: err.to_string(),
      })
      .map(|handler| Engine {
        handler,
        protocol_tx,
      })
  }

  pub fn stop(self) -> Result<(), EngineError> {
    info!("Stopping Engine ...");

    self
      .protocol_tx
      .send(Protocol::Stop)
      .map_err(|_| EngineError::Stop)
      .and_then(|()| self.handler.join().map_err(|_| EngineError::Stop))
  }
}
