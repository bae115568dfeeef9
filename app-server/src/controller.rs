use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, Select, Sender};
use failure::Fail;
use log::{debug, info, trace, warn};

use echo_studio_core::studio::Studio;

use crate::dispatcher::{Dispatcher, LoadCompletion, Outbox};
use crate::server::Message as ServerMessage;

/// How often released engine values are collected when the controller is idle.
const GARBAGE_COLLECTION_PERIOD: Duration = Duration::from_millis(100);

#[derive(Debug, Fail)]
pub enum ControllerError {
  #[fail(display = "Failed to create the Controller thread: {}", cause)]
  Start { cause: String },

  #[fail(display = "Failed to join the Controller thread")]
  Stop,
}

pub enum Protocol {
  Stop,

  ServerInput(ServerMessage),
}

struct ControllerThread {
  studio: Studio,
  dispatcher: Dispatcher,
  outbox: Outbox,
}

impl ControllerThread {
  fn new(studio: Studio, dispatcher: Dispatcher, outbox: Outbox) -> ControllerThread {
    ControllerThread {
      studio,
      dispatcher,
      outbox,
    }
  }

  pub fn handle_messages(
    &mut self,
    protocol_rx: Receiver<Protocol>,
    completion_rx: Receiver<LoadCompletion>,
  ) {
    let mut select = Select::new();
    let protocol_index = select.recv(&protocol_rx);
    let completion_index = select.recv(&completion_rx);

    loop {
      match select.ready_timeout(GARBAGE_COLLECTION_PERIOD) {
        Ok(index) if index == protocol_index => match protocol_rx.try_recv() {
          Ok(Protocol::Stop) => break,
          Ok(Protocol::ServerInput(message)) => self.server_input(message),
          Err(err) if err.is_disconnected() => break,
          Err(_) => {}
        },

        Ok(index) if index == completion_index => {
          if let Ok(completion) = completion_rx.try_recv() {
            self
              .dispatcher
              .complete_load(&mut self.studio, completion, &self.outbox);
          }
        }

        _ => {}
      }

      let collected = self.studio.collect_garbage();
      if collected > 0 {
        trace!("Released {} values from the engine", collected);
      }
    }

    debug!("Controller finished");
  }

  fn server_input(&mut self, message: ServerMessage) {
    match message {
      ServerMessage::Incoming { port, data } => {
        if let Err(err) = self
          .dispatcher
          .handle(&mut self.studio, port, &data, &self.outbox)
        {
          warn!("{}", err);
        }
      }
      ServerMessage::Close { port } => debug!("Client {} disconnected", port),
      _ => {}
    }
  }
}

pub struct Controller {
  handler: JoinHandle<()>,
  protocol_tx: Sender<Protocol>,
}

impl Controller {
  pub const CHANNEL_CAPACITY: usize = 16 * 1024;

  pub fn new_channel() -> (Sender<Protocol>, Receiver<Protocol>) {
    crossbeam_channel::bounded::<Protocol>(Self::CHANNEL_CAPACITY)
  }

  pub fn new(
    protocol_tx: Sender<Protocol>,
    protocol_rx: Receiver<Protocol>,
    studio: Studio,
    outbox: Outbox,
  ) -> Result<Controller, ControllerError> {
    info!("Starting Controller ...");

    let (completion_tx, completion_rx) = crossbeam_channel::unbounded::<LoadCompletion>();
    let dispatcher = Dispatcher::new(completion_tx);

    thread::Builder::new()
      .name("controller".into())
      .spawn(move || {
        ControllerThread::new(studio, dispatcher, outbox).handle_messages(protocol_rx, completion_rx)
      })
      .map_err(|err| ControllerError::Start {
        cause: err.to_string(),
      })
      .map(|handler| Controller {
        handler,
        protocol_tx,
      })
  }

  pub fn stop(self) -> Result<(), ControllerError> {
    info!("Stopping Controller ...");

    self
      .protocol_tx
      .send(Protocol::Stop)
      .map_err(|_| ControllerError::Stop)
      .and_then(|()| self.handler.join().map_err(|_| ControllerError::Stop))
  }
}
