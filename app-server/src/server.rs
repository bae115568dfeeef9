use log::{debug, info, trace, warn};

use std::collections::HashMap;
use std::net::{SocketAddr, TcpStream};
use std::thread;
use std::thread::JoinHandle;

use crossbeam_channel;
use crossbeam_channel::{Receiver, Select, Sender};

use failure::{Error, Fail};

use websocket::client::sync::Client;
use websocket::receiver::Reader;
use websocket::sender::Writer;
use websocket::server::upgrade::sync::Buffer;
use websocket::server::upgrade::WsUpgrade;
use websocket::sync::Server as WsServer;
use websocket::OwnedMessage;

#[derive(Debug, Fail)]
pub enum ServerError {
  #[fail(display = "Failed to create the {} thread: {}", name, cause)]
  Start { name: String, cause: String },

  #[fail(display = "Unable to accept connection: {}", cause)]
  RequestAccept { cause: String },

  #[fail(display = "Failed to retrieve client address: {}", cause)]
  ClientAddress { cause: String },

  #[fail(display = "Only localhost connections are allowed, but found {:?}", ip)]
  NotLocalhost { ip: String },

  #[fail(display = "Failed to split client IO: {}", cause)]
  ClientSplit { cause: String },

  #[fail(display = "Failed to join the WebSocket server thread")]
  Join,
}

/// Port used to address every connected client.
pub const ALL_PORTS: u16 = 0;

#[derive(Debug, Clone)]
pub enum Message {
  Connection { port: u16, sender: Sender<Message> },
  Close { port: u16 },
  Incoming { data: Vec<u8>, port: u16 },
  Outgoing { data: Vec<u8>, port: u16 },
  Stop,
}

impl Message {
  pub fn is_stop(&self) -> bool {
    match self {
      Message::Stop => true,
      _ => false,
    }
  }

  pub fn ends_connection(&self) -> bool {
    match self {
      Message::Close { .. } | Message::Stop => true,
      _ => false,
    }
  }

  pub fn to_websocket_message(self) -> Option<OwnedMessage> {
    match self {
      Message::Connection { .. } => None,
      Message::Close { .. } | Message::Stop => Some(OwnedMessage::Close(None)),
      Message::Incoming { .. } => None,
      Message::Outgoing { data, .. } => Some(OwnedMessage::Binary(data)),
    }
  }
}

type Clients = HashMap<u16, Sender<Message>>;

fn spawn<F, T>(name: String, f: F) -> Result<JoinHandle<T>, ServerError>
where
  F: FnOnce() -> T + Send + 'static,
  T: Send + 'static,
{
  thread::Builder::new()
    .name(name.clone())
    .spawn(f)
    .map_err(|err| ServerError::Start {
      name,
      cause: err.to_string(),
    })
}

/// WebSocket server: a router thread fans messages out to one sender thread per client
/// and forwards the binary frames of every client to `receiver()`.
pub struct Server {
  server_send_tx: Sender<Message>,
  server_receive_rx: Receiver<Message>,
  router_thread: JoinHandle<()>,
  websocket_thread: JoinHandle<Result<(), Error>>,
}

impl Server {
  pub fn new(port: u16, allow_remote: bool) -> Result<Server, Error> {
    let (server_send_tx, server_send_rx) = crossbeam_channel::unbounded::<Message>();
    let (server_receive_tx, server_receive_rx) = crossbeam_channel::unbounded::<Message>();
    let (client_receive_tx, client_receive_rx) = crossbeam_channel::unbounded::<Message>();

    let router_thread = Self::start_router(server_send_rx, client_receive_rx, server_receive_tx)?;

    let websocket_thread = Self::start_server(client_receive_tx, port, allow_remote)?;

    Ok(Server {
      server_send_tx,
      server_receive_rx,
      router_thread,
      websocket_thread,
    })
  }

  fn start_router(
    server_send_rx: Receiver<Message>,
    client_receive_rx: Receiver<Message>,
    server_receive_tx: Sender<Message>,
  ) -> Result<JoinHandle<()>, ServerError> {
    spawn("ws-router".into(), move || {
      let mut clients: Clients = HashMap::new();

      let mut select = Select::new();
      let server_index = select.recv(&server_send_rx);
      let client_index = select.recv(&client_receive_rx);

      loop {
        let result = match select.ready() {
          index if index == server_index => server_send_rx.try_recv(),
          index if index == client_index => client_receive_rx.try_recv(),
          _ => continue,
        };
        match result {
          Ok(msg) => {
            let is_stop = msg.is_stop();
            Self::route_message(&mut clients, &server_receive_tx, msg);
            if is_stop {
              break;
            }
          }
          Err(err) if err.is_disconnected() => break,
          Err(_) => {}
        };
      }

      debug!("WebSocket router finished");
    })
  }

  fn route_message(clients: &mut Clients, server_receive_tx: &Sender<Message>, msg: Message) {
    match msg {
      Message::Connection { port, sender } => {
        clients.insert(port, sender);
      }

      Message::Close { port } if port == ALL_PORTS => {
        clients
          .drain()
          .for_each(|(port, send_tx)| drop(send_tx.send(Message::Close { port })));
      }

      Message::Close { port } => {
        if let Some(send_tx) = clients.remove(&port) {
          drop(send_tx.send(Message::Close { port }));
          drop(server_receive_tx.send(Message::Close { port }));
        }
      }

      Message::Incoming { .. } => {
        drop(server_receive_tx.send(msg));
      }

      Message::Outgoing { port, .. } => {
        if port == ALL_PORTS {
          clients
            .values()
            .for_each(|send_tx| drop(send_tx.send(msg.clone())));
        } else if let Some(send_tx) = clients.get(&port) {
          drop(send_tx.send(msg));
        } else {
          trace!("Dropping message for the unknown client {}", port);
        }
      }

      Message::Stop => {
        clients
          .drain()
          .for_each(|(_, send_tx)| drop(send_tx.send(Message::Stop)));
      }
    };
  }

  fn start_server(
    client_receive_tx: Sender<Message>,
    port: u16,
    allow_remote: bool,
  ) -> Result<JoinHandle<Result<(), Error>>, ServerError> {
    spawn("ws-server".into(), move || {
      let host = if allow_remote { "0.0.0.0" } else { "127.0.0.1" };
      let addr = format!("{}:{}", host, port);
      info!("Starting WebSocket server at {} ...", addr);
      let server = WsServer::bind(addr)?;
      for request in server.filter_map(Result::ok) {
        if let Err(err) = Self::accept_request(client_receive_tx.clone(), request, allow_remote) {
          warn!("{}", err);
        }
      }
      Ok(())
    })
  }

  fn accept_request(
    client_receive_tx: Sender<Message>,
    request: WsUpgrade<TcpStream, Option<Buffer>>,
    allow_remote: bool,
  ) -> Result<(), ServerError> {
    spawn("ws-accept".into(), move || {
      let accepted = request
        .accept()
        .map_err(|(_, err)| ServerError::RequestAccept {
          cause: err.to_string(),
        })
        .and_then(|mut client| {
          Self::ensure_valid_source_or_close(&mut client, allow_remote).and_then(|addr| {
            info!("New WebSocket connection: {}", addr);
            client
              .split()
              .map_err(|err| ServerError::ClientSplit {
                cause: err.to_string(),
              })
              .map(|(receiver, sender)| (addr, receiver, sender))
          })
        });

      let (addr, receiver, sender) = match accepted {
        Ok(accepted) => accepted,
        Err(err) => {
          warn!("{}", err);
          return;
        }
      };

      let (client_send_tx, client_send_rx) = crossbeam_channel::unbounded::<Message>();

      drop(client_receive_tx.send(Message::Connection {
        port: addr.port(),
        sender: client_send_tx,
      }));

      match Self::send_messages(addr, client_send_rx, sender) {
        Ok(internal_tx) => Self::receive_messages(addr, client_receive_tx, internal_tx, receiver),
        Err(err) => {
          warn!("{}", err);
          drop(client_receive_tx.send(Message::Close { port: addr.port() }));
        }
      }
    })
    .map(|_| ())
  }

  fn send_messages(
    addr: SocketAddr,
    send_rx: Receiver<Message>,
    mut sender: Writer<TcpStream>,
  ) -> Result<Sender<Message>, ServerError> {
    let (internal_tx, internal_rx) = crossbeam_channel::unbounded::<Message>();

    spawn(format!("ws-send-{}", addr.port()), move || {
      let mut sel = Select::new();
      let send_index = sel.recv(&send_rx);
      let internal_index = sel.recv(&internal_rx);

      loop {
        trace!("{:?} Waiting for messages to be sent ...", addr);

        let try_msg = match sel.ready() {
          index if index == send_index => send_rx.try_recv(),
          index if index == internal_index => internal_rx.try_recv(),
          _ => continue,
        };

        match try_msg {
          Ok(msg) => {
            let ends_connection = msg.ends_connection();
            trace!("{:?} Send: {:?}", addr, msg);
            if let Some(ws_msg) = msg.to_websocket_message() {
              if let Err(err) = sender.send_message(&ws_msg) {
                debug!("{:?} Failed to send: {}", addr, err);
              }
            }
            if ends_connection {
              break;
            }
          }
          Err(err) if err.is_disconnected() => break,
          Err(_) => {}
        }
      }

      trace!("{:?} Finished thread for sending messages", addr);
    })?;

    Ok(internal_tx)
  }

  fn receive_messages(
    addr: SocketAddr,
    receive_tx: Sender<Message>,
    internal_tx: Sender<Message>,
    mut receiver: Reader<TcpStream>,
  ) {
    let port = addr.port();

    for message in receiver.incoming_messages() {
      match message {
        Ok(OwnedMessage::Binary(data)) => {
          trace!("{:?} Binary: {:?}", addr, data);
          drop(receive_tx.send(Message::Incoming { port, data }));
        }
        Ok(OwnedMessage::Text(data)) => {
          trace!("{:?} Ignoring text message: {:?}", addr, data);
        }
        Ok(OwnedMessage::Close(data)) => {
          trace!("{:?} Close: {:?}", addr, data);
          break;
        }
        Err(err) => {
          // the peer went away without a close frame
          trace!("{:?} Err: {:?}", addr, err);
          break;
        }
        _ => {}
      }
    }

    drop(internal_tx.send(Message::Close { port }));
    drop(receive_tx.send(Message::Close { port }));
    info!("WebSocket connection closed: {}", addr);
  }

  fn ensure_valid_source_or_close(
    client: &mut Client<TcpStream>,
    allow_remote: bool,
  ) -> Result<SocketAddr, ServerError> {
    client
      .peer_addr()
      .map_err(|err| ServerError::ClientAddress {
        cause: err.to_string(),
      })
      .and_then(|addr| {
        let ip = addr.ip();
        if allow_remote || ip.is_loopback() {
          Ok(addr)
        } else {
          drop(client.send_message(&OwnedMessage::Close(None)));
          Err(ServerError::NotLocalhost { ip: ip.to_string() })
        }
      })
  }

  pub fn receiver(&self) -> Receiver<Message> {
    self.server_receive_rx.clone()
  }

  pub fn sender(&self) -> Sender<Message> {
    self.server_send_tx.clone()
  }

  /// Blocks until the accept loop ends, then disconnects every client.
  pub fn wait(self) -> Result<(), Error> {
    let result = self.websocket_thread.join().map_err(|_| ServerError::Join)?;

    info!("Closing server ...");
    drop(self.server_send_tx.send(Message::Close { port: ALL_PORTS }));
    drop(self.server_send_tx.send(Message::Stop));
    self.router_thread.join().map_err(|_| ServerError::Join)?;

    result
  }
}
