//! Binary protocol spoken with the remote client.
//!
//! Every message starts with an opcode byte. Integers and floats are big-endian,
//! strings are a `u32` byte length followed by UTF-8 bytes, booleans take one byte.

pub mod buffer;
pub mod packets;
pub mod requests;

pub use self::buffer::{Reader, Writer};
pub use self::packets::{ClientOpcode, ServerOpcode, IDENTIFIER_SEPARATOR};
pub use self::requests::Request;

use failure::Fail;

#[derive(Debug, Fail, PartialEq)]
pub enum ProtocolError {
  #[fail(
    display = "Unexpected end of message: {} bytes needed but only {} remain",
    needed, remaining
  )]
  UnexpectedEnd { needed: usize, remaining: usize },

  #[fail(display = "Invalid UTF-8 string")]
  InvalidString,

  #[fail(display = "Unknown opcode {}", opcode)]
  UnknownOpcode { opcode: u8 },
}
