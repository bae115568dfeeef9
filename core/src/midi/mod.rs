pub mod buffer;
pub mod decoder;
pub mod messages;
pub mod types;

pub use buffer::{Buffer, Event};
pub use decoder::Decoder;
pub use messages::Message;
