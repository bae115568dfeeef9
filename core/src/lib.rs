pub mod audio;
pub mod color;
pub mod config;
pub mod instrument;
pub mod midi;
pub mod protocol;
pub mod studio;
pub mod time;
pub mod track;
pub mod transport;
