pub mod clock;
pub mod tempo;
pub mod ticks;

pub use self::clock::{BlockTime, ClockTime, HostClock};
pub use self::tempo::Tempo;
pub use self::ticks::TicksTime;

pub type SampleRate = u32;
