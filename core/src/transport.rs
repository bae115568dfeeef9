use crate::time::{SampleRate, Tempo};

/// Read-only view of the transport, copied once per block by every track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportPosition {
  pub is_playing: bool,
  /// Song position in quarter notes
  pub ppq_position: f64,
  pub bpm: f64,
  pub ticks_per_quarter_note: u32,
}

impl TransportPosition {
  pub fn stopped(ticks_per_quarter_note: u32) -> TransportPosition {
    TransportPosition {
      is_playing: false,
      ppq_position: 0.0,
      bpm: Tempo::default().bpm(),
      ticks_per_quarter_note,
    }
  }

  pub fn start_tick(&self) -> f64 {
    self.ppq_position * f64::from(self.ticks_per_quarter_note)
  }

  /// Number of ticks covered by a block of `frames` samples.
  pub fn block_span(&self, frames: usize, sample_rate: SampleRate) -> f64 {
    frames as f64 / f64::from(sample_rate.max(1)) / 60.0
      * self.bpm
      * f64::from(self.ticks_per_quarter_note)
  }
}

pub struct Transport {
  sample_rate: SampleRate,
  tempo: Tempo,
  ticks_per_quarter_note: u32,

  playing: bool,

  start_position: f64,
  position: f64,
}

impl Transport {
  pub fn new(sample_rate: SampleRate, ticks_per_quarter_note: u32) -> Self {
    Transport {
      sample_rate,
      tempo: Tempo::default(),
      ticks_per_quarter_note,

      playing: false,

      start_position: 0.0,
      position: 0.0,
    }
  }

  pub fn set_sample_rate(&mut self, sample_rate: SampleRate) {
    self.sample_rate = sample_rate;
  }

  pub fn get_sample_rate(&self) -> SampleRate {
    self.sample_rate
  }

  pub fn set_tempo(&mut self, tempo: Tempo) {
    self.tempo = tempo;
  }

  pub fn get_tempo(&self) -> Tempo {
    self.tempo
  }

  pub fn is_playing(&self) -> bool {
    self.playing
  }

  pub fn play(&mut self, restart: bool) -> bool {
    self.playing = true;
    if restart {
      self.position = self.start_position;
    }
    self.playing
  }

  ///! Stopping an already stopped transport rewinds it to the start position
  pub fn stop(&mut self) {
    if !self.playing {
      self.position = self.start_position;
    }
    self.playing = false;
  }

  pub fn set_position(&mut self, quarters: f64) {
    if quarters.is_finite() {
      self.position = quarters.max(0.0);
    }
  }

  pub fn get_position(&self) -> f64 {
    self.position
  }

  pub fn snapshot(&self) -> TransportPosition {
    TransportPosition {
      is_playing: self.playing,
      ppq_position: self.position,
      bpm: self.tempo.bpm(),
      ticks_per_quarter_note: self.ticks_per_quarter_note,
    }
  }

  /// Moves the song position past a block that has just been rendered.
  pub fn advance(&mut self, frames: usize) {
    if self.playing {
      self.position += self.tempo.quarters_for(frames, self.sample_rate);
    }
  }
}

#[cfg(test)]
mod test {
  use super::{Transport, TransportPosition};
  use crate::time::Tempo;

  #[test]
  pub fn block_span() {
    let position = TransportPosition {
      is_playing: true,
      ppq_position: 1.0,
      bpm: 120.0,
      ticks_per_quarter_note: 100,
    };
    assert_eq!(position.start_tick(), 100.0);
    // 12000 samples at 48kHz = 0.25s = half a beat at 120 bpm
    assert_eq!(position.block_span(12_000, 48_000), 50.0);
  }

  #[test]
  pub fn advance_only_while_playing() {
    let mut transport = Transport::new(48_000, 96);
    transport.set_tempo(Tempo::new(60.0));
    transport.advance(48_000);
    assert_eq!(transport.get_position(), 0.0);

    transport.play(false);
    transport.advance(48_000);
    assert_eq!(transport.get_position(), 1.0);

    let snapshot = transport.snapshot();
    assert!(snapshot.is_playing);
    assert_eq!(snapshot.start_tick(), 96.0);
  }

  #[test]
  pub fn stop_twice_rewinds() {
    let mut transport = Transport::new(48_000, 96);
    transport.play(false);
    transport.set_position(4.0);
    transport.stop();
    assert_eq!(transport.get_position(), 4.0);
    transport.stop();
    assert_eq!(transport.get_position(), 0.0);
  }
}
