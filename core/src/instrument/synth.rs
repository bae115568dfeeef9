use std::f64::consts::PI;

use dasp_sample::{FloatSample, Sample};

use crate::audio;
use crate::instrument::Instrument;
use crate::midi::{self, Message};
use crate::time::SampleRate;

const MAX_VOICES: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Waveform {
  Sine,
  Saw,
  Square,
}

impl Waveform {
  fn value(self, phase: f64) -> f64 {
    match self {
      Waveform::Sine => (phase * 2.0 * PI).sin(),
      Waveform::Saw => 2.0 * phase - 1.0,
      Waveform::Square => {
        if phase < 0.5 {
          1.0
        } else {
          -1.0
        }
      }
    }
  }
}

/// Sound of a synth: oscillator shape, envelope times in seconds and output level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Patch {
  pub waveform: Waveform,
  pub attack: f64,
  pub release: f64,
  pub level: f64,
}

impl Default for Patch {
  fn default() -> Self {
    Patch {
      waveform: Waveform::Sine,
      attack: 0.005,
      release: 0.05,
      level: 0.3,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Envelope {
  Attack,
  Sustain,
  Release,
  Off,
}

#[derive(Debug, Clone, Copy)]
struct Voice {
  channel: u8,
  key: u8,
  amplitude: f64,
  phase: f64,
  phase_increment: f64,
  age: u64,
  envelope: Envelope,
  level: f64,
}

impl Voice {
  fn new() -> Voice {
    Voice {
      channel: 0,
      key: 0,
      amplitude: 0.0,
      phase: 0.0,
      phase_increment: 0.0,
      age: 0,
      envelope: Envelope::Off,
      level: 0.0,
    }
  }

  fn is_active(&self) -> bool {
    self.envelope != Envelope::Off
  }

  fn is_held(&self) -> bool {
    self.envelope == Envelope::Attack || self.envelope == Envelope::Sustain
  }

  fn note_on(&mut self, channel: u8, key: u8, velocity: u8, sample_rate: f64) {
    let frequency = 440.0 * 2.0f64.powf((f64::from(key) - 69.0) / 12.0);
    self.channel = channel;
    self.key = key;
    self.amplitude = f64::from(velocity) / 127.0;
    self.phase = 0.0;
    self.phase_increment = frequency / sample_rate;
    self.age = 0;
    self.envelope = Envelope::Attack;
    self.level = 0.0;
  }

  fn release(&mut self) {
    if self.is_active() {
      self.envelope = Envelope::Release;
    }
  }

  fn silence(&mut self) {
    self.envelope = Envelope::Off;
    self.level = 0.0;
  }

  fn next_sample(&mut self, patch: &Patch, attack_step: f64, release_step: f64) -> f64 {
    match self.envelope {
      Envelope::Off => return 0.0,
      Envelope::Attack => {
        self.level += attack_step;
        if self.level >= 1.0 {
          self.level = 1.0;
          self.envelope = Envelope::Sustain;
        }
      }
      Envelope::Sustain => {}
      Envelope::Release => {
        self.level -= release_step;
        if self.level <= 0.0 {
          self.silence();
          return 0.0;
        }
      }
    }

    let value = patch.waveform.value(self.phase) * self.amplitude * self.level;
    self.phase += self.phase_increment;
    if self.phase >= 1.0 {
      self.phase -= 1.0;
    }
    self.age += 1;
    value
  }
}

/// Small polyphonic synthesizer, the instrument behind the built-in catalog.
pub struct Synth {
  name: String,
  patch: Patch,
  voices: [Voice; MAX_VOICES],
  sample_rate: f64,
}

impl Synth {
  pub fn new<T: Into<String>>(name: T, patch: Patch) -> Synth {
    Synth {
      name: name.into(),
      patch,
      voices: [Voice::new(); MAX_VOICES],
      sample_rate: 44100.0,
    }
  }

  pub fn active_voices(&self) -> usize {
    self.voices.iter().filter(|voice| voice.is_active()).count()
  }

  fn handle(&mut self, message: Message) {
    match message {
      Message::NoteOn {
        channel,
        key,
        velocity,
      } if velocity > 0 => {
        let index = self.free_voice();
        self.voices[index].note_on(channel, key, velocity, self.sample_rate);
      }
      Message::NoteOn { channel, key, .. } | Message::NoteOff { channel, key, .. } => {
        if let Some(voice) = self
          .voices
          .iter_mut()
          .find(|voice| voice.is_held() && voice.channel == channel && voice.key == key)
        {
          voice.release();
        }
      }
      Message::AllNotesOff { channel } => self
        .voices
        .iter_mut()
        .filter(|voice| voice.channel == channel)
        .for_each(Voice::release),
      Message::AllSoundOff { channel } => self
        .voices
        .iter_mut()
        .filter(|voice| voice.channel == channel)
        .for_each(Voice::silence),
      _ => {}
    }
  }

  /// An inactive voice, or the oldest one when all of them are sounding.
  fn free_voice(&self) -> usize {
    self
      .voices
      .iter()
      .position(|voice| !voice.is_active())
      .or_else(|| {
        self
          .voices
          .iter()
          .enumerate()
          .max_by_key(|(_, voice)| voice.age)
          .map(|(index, _)| index)
      })
      .unwrap_or(0)
  }

  fn render<S: FloatSample>(&mut self, midi: &midi::Buffer, audio: &mut audio::Buffer<S>) {
    audio.clear();

    let patch = self.patch;
    let attack_step = 1.0 / (patch.attack * self.sample_rate).max(1.0);
    let release_step = 1.0 / (patch.release * self.sample_rate).max(1.0);

    let mut events = midi.iter().peekable();
    for frame in 0..audio.frames() {
      while let Some(message) = events
        .peek()
        .filter(|event| event.offset as usize <= frame)
        .map(|event| event.message)
      {
        events.next();
        self.handle(message);
      }

      let mut mix = 0.0;
      for voice in self.voices.iter_mut() {
        mix += voice.next_sample(&patch, attack_step, release_step);
      }
      let sample = S::from_sample(mix * patch.level);
      for channel in 0..audio.num_channels() {
        audio.channel_mut(channel)[frame] = sample;
      }
    }

    for event in events {
      self.handle(event.message);
    }
  }
}

impl Instrument for Synth {
  fn name(&self) -> &str {
    &self.name
  }

  fn prepare(&mut self, sample_rate: SampleRate, _max_frames: usize) {
    self.sample_rate = f64::from(sample_rate.max(1));
    for voice in self.voices.iter_mut() {
      voice.silence();
    }
  }

  fn process(&mut self, midi: &midi::Buffer, audio: &mut audio::Buffer<f32>) {
    self.render(midi, audio);
  }

  fn process_double(&mut self, midi: &midi::Buffer, audio: &mut audio::Buffer<f64>) {
    self.render(midi, audio);
  }
}
