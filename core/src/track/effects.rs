use crate::audio;
use crate::time::SampleRate;

/// Balanced stereo panner, -1 is hard left and 1 hard right.
/// Unity at the centre; moving off centre only attenuates the opposite side.
#[derive(Debug, Clone)]
pub struct Pan {
  position: f32,
  left: f32,
  right: f32,
}

impl Pan {
  pub fn new() -> Pan {
    let mut pan = Pan {
      position: 0.0,
      left: 1.0,
      right: 1.0,
    };
    pan.set_position(0.0);
    pan
  }

  pub fn position(&self) -> f32 {
    self.position
  }

  pub fn set_position(&mut self, position: f32) {
    self.position = if position.is_finite() {
      position.max(-1.0).min(1.0)
    } else {
      0.0
    };
    self.left = (1.0 - self.position).min(1.0);
    self.right = (1.0 + self.position).min(1.0);
  }

  pub fn process(&self, audio: &mut audio::Buffer<f32>) {
    if audio.num_channels() < 2 {
      return;
    }
    audio.channel_mut(0).iter_mut().for_each(|s| *s *= self.left);
    audio.channel_mut(1).iter_mut().for_each(|s| *s *= self.right);
  }
}

impl Default for Pan {
  fn default() -> Self {
    Pan::new()
  }
}

/// Linear gain stage.
#[derive(Debug, Clone)]
pub struct Gain {
  linear: f32,
}

impl Gain {
  pub fn new(linear: f32) -> Gain {
    let mut gain = Gain { linear: 1.0 };
    gain.set_linear(linear);
    gain
  }

  pub fn linear(&self) -> f32 {
    self.linear
  }

  pub fn set_linear(&mut self, linear: f32) {
    if linear.is_finite() {
      self.linear = linear.max(0.0);
    }
  }

  pub fn process(&self, audio: &mut audio::Buffer<f32>) {
    audio.apply_gain(self.linear);
  }
}

impl Default for Gain {
  fn default() -> Self {
    Gain::new(1.0)
  }
}

/// Post graph stereo chain: stage 1 pans, stage 2 scales.
#[derive(Debug, Clone, Default)]
pub struct EffectChain {
  pan: Pan,
  gain: Gain,
}

impl EffectChain {
  pub fn new() -> EffectChain {
    EffectChain::default()
  }

  pub fn prepare(&mut self, _sample_rate: SampleRate, _max_frames: usize) {}

  pub fn pan(&self) -> &Pan {
    &self.pan
  }

  pub fn pan_mut(&mut self) -> &mut Pan {
    &mut self.pan
  }

  pub fn gain(&self) -> &Gain {
    &self.gain
  }

  pub fn gain_mut(&mut self) -> &mut Gain {
    &mut self.gain
  }

  pub fn process(&self, audio: &mut audio::Buffer<f32>) {
    self.pan.process(audio);
    self.gain.process(audio);
  }
}

#[cfg(test)]
mod test {
  use super::{EffectChain, Gain, Pan};
  use crate::audio;

  fn ones() -> audio::Buffer<f32> {
    let mut audio = audio::Buffer::new(2, 4);
    audio.channel_mut(0).copy_from_slice(&[1.0; 4]);
    audio.channel_mut(1).copy_from_slice(&[1.0; 4]);
    audio
  }

  #[test]
  pub fn centre_pan_is_unity() {
    let mut audio = ones();
    Pan::new().process(&mut audio);
    assert_eq!(audio.channel(0)[0], 1.0);
    assert_eq!(audio.channel(1)[0], 1.0);
  }

  #[test]
  pub fn half_right_attenuates_the_left_side_only() {
    let mut pan = Pan::new();
    pan.set_position(0.5);
    let mut audio = ones();
    pan.process(&mut audio);
    assert!((audio.channel(0)[0] - 0.5).abs() < 1e-6);
    assert_eq!(audio.channel(1)[0], 1.0);
  }

  #[test]
  pub fn hard_left() {
    let mut pan = Pan::new();
    pan.set_position(-4.0);
    assert_eq!(pan.position(), -1.0);
    let mut audio = ones();
    pan.process(&mut audio);
    assert!((audio.channel(0)[0] - 1.0).abs() < 1e-6);
    assert!(audio.channel(1)[0].abs() < 1e-6);
  }

  #[test]
  pub fn gain_ignores_invalid_values() {
    let mut gain = Gain::new(0.5);
    gain.set_linear(f32::NAN);
    assert_eq!(gain.linear(), 0.5);
    gain.set_linear(-1.0);
    assert_eq!(gain.linear(), 0.0);
  }

  #[test]
  pub fn chain_applies_gain_after_pan() {
    let mut chain = EffectChain::new();
    chain.gain_mut().set_linear(0.5);
    chain.pan_mut().set_position(1.0);
    let mut audio = ones();
    chain.process(&mut audio);
    assert!(audio.channel(0)[0].abs() < 1e-6);
    assert!((audio.channel(1)[0] - 0.5).abs() < 1e-6);
  }
}
