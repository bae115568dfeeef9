use dasp_sample::{FloatSample, Sample};

/// Planar multi-channel audio buffer.
///
/// Storage for `max_frames` is allocated up front; `set_frames` only changes
/// how much of it the current block uses.
#[derive(Debug, Clone)]
pub struct Buffer<S: FloatSample> {
  channels: Vec<Vec<S>>,
  frames: usize,
}

impl<S: FloatSample> Buffer<S> {
  pub fn new(num_channels: usize, max_frames: usize) -> Buffer<S> {
    Buffer {
      channels: (0..num_channels)
        .map(|_| vec![S::EQUILIBRIUM; max_frames])
        .collect(),
      frames: max_frames,
    }
  }

  pub fn num_channels(&self) -> usize {
    self.channels.len()
  }

  pub fn frames(&self) -> usize {
    self.frames
  }

  pub fn max_frames(&self) -> usize {
    self.channels.first().map(|c| c.len()).unwrap_or(0)
  }

  /// Sets the number of frames for the current block, limited to the allocated storage.
  pub fn set_frames(&mut self, frames: usize) {
    self.frames = frames.min(self.max_frames());
  }

  pub fn channel(&self, index: usize) -> &[S] {
    &self.channels[index][..self.frames]
  }

  pub fn channel_mut(&mut self, index: usize) -> &mut [S] {
    let frames = self.frames;
    &mut self.channels[index][..frames]
  }

  pub fn clear(&mut self) {
    let frames = self.frames;
    for channel in self.channels.iter_mut() {
      for sample in channel[..frames].iter_mut() {
        *sample = S::EQUILIBRIUM;
      }
    }
  }

  /// Copies the first channels of `other` over ours, as many as both have.
  pub fn copy_from(&mut self, other: &Buffer<S>) {
    let frames = self.frames.min(other.frames);
    for (dst, src) in self.channels.iter_mut().zip(other.channels.iter()) {
      dst[..frames].copy_from_slice(&src[..frames]);
    }
  }

  /// Mixes one channel of `other` into one of ours.
  pub fn add_channel_from(&mut self, index: usize, other: &Buffer<S>, other_index: usize) {
    let frames = self.frames.min(other.frames);
    let src = &other.channels[other_index][..frames];
    let dst = &mut self.channels[index][..frames];
    for (d, s) in dst.iter_mut().zip(src.iter()) {
      *d = *d + *s;
    }
  }

  pub fn apply_gain(&mut self, gain: S) {
    let frames = self.frames;
    for channel in self.channels.iter_mut() {
      for sample in channel[..frames].iter_mut() {
        *sample = sample.mul_amp(gain);
      }
    }
  }
}

#[cfg(test)]
mod test {
  use super::Buffer;

  #[test]
  pub fn set_frames_is_limited_to_storage() {
    let mut buffer = Buffer::<f32>::new(2, 64);
    buffer.set_frames(16);
    assert_eq!(buffer.channel(0).len(), 16);
    buffer.set_frames(1000);
    assert_eq!(buffer.frames(), 64);
  }

  #[test]
  pub fn mix_and_gain() {
    let mut a = Buffer::<f64>::new(2, 4);
    let mut b = Buffer::<f64>::new(2, 4);
    b.channel_mut(1).copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
    a.add_channel_from(0, &b, 1);
    a.add_channel_from(0, &b, 1);
    a.apply_gain(0.5);
    assert_eq!(a.channel(0), &[1.0, 2.0, 3.0, 4.0]);
    assert_eq!(a.channel(1), &[0.0; 4]);
    a.clear();
    assert_eq!(a.channel(0), &[0.0; 4]);
  }

  #[test]
  pub fn copy_from_matching_channels() {
    let mut a = Buffer::<f32>::new(2, 3);
    let mut b = Buffer::<f32>::new(1, 3);
    b.channel_mut(0).copy_from_slice(&[0.25, 0.5, 0.75]);
    a.copy_from(&b);
    assert_eq!(a.channel(0), &[0.25, 0.5, 0.75]);
    assert_eq!(a.channel(1), &[0.0; 3]);
  }
}
