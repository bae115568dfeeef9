#[cfg(any(target_os = "macos", target_os = "windows"))]
use audio_thread_priority::{
  demote_current_thread_from_real_time, promote_current_thread_to_real_time, RtPriorityHandle,
};

use failure::Fail;

use echo_studio_core::time::SampleRate;

#[derive(Debug, Fail)]
#[fail(display = "Thread could not be promoted to real time: {}", cause)]
pub struct RealTimeAudioPriorityError {
  cause: String,
}

/// Keeps the current thread at real-time priority until dropped.
pub struct RealTimeAudioPriority {
  #[cfg(any(target_os = "macos", target_os = "windows"))]
  handle: Option<RtPriorityHandle>,
}

impl RealTimeAudioPriority {
  pub fn promote(
    sample_rate: SampleRate,
    frames: usize,
  ) -> Result<RealTimeAudioPriority, RealTimeAudioPriorityError> {
    Self::promote_rt(sample_rate, frames as u32)
  }

  #[cfg(any(target_os = "macos", target_os = "windows"))]
  fn promote_rt(
    sample_rate: SampleRate,
    frames: u32,
  ) -> Result<RealTimeAudioPriority, RealTimeAudioPriorityError> {
    promote_current_thread_to_real_time(frames, sample_rate)
      .map(|handle| RealTimeAudioPriority {
        handle: Some(handle),
      })
      .map_err(|err| RealTimeAudioPriorityError {
        cause: err.to_string(),
      })
  }

  #[cfg(any(target_os = "macos", target_os = "windows"))]
  fn demote_rt(&mut self) {
    if let Some(handle) = self.handle.take() {
      drop(demote_current_thread_from_real_time(handle));
    }
  }

  #[cfg(not(any(target_os = "macos", target_os = "windows")))]
  fn promote_rt(
    _sample_rate: SampleRate,
    _frames: u32,
  ) -> Result<RealTimeAudioPriority, RealTimeAudioPriorityError> {
    Ok(RealTimeAudioPriority {})
  }

  #[cfg(not(any(target_os = "macos", target_os = "windows")))]
  fn demote_rt(&mut self) {}
}

impl Drop for RealTimeAudioPriority {
  fn drop(&mut self) {
    self.demote_rt();
  }
}
