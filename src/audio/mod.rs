// Audio module - frame acquisition for the detection loop
//
// A `FrameSource` hands out fixed-length mono frames at a fixed sample rate.
// Sources: live microphone (cpal), WAV replay (hound), and scripted tones.

#[cfg(feature = "cpal-capture")]
pub mod capture;
pub mod frame;
pub mod ring;
pub mod tone;
pub mod wav;

#[cfg(feature = "cpal-capture")]
pub use capture::CpalSource;
pub use frame::{frame_duration, AudioFrame};
pub use ring::{CaptureRing, CaptureRingChannels};
pub use tone::ToneSource;
pub use wav::WavSource;

use crate::error::AudioError;

/// Capture collaborator: an infinite (or restartable) stream of frames.
///
/// `next_frame` blocks for at most about one frame cadence. Sources are
/// created on the detection worker thread, so they need not be `Send`.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<AudioFrame, AudioError>;

    fn sample_rate(&self) -> u32;

    fn frame_len(&self) -> usize;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> Result<AudioFrame, AudioError> {
        (**self).next_frame()
    }

    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }

    fn frame_len(&self) -> usize {
        (**self).frame_len()
    }
}
