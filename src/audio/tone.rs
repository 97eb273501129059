//! Scripted synthetic source
//!
//! Plays back a list of segments (tones, silence, malformed frames, capture
//! faults) so the detection loop can be exercised without a microphone.

use std::collections::VecDeque;
use std::f64::consts::PI;
use std::thread;
use std::time::Duration;

use super::{frame_duration, AudioFrame, FrameSource};
use crate::error::AudioError;

#[derive(Debug, Clone)]
enum Segment {
    /// Sum of `(frequency_hz, amplitude)` sinusoids
    Tones { tones: Vec<(f32, f32)>, frames: usize },
    /// Frames of the wrong length
    Malformed { frames: usize },
    /// `next_frame` returns a stream failure
    Faults { frames: usize },
}

impl Segment {
    fn frames(&self) -> usize {
        match self {
            Segment::Tones { frames, .. }
            | Segment::Malformed { frames }
            | Segment::Faults { frames } => *frames,
        }
    }

    fn frames_mut(&mut self) -> &mut usize {
        match self {
            Segment::Tones { frames, .. }
            | Segment::Malformed { frames }
            | Segment::Faults { frames } => frames,
        }
    }
}

pub struct ToneSource {
    sample_rate: u32,
    frame_len: usize,
    script: VecDeque<Segment>,
    /// Absolute sample index, keeps phase continuous across frames
    position: u64,
    silence_after_script: bool,
    pacing: Option<Duration>,
}

impl ToneSource {
    pub fn new(sample_rate: u32, frame_len: usize) -> Self {
        Self {
            sample_rate,
            frame_len,
            script: VecDeque::new(),
            position: 0,
            silence_after_script: false,
            pacing: None,
        }
    }

    pub fn tones(mut self, tones: &[(f32, f32)], frames: usize) -> Self {
        self.script.push_back(Segment::Tones {
            tones: tones.to_vec(),
            frames,
        });
        self
    }

    pub fn silence(self, frames: usize) -> Self {
        self.tones(&[], frames)
    }

    pub fn malformed(mut self, frames: usize) -> Self {
        self.script.push_back(Segment::Malformed { frames });
        self
    }

    pub fn faults(mut self, frames: usize) -> Self {
        self.script.push_back(Segment::Faults { frames });
        self
    }

    /// Emit silence forever once the script runs out instead of ending.
    pub fn then_silence_forever(mut self) -> Self {
        self.silence_after_script = true;
        self
    }

    /// Sleep for one frame duration per frame, like a real device would.
    pub fn paced(mut self) -> Self {
        self.pacing = Some(frame_duration(self.frame_len, self.sample_rate));
        self
    }

    /// Render a single frame starting at phase zero.
    pub fn render(&self, tones: &[(f32, f32)]) -> AudioFrame {
        AudioFrame::new(self.synthesize(tones, 0), self.sample_rate)
    }

    fn synthesize(&self, tones: &[(f32, f32)], start: u64) -> Vec<f32> {
        let rate = self.sample_rate as f64;
        (0..self.frame_len as u64)
            .map(|i| {
                let t = (start + i) as f64 / rate;
                tones
                    .iter()
                    .map(|&(freq, amp)| amp * (2.0 * PI * freq as f64 * t).sin() as f32)
                    .sum::<f32>()
            })
            .collect()
    }
}

impl FrameSource for ToneSource {
    fn next_frame(&mut self) -> Result<AudioFrame, AudioError> {
        if let Some(pacing) = self.pacing {
            thread::sleep(pacing);
        }

        while matches!(self.script.front(), Some(seg) if seg.frames() == 0) {
            self.script.pop_front();
        }

        let segment = match self.script.front_mut() {
            Some(segment) => {
                *segment.frames_mut() -= 1;
                segment.clone()
            }
            None if self.silence_after_script => Segment::Tones {
                tones: Vec::new(),
                frames: 1,
            },
            None => return Err(AudioError::EndOfStream),
        };

        let start = self.position;
        self.position += self.frame_len as u64;

        match segment {
            Segment::Tones { tones, .. } => Ok(AudioFrame::new(
                self.synthesize(&tones, start),
                self.sample_rate,
            )),
            Segment::Malformed { .. } => Ok(AudioFrame::new(
                vec![0.0; self.frame_len / 2],
                self.sample_rate,
            )),
            Segment::Faults { .. } => Err(AudioError::StreamFailure {
                reason: "scripted fault".to_string(),
            }),
        }
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn frame_len(&self) -> usize {
        self.frame_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_plays_in_order_then_ends() {
        let mut source = ToneSource::new(8000, 80)
            .tones(&[(1000.0, 0.5)], 1)
            .malformed(1)
            .faults(1);

        let first = source.next_frame().unwrap();
        assert_eq!(first.len(), 80);
        assert!(first.rms() > 0.3);

        assert_eq!(source.next_frame().unwrap().len(), 40);
        assert!(matches!(
            source.next_frame(),
            Err(AudioError::StreamFailure { .. })
        ));
        assert_eq!(source.next_frame(), Err(AudioError::EndOfStream));
    }

    #[test]
    fn test_silence_forever_never_ends() {
        let mut source = ToneSource::new(8000, 80).then_silence_forever();
        for _ in 0..5 {
            assert_eq!(source.next_frame().unwrap().rms(), 0.0);
        }
    }
}
