//! WAV replay source
//!
//! Decodes a whole file up front (recordings of a doorbell are short) and
//! serves it frame by frame. Multi-channel files are averaged to mono.

use std::path::Path;

use hound::{SampleFormat, WavReader};

use super::{AudioFrame, FrameSource};
use crate::error::AudioError;

pub struct WavSource {
    samples: Vec<f32>,
    sample_rate: u32,
    frame_len: usize,
    cursor: usize,
    looping: bool,
}

impl WavSource {
    pub fn open<P: AsRef<Path>>(path: P, frame_len: usize) -> Result<Self, AudioError> {
        let mut reader = WavReader::open(path.as_ref())?;
        let spec = reader.spec();
        let channels = spec.channels.max(1) as usize;

        let interleaved: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
            SampleFormat::Int => {
                let scale = (1_i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<_, _>>()?
            }
        };

        let samples = interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect();

        tracing::info!(
            "[WavSource] Loaded {:?}: {} Hz, {} channel(s), {} bits",
            path.as_ref(),
            spec.sample_rate,
            spec.channels,
            spec.bits_per_sample
        );

        Ok(Self::from_samples(samples, spec.sample_rate, frame_len))
    }

    pub fn from_samples(samples: Vec<f32>, sample_rate: u32, frame_len: usize) -> Self {
        Self {
            samples,
            sample_rate,
            frame_len: frame_len.max(1),
            cursor: 0,
            looping: false,
        }
    }

    /// Restart from the beginning instead of ending.
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    /// Re-slice the recording into frames of `frame_len` samples, starting over.
    pub fn with_frame_len(mut self, frame_len: usize) -> Self {
        self.frame_len = frame_len.max(1);
        self.cursor = 0;
        self
    }

    pub fn total_frames(&self) -> usize {
        self.samples.len() / self.frame_len
    }
}

impl FrameSource for WavSource {
    fn next_frame(&mut self) -> Result<AudioFrame, AudioError> {
        if self.cursor + self.frame_len > self.samples.len() {
            if !self.looping || self.samples.len() < self.frame_len {
                return Err(AudioError::EndOfStream);
            }
            self.cursor = 0;
        }

        let frame = self.samples[self.cursor..self.cursor + self.frame_len].to_vec();
        self.cursor += self.frame_len;
        Ok(AudioFrame::new(frame, self.sample_rate))
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
    use hound::{WavSpec, WavWriter};

    #[test]
    fn test_reads_stereo_int_file_as_mono() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chime.wav");
        let spec = WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for _ in 0..8 {
            writer.write_sample(16384_i16).unwrap();
            writer.write_sample(0_i16).unwrap();
        }
        writer.finalize().unwrap();

        let mut source = WavSource::open(&path, 4).unwrap();
        assert_eq!(source.sample_rate(), 8000);
        assert_eq!(source.total_frames(), 2);

        let frame = source.next_frame().unwrap();
        assert!(frame.samples().iter().all(|&s| (s - 0.25).abs() < 1e-4));
        source.next_frame().unwrap();
        assert_eq!(source.next_frame(), Err(AudioError::EndOfStream));
    }

    #[test]
    fn test_looping_restarts() {
        let mut source = WavSource::from_samples(vec![0.1; 6], 8000, 4).looping(true);
        for _ in 0..3 {
            assert_eq!(source.next_frame().unwrap().len(), 4);
        }
    }

    #[test]
    fn test_with_frame_len_reslices() {
        let source = WavSource::from_samples(vec![0.0; 100], 8000, 10).with_frame_len(25);
        assert_eq!(source.frame_len(), 25);
        assert_eq!(source.total_frames(), 4);
    }
}
