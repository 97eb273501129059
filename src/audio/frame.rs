use std::time::Duration;

/// Fixed-length block of mono samples in [-1.0, 1.0]
///
/// Frames are produced and consumed within one analysis cycle and never
/// retained.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Convert signed 16-bit PCM into a frame.
    pub fn from_i16(samples: &[i16], sample_rate: u32) -> Self {
        Self::new(
            samples
                .iter()
                .map(|&s| s as f32 / i16::MAX as f32)
                .collect(),
            sample_rate,
        )
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        frame_duration(self.samples.len(), self.sample_rate)
    }

    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum_squares: f64 = self.samples.iter().map(|&x| (x as f64) * (x as f64)).sum();
        (sum_squares / self.samples.len() as f64).sqrt() as f32
    }
}

/// Duration covered by `frame_len` samples at `sample_rate`, in whole
/// nanoseconds so that repeated accumulation stays exact.
pub fn frame_duration(frame_len: usize, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    Duration::from_nanos(frame_len as u64 * 1_000_000_000 / sample_rate as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_duration_is_exact() {
        assert_eq!(frame_duration(4410, 44_100), Duration::from_millis(100));
        assert_eq!(frame_duration(4410, 44_100) * 20, Duration::from_secs(2));
        assert_eq!(frame_duration(10, 0), Duration::ZERO);
    }

    #[test]
    fn test_from_i16_scales_to_unit_range() {
        let frame = AudioFrame::from_i16(&[i16::MAX, 0, -i16::MAX], 8000);
        assert_eq!(frame.samples(), &[1.0, 0.0, -1.0]);
    }

    #[test]
    fn test_rms_of_square_wave() {
        let frame = AudioFrame::new(vec![0.5, -0.5, 0.5, -0.5], 8000);
        assert!((frame.rms() - 0.5).abs() < 1e-6);
        assert_eq!(AudioFrame::new(Vec::new(), 8000).rms(), 0.0);
    }
}
