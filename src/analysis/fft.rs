// FFT module - Fast Fourier Transform computation
//
// This module handles FFT computation with Hann windowing to reduce
// spectral leakage. The magnitude spectrum feeds the per-tone energy
// estimate in the frequency analyzer.

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

/// FFT processor that computes magnitude spectra from audio frames
pub struct FftProcessor {
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    /// Hann window for FFT (pre-computed)
    window: Vec<f32>,
    /// Sum of window coefficients, used to turn bin magnitudes into amplitudes
    window_sum: f32,
}

impl FftProcessor {
    /// Create a new FFT processor
    ///
    /// The plan is computed once; `rustfft` handles non power-of-two sizes so
    /// the frame length does not need padding.
    pub fn new(fft_size: usize) -> Self {
        let window: Vec<f32> = (0..fft_size)
            .map(|i| {
                if fft_size < 2 {
                    return 1.0;
                }
                0.5 * (1.0
                    - ((2.0 * std::f32::consts::PI * i as f32) / (fft_size as f32 - 1.0)).cos())
            })
            .collect();
        let window_sum = window.iter().sum::<f32>().max(f32::EPSILON);

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        Self {
            fft,
            fft_size,
            window,
            window_sum,
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Compute magnitude spectrum
    ///
    /// Applies the Hann window, performs the FFT, and returns magnitudes for
    /// the positive frequencies only (size = fft_size / 2 + 1). Input shorter
    /// than `fft_size` is zero-padded; longer input is truncated.
    pub fn compute_magnitude_spectrum(&self, audio: &[f32]) -> Vec<f32> {
        let mut buffer: Vec<Complex<f32>> = audio
            .iter()
            .zip(self.window.iter())
            .map(|(&sample, &w)| Complex::new(sample * w, 0.0))
            .collect();
        buffer.resize(self.fft_size, Complex::new(0.0, 0.0));

        self.fft.process(&mut buffer);

        buffer[..self.fft_size / 2 + 1]
            .iter()
            .map(|c| c.norm())
            .collect()
    }

    /// Convert a bin magnitude into a sinusoid amplitude estimate.
    ///
    /// A full-scale sine centred on a bin maps to ~1.0.
    pub fn magnitude_to_amplitude(&self, magnitude: f32) -> f32 {
        2.0 * magnitude / self.window_sum
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spectrum_size() {
        let fft = FftProcessor::new(1024);
        let spectrum = fft.compute_magnitude_spectrum(&vec![0.0; 1024]);
        assert_eq!(spectrum.len(), 513);
        assert!(spectrum.iter().all(|&m| m == 0.0));
    }

    #[test]
    fn test_bin_centred_sine_amplitude() {
        let n = 1024;
        let fft = FftProcessor::new(n);
        // Bin 64 exactly
        let samples: Vec<f32> = (0..n)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * 64.0 * i as f32 / n as f32).sin())
            .collect();

        let spectrum = fft.compute_magnitude_spectrum(&samples);
        let amplitude = fft.magnitude_to_amplitude(spectrum[64]);

        assert!((amplitude - 0.5).abs() < 0.02, "amplitude {}", amplitude);
    }
}
