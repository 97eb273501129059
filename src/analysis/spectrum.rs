// Target-tone energy estimation
//
// The analyzer answers one question per frame: how loud is each configured
// intercom tone right now? It never keeps state between frames.

use serde::{Deserialize, Serialize};

use super::fft::FftProcessor;
use crate::audio::AudioFrame;
use crate::error::{ConfigError, SignalInputError};

/// One frequency that makes up the intercom chime
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetTone {
    /// Centre frequency in Hz
    pub frequency_hz: f32,
    /// Accepted deviation either side of the centre, in Hz
    pub tolerance_hz: f32,
}

impl TargetTone {
    pub fn new(frequency_hz: f32, tolerance_hz: f32) -> Self {
        Self {
            frequency_hz,
            tolerance_hz,
        }
    }
}

/// Set of tones that together define "the intercom rang"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetSpectrum {
    tones: Vec<TargetTone>,
}

impl TargetSpectrum {
    pub fn new(tones: Vec<TargetTone>) -> Self {
        Self { tones }
    }

    pub fn tones(&self) -> &[TargetTone] {
        &self.tones
    }

    pub fn len(&self) -> usize {
        self.tones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tones.is_empty()
    }
}

/// Normalized energy of a single target tone
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToneEnergy {
    pub frequency_hz: f32,
    /// Amplitude estimate in [0, 1]
    pub energy: f32,
}

/// Per-tone energy for one frame, in the same order as the `TargetSpectrum`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnergyReport {
    pub tones: Vec<ToneEnergy>,
}

impl EnergyReport {
    pub fn energies(&self) -> impl Iterator<Item = f32> + '_ {
        self.tones.iter().map(|t| t.energy)
    }

    /// Energy of the tone whose centre is `frequency_hz`, if configured.
    pub fn energy_at(&self, frequency_hz: f32) -> Option<f32> {
        self.tones
            .iter()
            .find(|t| (t.frequency_hz - frequency_hz).abs() < f32::EPSILON)
            .map(|t| t.energy)
    }

    pub fn peak(&self) -> f32 {
        self.energies().fold(0.0, f32::max)
    }

    /// Report with the same energy on every tone. Handy for driving the
    /// state machine without synthesising audio.
    pub fn uniform(spectrum: &TargetSpectrum, energy: f32) -> Self {
        Self {
            tones: spectrum
                .tones()
                .iter()
                .map(|tone| ToneEnergy {
                    frequency_hz: tone.frequency_hz,
                    energy: energy.clamp(0.0, 1.0),
                })
                .collect(),
        }
    }
}

/// Inclusive FFT bin range covering one tone's tolerance band
#[derive(Debug, Clone, Copy)]
struct BinBand {
    lo: usize,
    hi: usize,
}

/// Windowed FFT analyzer for a fixed frame length and sample rate
pub struct FrequencyAnalyzer {
    sample_rate: u32,
    frame_len: usize,
    spectrum: TargetSpectrum,
    bands: Vec<BinBand>,
    fft: FftProcessor,
}

impl FrequencyAnalyzer {
    /// Build an analyzer, checking that every tolerance band covers at least
    /// one FFT bin at this resolution.
    pub fn new(
        sample_rate: u32,
        frame_len: usize,
        spectrum: TargetSpectrum,
    ) -> Result<Self, ConfigError> {
        if sample_rate == 0 {
            return Err(ConfigError::invalid("audio.sample_rate", "must be > 0"));
        }
        if frame_len < 2 {
            return Err(ConfigError::invalid("audio.frame_len", "must be at least 2"));
        }
        if spectrum.is_empty() {
            return Err(ConfigError::invalid(
                "detection.targets",
                "at least one target tone is required",
            ));
        }

        let bin_width = sample_rate as f32 / frame_len as f32;
        let nyquist_bin = frame_len / 2;
        let nyquist = sample_rate as f32 / 2.0;

        let mut bands = Vec::with_capacity(spectrum.len());
        for tone in spectrum.tones() {
            if !(tone.frequency_hz > 0.0 && tone.frequency_hz < nyquist) {
                return Err(ConfigError::invalid(
                    "detection.targets",
                    format!(
                        "{} Hz is outside (0, {}) Hz for this sample rate",
                        tone.frequency_hz, nyquist
                    ),
                ));
            }
            if !(tone.tolerance_hz >= 0.0) {
                return Err(ConfigError::invalid(
                    "detection.targets",
                    format!("tolerance for {} Hz must be >= 0", tone.frequency_hz),
                ));
            }

            let lo_hz = (tone.frequency_hz - tone.tolerance_hz).max(0.0);
            let hi_hz = tone.frequency_hz + tone.tolerance_hz;
            let lo = (lo_hz / bin_width).ceil() as usize;
            let hi = ((hi_hz / bin_width).floor() as usize).min(nyquist_bin);
            if lo > hi {
                return Err(ConfigError::invalid(
                    "detection.targets",
                    format!(
                        "{} Hz ± {} Hz falls between FFT bins ({:.2} Hz resolution); \
                         widen the tolerance or lengthen the frame",
                        tone.frequency_hz, tone.tolerance_hz, bin_width
                    ),
                ));
            }
            bands.push(BinBand { lo, hi });
        }

        Ok(Self {
            sample_rate,
            frame_len,
            spectrum,
            bands,
            fft: FftProcessor::new(frame_len),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    pub fn spectrum(&self) -> &TargetSpectrum {
        &self.spectrum
    }

    /// Frequency resolution in Hz per bin
    pub fn bin_width_hz(&self) -> f32 {
        self.sample_rate as f32 / self.frame_len as f32
    }

    /// Estimate each target tone's energy in `frame`.
    pub fn analyze(&self, frame: &AudioFrame) -> Result<EnergyReport, SignalInputError> {
        self.validate(frame)?;

        let magnitudes = self.fft.compute_magnitude_spectrum(frame.samples());

        let tones = self
            .spectrum
            .tones()
            .iter()
            .zip(self.bands.iter())
            .map(|(tone, band)| {
                let peak = magnitudes[band.lo..=band.hi]
                    .iter()
                    .copied()
                    .fold(0.0_f32, f32::max);
                ToneEnergy {
                    frequency_hz: tone.frequency_hz,
                    energy: self.fft.magnitude_to_amplitude(peak).clamp(0.0, 1.0),
                }
            })
            .collect();

        Ok(EnergyReport { tones })
    }

    fn validate(&self, frame: &AudioFrame) -> Result<(), SignalInputError> {
        if frame.is_empty() {
            return Err(SignalInputError::Empty);
        }
        if frame.len() != self.frame_len {
            return Err(SignalInputError::WrongLength {
                expected: self.frame_len,
                actual: frame.len(),
            });
        }
        if frame.sample_rate() != self.sample_rate {
            return Err(SignalInputError::SampleRateMismatch {
                expected: self.sample_rate,
                actual: frame.sample_rate(),
            });
        }
        if let Some(index) = frame.samples().iter().position(|s| !s.is_finite()) {
            return Err(SignalInputError::NonFinite { index });
        }
        Ok(())
    }
}
