// Analysis module - frequency-domain view of each captured frame
//
// Pipeline: AudioFrame → Hann window → FFT → per-tone band peak → EnergyReport.
// Everything here is pure; temporal logic lives in `detection`.

pub mod fft;
pub mod spectrum;

pub use fft::FftProcessor;
pub use spectrum::{EnergyReport, FrequencyAnalyzer, TargetSpectrum, TargetTone, ToneEnergy};
