// Audio capture error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Audio error code constants
///
/// Error code range: 1001-1007
pub struct AudioErrorCodes;

impl AudioErrorCodes {
    /// Failed to open the capture stream
    pub const STREAM_OPEN_FAILED: i32 = 1001;

    /// No usable input device
    pub const DEVICE_UNAVAILABLE: i32 = 1002;

    /// Stream reported an error or its channel closed unexpectedly
    pub const STREAM_FAILURE: i32 = 1003;

    /// No frame arrived within one cadence interval
    pub const TIMEOUT: i32 = 1004;

    /// A finite source (WAV replay) ran out of samples
    pub const END_OF_STREAM: i32 = 1005;

    /// Underlying I/O or decoder error
    pub const HARDWARE_ERROR: i32 = 1006;

    /// Sample format or channel layout is not supported
    pub const UNSUPPORTED_FORMAT: i32 = 1007;
}

/// Log an audio error with structured context
///
/// The logging is non-blocking and will not panic on failure.
pub fn log_audio_error(err: &AudioError, context: &str) {
    error!(
        "Audio error in {}: code={}, component=FrameSource, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Capture-related errors
///
/// These cover frame acquisition from a `FrameSource`: opening the device,
/// stream failures, and cadence timeouts.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioError {
    /// Failed to open audio stream
    StreamOpenFailed { reason: String },

    /// No input device could be found
    DeviceUnavailable,

    /// Stream channel disconnected or device reported an error
    StreamFailure { reason: String },

    /// Frame acquisition exceeded the cadence budget
    Timeout { waited_ms: u64 },

    /// Source is exhausted
    EndOfStream,

    /// Hardware or decoder error occurred
    HardwareError { details: String },

    /// Unsupported sample format or layout
    UnsupportedFormat { details: String },
}

impl ErrorCode for AudioError {
    fn code(&self) -> i32 {
        match self {
            AudioError::StreamOpenFailed { .. } => AudioErrorCodes::STREAM_OPEN_FAILED,
            AudioError::DeviceUnavailable => AudioErrorCodes::DEVICE_UNAVAILABLE,
            AudioError::StreamFailure { .. } => AudioErrorCodes::STREAM_FAILURE,
            AudioError::Timeout { .. } => AudioErrorCodes::TIMEOUT,
            AudioError::EndOfStream => AudioErrorCodes::END_OF_STREAM,
            AudioError::HardwareError { .. } => AudioErrorCodes::HARDWARE_ERROR,
            AudioError::UnsupportedFormat { .. } => AudioErrorCodes::UNSUPPORTED_FORMAT,
        }
    }

    fn message(&self) -> String {
        match self {
            AudioError::StreamOpenFailed { reason } => {
                format!("Failed to open audio stream: {}", reason)
            }
            AudioError::DeviceUnavailable => "No default input device found".to_string(),
            AudioError::StreamFailure { reason } => format!("Audio stream failed: {}", reason),
            AudioError::Timeout { waited_ms } => {
                format!("No audio frame within {} ms", waited_ms)
            }
            AudioError::EndOfStream => "Audio source exhausted".to_string(),
            AudioError::HardwareError { details } => format!("Hardware error: {}", details),
            AudioError::UnsupportedFormat { details } => {
                format!("Unsupported audio format: {}", details)
            }
        }
    }
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AudioError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for AudioError {}

impl From<std::io::Error> for AudioError {
    fn from(err: std::io::Error) -> Self {
        AudioError::HardwareError {
            details: err.to_string(),
        }
    }
}

impl From<hound::Error> for AudioError {
    fn from(err: hound::Error) -> Self {
        match err {
            hound::Error::Unsupported => AudioError::UnsupportedFormat {
                details: "WAV encoding not supported".to_string(),
            },
            other => AudioError::HardwareError {
                details: other.to_string(),
            },
        }
    }
}
