// Signal input error types
//
// Raised by the frequency analyzer for frames it cannot interpret. The
// detection loop recovers from all of these by treating the frame as silence.

use crate::error::ErrorCode;
use std::fmt;

/// Error code range: 1101-1104
pub struct SignalInputErrorCodes;

impl SignalInputErrorCodes {
    pub const EMPTY: i32 = 1101;
    pub const WRONG_LENGTH: i32 = 1102;
    pub const SAMPLE_RATE_MISMATCH: i32 = 1103;
    pub const NON_FINITE: i32 = 1104;
}

/// Malformed audio frame
#[derive(Debug, Clone, PartialEq)]
pub enum SignalInputError {
    /// Frame carries no samples
    Empty,

    /// Frame length differs from the analyzer's configured frame length
    WrongLength { expected: usize, actual: usize },

    /// Frame was captured at a different sample rate
    SampleRateMismatch { expected: u32, actual: u32 },

    /// Frame contains NaN or infinite samples
    NonFinite { index: usize },
}

impl ErrorCode for SignalInputError {
    fn code(&self) -> i32 {
        match self {
            SignalInputError::Empty => SignalInputErrorCodes::EMPTY,
            SignalInputError::WrongLength { .. } => SignalInputErrorCodes::WRONG_LENGTH,
            SignalInputError::SampleRateMismatch { .. } => {
                SignalInputErrorCodes::SAMPLE_RATE_MISMATCH
            }
            SignalInputError::NonFinite { .. } => SignalInputErrorCodes::NON_FINITE,
        }
    }

    fn message(&self) -> String {
        match self {
            SignalInputError::Empty => "Frame contains no samples".to_string(),
            SignalInputError::WrongLength { expected, actual } => {
                format!("Frame length {} does not match expected {}", actual, expected)
            }
            SignalInputError::SampleRateMismatch { expected, actual } => {
                format!("Frame sample rate {} Hz, expected {} Hz", actual, expected)
            }
            SignalInputError::NonFinite { index } => {
                format!("Non-finite sample at index {}", index)
            }
        }
    }
}

impl fmt::Display for SignalInputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SignalInputError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for SignalInputError {}
