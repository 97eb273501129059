// Snapshot capture error types
//
// A failed snapshot never blocks a notification; the message goes out
// without an image.

use crate::error::ErrorCode;
use log::warn;
use std::fmt;

/// Error code range: 6001-6004
pub struct SnapshotErrorCodes;

impl SnapshotErrorCodes {
    /// Capture command could not be started or exited non-zero
    pub const COMMAND_FAILED: i32 = 6001;

    /// Capture command did not finish in time
    pub const TIMEOUT: i32 = 6002;

    /// Snapshot file could not be read
    pub const READ_FAILED: i32 = 6003;

    /// Capture produced no bytes
    pub const EMPTY: i32 = 6004;
}

pub fn log_snapshot_error(err: &SnapshotError, source: &str) {
    warn!(
        "Snapshot error in {}: code={}, component=Snapshot, message={}",
        source,
        err.code(),
        err.message()
    );
}

#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotError {
    CommandFailed { program: String, details: String },
    Timeout { program: String, timeout_ms: u64 },
    ReadFailed { path: String, details: String },
    Empty,
}

impl ErrorCode for SnapshotError {
    fn code(&self) -> i32 {
        match self {
            SnapshotError::CommandFailed { .. } => SnapshotErrorCodes::COMMAND_FAILED,
            SnapshotError::Timeout { .. } => SnapshotErrorCodes::TIMEOUT,
            SnapshotError::ReadFailed { .. } => SnapshotErrorCodes::READ_FAILED,
            SnapshotError::Empty => SnapshotErrorCodes::EMPTY,
        }
    }

    fn message(&self) -> String {
        match self {
            SnapshotError::CommandFailed { program, details } => {
                format!("Capture command '{}' failed: {}", program, details)
            }
            SnapshotError::Timeout {
                program,
                timeout_ms,
            } => format!(
                "Capture command '{}' did not finish within {} ms",
                program, timeout_ms
            ),
            SnapshotError::ReadFailed { path, details } => {
                format!("Failed to read snapshot {}: {}", path, details)
            }
            SnapshotError::Empty => "Capture produced an empty image".to_string(),
        }
    }
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SnapshotError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for SnapshotError {}
