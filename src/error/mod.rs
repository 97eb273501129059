// Error types for the intercom unlock service
//
// One file per failure domain. Every error carries a stable numeric code and a
// human-readable message through the `ErrorCode` trait so HTTP responses, logs,
// and telemetry can report failures consistently.

mod actuator;
mod audio;
mod config;
mod credential;
mod notifier;
mod signal;
mod snapshot;

pub use actuator::{log_actuator_error, ActuatorError, ActuatorErrorCodes, UnlockError};
pub use audio::{log_audio_error, AudioError, AudioErrorCodes};
pub use config::{ConfigError, ConfigErrorCodes};
pub use credential::{CredentialError, CredentialErrorCodes};
pub use notifier::{log_notifier_error, NotifierError, NotifierErrorCodes};
pub use signal::{SignalInputError, SignalInputErrorCodes};
pub use snapshot::{log_snapshot_error, SnapshotError, SnapshotErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
