// Actuator and unlock error types

use crate::error::{CredentialError, ErrorCode};
use log::error;
use std::fmt;

/// Actuator error code constants
///
/// Error code range: 3001-3003
pub struct ActuatorErrorCodes;

impl ActuatorErrorCodes {
    /// Requested angle outside [0, 180]
    pub const ANGLE_OUT_OF_RANGE: i32 = 3001;

    /// PWM channel write failed
    pub const HARDWARE_ERROR: i32 = 3002;

    /// Actuator lock was poisoned by a panicking mover
    pub const LOCK_POISONED: i32 = 3003;
}

/// Log an actuator error with structured context
pub fn log_actuator_error(err: &ActuatorError, context: &str) {
    error!(
        "Actuator error in {}: code={}, component=Actuator, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Failure commanding the door actuator
#[derive(Debug, Clone, PartialEq)]
pub enum ActuatorError {
    AngleOutOfRange { angle: i32 },
    HardwareError { details: String },
    LockPoisoned,
}

impl ErrorCode for ActuatorError {
    fn code(&self) -> i32 {
        match self {
            ActuatorError::AngleOutOfRange { .. } => ActuatorErrorCodes::ANGLE_OUT_OF_RANGE,
            ActuatorError::HardwareError { .. } => ActuatorErrorCodes::HARDWARE_ERROR,
            ActuatorError::LockPoisoned => ActuatorErrorCodes::LOCK_POISONED,
        }
    }

    fn message(&self) -> String {
        match self {
            ActuatorError::AngleOutOfRange { angle } => {
                format!("Angle must be between 0 and 180 degrees (got {})", angle)
            }
            ActuatorError::HardwareError { details } => {
                format!("Servo control error: {}", details)
            }
            ActuatorError::LockPoisoned => "Actuator lock poisoned".to_string(),
        }
    }
}

impl fmt::Display for ActuatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ActuatorError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for ActuatorError {}

impl From<std::io::Error> for ActuatorError {
    fn from(err: std::io::Error) -> Self {
        ActuatorError::HardwareError {
            details: err.to_string(),
        }
    }
}

/// Outcome of a failed unlock attempt
///
/// Keeps "bad code" and "actuator failed" apart so the HTTP layer can answer
/// them differently without revealing which credential check failed.
#[derive(Debug, Clone, PartialEq)]
pub enum UnlockError {
    Credential(CredentialError),
    Actuator(ActuatorError),
}

impl ErrorCode for UnlockError {
    fn code(&self) -> i32 {
        match self {
            UnlockError::Credential(err) => err.code(),
            UnlockError::Actuator(err) => err.code(),
        }
    }

    fn message(&self) -> String {
        match self {
            UnlockError::Credential(err) => err.message(),
            UnlockError::Actuator(err) => err.message(),
        }
    }
}

impl fmt::Display for UnlockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnlockError::Credential(err) => write!(f, "unlock rejected: {}", err),
            UnlockError::Actuator(err) => write!(f, "unlock failed: {}", err),
        }
    }
}

impl std::error::Error for UnlockError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            UnlockError::Credential(err) => Some(err),
            UnlockError::Actuator(err) => Some(err),
        }
    }
}

impl From<CredentialError> for UnlockError {
    fn from(err: CredentialError) -> Self {
        UnlockError::Credential(err)
    }
}

impl From<ActuatorError> for UnlockError {
    fn from(err: ActuatorError) -> Self {
        UnlockError::Actuator(err)
    }
}
