// Configuration error types

use crate::error::ErrorCode;
use std::fmt;

/// Error code range: 5001-5003
pub struct ConfigErrorCodes;

impl ConfigErrorCodes {
    pub const READ_FAILED: i32 = 5001;
    pub const PARSE_FAILED: i32 = 5002;
    pub const INVALID: i32 = 5003;
}

/// Startup-time configuration failure
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    ReadFailed { path: String, reason: String },
    ParseFailed { path: String, reason: String },
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

impl ErrorCode for ConfigError {
    fn code(&self) -> i32 {
        match self {
            ConfigError::ReadFailed { .. } => ConfigErrorCodes::READ_FAILED,
            ConfigError::ParseFailed { .. } => ConfigErrorCodes::PARSE_FAILED,
            ConfigError::Invalid { .. } => ConfigErrorCodes::INVALID,
        }
    }

    fn message(&self) -> String {
        match self {
            ConfigError::ReadFailed { path, reason } => {
                format!("Failed to read config file {}: {}", path, reason)
            }
            ConfigError::ParseFailed { path, reason } => {
                format!("Failed to parse config file {}: {}", path, reason)
            }
            ConfigError::Invalid { field, reason } => {
                format!("Invalid configuration for {}: {}", field, reason)
            }
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ConfigError {}
