// Credential error types and constants

use crate::error::ErrorCode;
use std::fmt;

/// Credential error code constants
///
/// Error code range: 2001-2003
pub struct CredentialErrorCodes;

impl CredentialErrorCodes {
    /// Code was never issued, or has already been evicted
    pub const NOT_FOUND: i32 = 2001;

    /// Validity window has elapsed
    pub const EXPIRED: i32 = 2002;

    /// Code was already used once
    pub const ALREADY_CONSUMED: i32 = 2003;
}

/// Why a presented code did not authorize anything
///
/// Callers outside the process only ever see a single "invalid or expired
/// code" response; the variant is kept for logs and telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialError {
    NotFound,
    Expired,
    AlreadyConsumed,
}

impl ErrorCode for CredentialError {
    fn code(&self) -> i32 {
        match self {
            CredentialError::NotFound => CredentialErrorCodes::NOT_FOUND,
            CredentialError::Expired => CredentialErrorCodes::EXPIRED,
            CredentialError::AlreadyConsumed => CredentialErrorCodes::ALREADY_CONSUMED,
        }
    }

    fn message(&self) -> String {
        match self {
            CredentialError::NotFound => "Credential not found".to_string(),
            CredentialError::Expired => "Credential expired".to_string(),
            CredentialError::AlreadyConsumed => "Credential already consumed".to_string(),
        }
    }
}

impl fmt::Display for CredentialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CredentialError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for CredentialError {}
