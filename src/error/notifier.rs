// Notifier error types
//
// Delivery failures are logged where they happen and never retried by the
// detection loop.

use crate::error::ErrorCode;
use log::warn;
use std::fmt;

/// Error code range: 4001-4004
pub struct NotifierErrorCodes;

impl NotifierErrorCodes {
    /// Request could not be sent (DNS, TLS, timeout)
    pub const TRANSPORT: i32 = 4001;

    /// Provider answered with an error
    pub const REJECTED: i32 = 4002;

    /// Provider is missing a token or destination
    pub const NOT_CONFIGURED: i32 = 4003;

    /// Delivery queue full; the notification was dropped
    pub const QUEUE_FULL: i32 = 4004;
}

/// Log a notifier error; delivery failures are warnings, not errors, because
/// detection continues regardless.
pub fn log_notifier_error(err: &NotifierError, provider: &str) {
    warn!(
        "Notifier error in {}: code={}, component=Notifier, message={}",
        provider,
        err.code(),
        err.message()
    );
}

#[derive(Debug, Clone, PartialEq)]
pub enum NotifierError {
    Transport { details: String },
    Rejected { status: Option<u16>, details: String },
    NotConfigured { provider: &'static str },
    QueueFull { capacity: usize },
}

impl ErrorCode for NotifierError {
    fn code(&self) -> i32 {
        match self {
            NotifierError::Transport { .. } => NotifierErrorCodes::TRANSPORT,
            NotifierError::Rejected { .. } => NotifierErrorCodes::REJECTED,
            NotifierError::NotConfigured { .. } => NotifierErrorCodes::NOT_CONFIGURED,
            NotifierError::QueueFull { .. } => NotifierErrorCodes::QUEUE_FULL,
        }
    }

    fn message(&self) -> String {
        match self {
            NotifierError::Transport { details } => format!("Delivery failed: {}", details),
            NotifierError::Rejected {
                status: Some(status),
                details,
            } => format!("Provider rejected message (HTTP {}): {}", status, details),
            NotifierError::Rejected {
                status: None,
                details,
            } => format!("Provider rejected message: {}", details),
            NotifierError::NotConfigured { provider } => {
                format!("Notifier {} is missing credentials", provider)
            }
            NotifierError::QueueFull { capacity } => {
                format!("{} notifications already pending; dropped", capacity)
            }
        }
    }
}

impl fmt::Display for NotifierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "NotifierError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for NotifierError {}

impl From<reqwest::Error> for NotifierError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => NotifierError::Rejected {
                status: Some(status.as_u16()),
                details: err.to_string(),
            },
            None => NotifierError::Transport {
                details: err.to_string(),
            },
        }
    }
}
