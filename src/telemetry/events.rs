//! Telemetry event types exposed through `/events` and the health snapshot.

use serde::{Deserialize, Serialize};

use crate::detection::DetectionState;
use crate::error::CredentialError;

/// Where a detection frame was lost.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Capture,
    Analysis,
}

/// Events covering the detection path and the authorization path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum MetricEvent {
    StateTransition {
        from: DetectionState,
        to: DetectionState,
        timestamp_ms: u64,
    },
    Confirmation {
        sustained_ms: u64,
        peak_energy: f32,
        timestamp_ms: u64,
    },
    FrameSkipped {
        reason: SkipReason,
        code: i32,
    },
    NotificationFailed {
        code: i32,
        message: String,
    },
    CredentialIssued {
        expires_in_seconds: u64,
    },
    CredentialRejected {
        reason: CredentialError,
    },
    UnlockSucceeded {
        angle: u16,
        timestamp_ms: u64,
    },
    UnlockFailed {
        code: i32,
        message: String,
    },
}
