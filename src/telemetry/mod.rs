//! Telemetry collector and helpers.
//!
//! The collector multiplexes detection and authorization events into a
//! bounded history plus an async broadcast stream. It is owned by the
//! application and shared by `Arc`; there is no process-wide instance.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::broadcast;

use crate::detection::{DetectionEvent, DetectionState};
use crate::error::{ActuatorError, CredentialError, ErrorCode, NotifierError};

pub mod events;

pub use events::{MetricEvent, SkipReason};

/// Snapshot of collector state for HTTP/CLI reporting.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TelemetrySnapshot {
    pub recent: Vec<MetricEvent>,
    pub total_events: u64,
    pub dropped_events: u64,
}

/// Broadcast-based collector retaining a bounded history of metrics.
pub struct TelemetryCollector {
    tx: broadcast::Sender<MetricEvent>,
    history: Mutex<VecDeque<MetricEvent>>,
    history_capacity: usize,
    total_events: AtomicU64,
    dropped_history: AtomicU64,
}

impl TelemetryCollector {
    pub fn new(buffer: usize, history_capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer.max(1));
        Self {
            tx,
            history: Mutex::new(VecDeque::with_capacity(history_capacity)),
            history_capacity: history_capacity.max(1),
            total_events: AtomicU64::new(0),
            dropped_history: AtomicU64::new(0),
        }
    }

    pub fn publish(&self, event: MetricEvent) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        {
            let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
            if history.len() == self.history_capacity {
                history.pop_front();
                self.dropped_history.fetch_add(1, Ordering::Relaxed);
            }
            history.push_back(event.clone());
        }

        // No subscribers is fine
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MetricEvent> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        TelemetrySnapshot {
            recent: history.iter().cloned().collect(),
            total_events: self.total_events.load(Ordering::Relaxed),
            dropped_events: self.dropped_history.load(Ordering::Relaxed),
        }
    }

    pub fn record_transition(&self, from: DetectionState, to: DetectionState) {
        self.publish(MetricEvent::StateTransition {
            from,
            to,
            timestamp_ms: now_timestamp_ms(),
        });
    }

    pub fn record_confirmation(&self, event: &DetectionEvent) {
        self.publish(MetricEvent::Confirmation {
            sustained_ms: event.sustained.as_millis() as u64,
            peak_energy: event.peak_energy,
            timestamp_ms: now_timestamp_ms(),
        });
    }

    pub fn record_skipped(&self, reason: SkipReason, code: i32) {
        self.publish(MetricEvent::FrameSkipped { reason, code });
    }

    pub fn record_notification_failure(&self, err: &NotifierError) {
        self.publish(MetricEvent::NotificationFailed {
            code: err.code(),
            message: err.message(),
        });
    }

    pub fn record_issued(&self, expires_in_seconds: u64) {
        self.publish(MetricEvent::CredentialIssued { expires_in_seconds });
    }

    pub fn record_rejected(&self, reason: CredentialError) {
        self.publish(MetricEvent::CredentialRejected { reason });
    }

    pub fn record_unlock(&self, angle: u16) {
        self.publish(MetricEvent::UnlockSucceeded {
            angle,
            timestamp_ms: now_timestamp_ms(),
        });
    }

    pub fn record_unlock_failure(&self, err: &ActuatorError) {
        self.publish(MetricEvent::UnlockFailed {
            code: err.code(),
            message: err.message(),
        });
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new(256, 64)
    }
}

fn now_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collector_preserves_order_within_history() {
        let collector = TelemetryCollector::new(8, 3);
        collector.record_issued(30);
        collector.record_rejected(CredentialError::Expired);
        collector.record_unlock(90);

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.recent.len(), 3);
        assert_eq!(
            snapshot.recent[0],
            MetricEvent::CredentialIssued {
                expires_in_seconds: 30
            }
        );
        assert!(matches!(
            snapshot.recent[2],
            MetricEvent::UnlockSucceeded { angle: 90, .. }
        ));
    }

    #[test]
    fn collector_drops_history_when_full() {
        let collector = TelemetryCollector::new(8, 2);
        collector.record_skipped(SkipReason::Capture, 1003);
        collector.record_skipped(SkipReason::Analysis, 1102);
        collector.record_skipped(SkipReason::Analysis, 1104);

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.recent.len(), 2);
        assert_eq!(snapshot.total_events, 3);
        assert_eq!(snapshot.dropped_events, 1);
        assert_eq!(
            snapshot.recent[0],
            MetricEvent::FrameSkipped {
                reason: SkipReason::Analysis,
                code: 1102
            }
        );
    }

    #[test]
    fn subscribers_receive_published_events() {
        let collector = TelemetryCollector::new(8, 8);
        let mut rx = collector.subscribe();

        collector.record_transition(DetectionState::Idle, DetectionState::Accumulating);

        assert!(matches!(
            rx.try_recv(),
            Ok(MetricEvent::StateTransition {
                from: DetectionState::Idle,
                to: DetectionState::Accumulating,
                ..
            })
        ));
    }

    #[test]
    fn events_serialize_tagged() {
        let json = serde_json::to_value(MetricEvent::CredentialRejected {
            reason: CredentialError::AlreadyConsumed,
        })
        .unwrap();
        assert_eq!(json["type"], "credential_rejected");
        assert_eq!(json["payload"]["reason"], "already_consumed");
    }
}
