// DetectionLoop - dedicated worker thread driving capture → analysis → state machine
//
// Each cycle:
// 1. Check the running flag
// 2. Pull one frame from the FrameSource (bounded by about one cadence)
// 3. Analyze it; a capture or analysis failure becomes a no-signal frame
// 4. Advance the state machine
// 5. On confirmation: issue a credential and queue exactly one notification
//
// The worker is the only owner of the state machine. Everything the rest of
// the process may look at is published through `LoopShared`. Delivery runs on
// the notifier thread, so the only blocking call in the cycle is step 2.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::{DetectionConfig, DetectionEvent, DetectionState, DetectionStateMachine, Tick};
use crate::analysis::FrequencyAnalyzer;
use crate::audio::{frame_duration, FrameSource};
use crate::clock::Clock;
use crate::credentials::CredentialAuthority;
use crate::error::{log_audio_error, AudioError, ErrorCode};
use crate::notify::{
    DeliveryStats, ImageSource, Notification, NotificationDispatcher, NotificationQueue,
    Notifier, DEFAULT_QUEUE_DEPTH,
};
use crate::telemetry::{SkipReason, TelemetryCollector};

/// Consecutive capture faults before the worker starts backing off
const FAULT_BACKOFF_AFTER: u32 = 5;

/// Log one line per this many consecutive faults
const FAULT_LOG_EVERY: u32 = 50;

/// Loop-level settings that are not detection tuning
#[derive(Debug, Clone, PartialEq)]
pub struct LoopSettings {
    /// Base of the link sent to residents, e.g. `https://door.example`
    pub public_base_url: String,
    /// Headline of the notification
    pub message: String,
    /// Sleep between frames once capture keeps failing
    pub fault_backoff: Duration,
    /// Notifications that may wait for delivery before new ones are dropped
    pub notify_queue_depth: usize,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            public_base_url: "http://localhost:5000".to_string(),
            message: "Intercom rang just now".to_string(),
            fault_backoff: Duration::from_millis(500),
            notify_queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

/// Build the one-time link for `code`.
pub fn unlock_url(public_base_url: &str, code: &str) -> String {
    format!("{}/unlock?otp={}", public_base_url.trim_end_matches('/'), code)
}

/// Health view of the worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopStatus {
    pub running: bool,
    pub state: DetectionState,
    pub frames_processed: u64,
    pub frames_skipped: u64,
    pub confirmations: u64,
    pub notifications_sent: u64,
    pub notification_failures: u64,
    /// Dropped because the delivery queue was full
    pub notifications_dropped: u64,
    /// Milliseconds since the last completed cycle
    pub heartbeat_age_ms: Option<u64>,
    pub last_confirmed: Option<NaiveDateTime>,
}

impl LoopStatus {
    /// Status reported when detection is disabled or never started.
    pub fn stopped() -> Self {
        Self {
            running: false,
            state: DetectionState::Idle,
            frames_processed: 0,
            frames_skipped: 0,
            confirmations: 0,
            notifications_sent: 0,
            notification_failures: 0,
            notifications_dropped: 0,
            heartbeat_age_ms: None,
            last_confirmed: None,
        }
    }
}

struct Published {
    state: DetectionState,
    heartbeat: Option<Instant>,
    last_confirmed: Option<NaiveDateTime>,
}

/// State shared between the worker and its handle
struct LoopShared {
    running: AtomicBool,
    frames_processed: AtomicU64,
    frames_skipped: AtomicU64,
    confirmations: AtomicU64,
    delivery: Arc<DeliveryStats>,
    published: Mutex<Published>,
}

impl LoopShared {
    fn new(delivery: Arc<DeliveryStats>) -> Self {
        Self {
            running: AtomicBool::new(true),
            frames_processed: AtomicU64::new(0),
            frames_skipped: AtomicU64::new(0),
            confirmations: AtomicU64::new(0),
            delivery,
            published: Mutex::new(Published {
                state: DetectionState::Idle,
                heartbeat: None,
                last_confirmed: None,
            }),
        }
    }

    fn status(&self) -> LoopStatus {
        let published = self.published.lock().unwrap_or_else(|e| e.into_inner());
        LoopStatus {
            running: self.running.load(Ordering::Acquire),
            state: published.state,
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            frames_skipped: self.frames_skipped.load(Ordering::Relaxed),
            confirmations: self.confirmations.load(Ordering::Relaxed),
            notifications_sent: self.delivery.sent(),
            notification_failures: self.delivery.failed(),
            notifications_dropped: self.delivery.dropped(),
            heartbeat_age_ms: published
                .heartbeat
                .map(|t| t.elapsed().as_millis() as u64),
            last_confirmed: published.last_confirmed,
        }
    }

    fn publish(&self, machine: &DetectionStateMachine) {
        let snapshot = machine.snapshot();
        let mut published = self.published.lock().unwrap_or_else(|e| e.into_inner());
        published.state = snapshot.state;
        published.last_confirmed = snapshot.last_confirmed;
        published.heartbeat = Some(Instant::now());
    }
}

/// Worker configuration and collaborators, moved onto the worker thread by
/// `spawn`.
pub struct DetectionLoop {
    analyzer: FrequencyAnalyzer,
    machine: DetectionStateMachine,
    authority: Arc<CredentialAuthority>,
    notifier: Arc<dyn Notifier>,
    snapshot: Option<Arc<dyn ImageSource>>,
    clock: Arc<dyn Clock>,
    telemetry: Arc<TelemetryCollector>,
    settings: LoopSettings,
}

impl DetectionLoop {
    pub fn new(
        analyzer: FrequencyAnalyzer,
        detection: DetectionConfig,
        authority: Arc<CredentialAuthority>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        telemetry: Arc<TelemetryCollector>,
        settings: LoopSettings,
    ) -> Self {
        let frame = frame_duration(analyzer.frame_len(), analyzer.sample_rate());
        Self {
            machine: DetectionStateMachine::new(detection, frame),
            analyzer,
            authority,
            notifier,
            snapshot: None,
            clock,
            telemetry,
            settings,
        }
    }

    /// Attach a door camera image to every notification.
    pub fn with_snapshot(mut self, snapshot: Arc<dyn ImageSource>) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    /// Start the worker.
    ///
    /// `make_source` runs on the worker thread, so sources that must stay
    /// on one thread (live capture streams) work. This call returns once the
    /// source is open, or with the error that prevented opening it.
    pub fn spawn<S, F>(self, make_source: F) -> Result<DetectionLoopHandle, AudioError>
    where
        S: FrameSource + 'static,
        F: FnOnce() -> Result<S, AudioError> + Send + 'static,
    {
        let (queue, dispatcher) = NotificationDispatcher::spawn(
            Arc::clone(&self.notifier),
            self.snapshot.clone(),
            Arc::clone(&self.telemetry),
            self.settings.notify_queue_depth,
        )?;
        let shared = Arc::new(LoopShared::new(dispatcher.stats()));
        let worker_shared = Arc::clone(&shared);
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), AudioError>>();

        let thread = thread::Builder::new()
            .name("intercom-detection".to_string())
            .spawn(move || {
                let source = match make_source().and_then(|s| self.check_source(s)) {
                    Ok(source) => {
                        let _ = ready_tx.send(Ok(()));
                        source
                    }
                    Err(err) => {
                        worker_shared.running.store(false, Ordering::Release);
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                self.run(source, &worker_shared, &queue);
            })?;

        let ready = ready_rx.recv().unwrap_or_else(|_| {
            Err(AudioError::StreamOpenFailed {
                reason: "detection worker exited before opening its source".to_string(),
            })
        });

        match ready {
            Ok(()) => Ok(DetectionLoopHandle {
                shared,
                thread: Some(thread),
                dispatcher: Some(dispatcher),
            }),
            Err(err) => {
                let _ = thread.join();
                dispatcher.join();
                Err(err)
            }
        }
    }

    fn check_source<S: FrameSource>(&self, source: S) -> Result<S, AudioError> {
        if source.sample_rate() != self.analyzer.sample_rate()
            || source.frame_len() != self.analyzer.frame_len()
        {
            return Err(AudioError::UnsupportedFormat {
                details: format!(
                    "source delivers {} samples at {} Hz, analyzer expects {} at {} Hz",
                    source.frame_len(),
                    source.sample_rate(),
                    self.analyzer.frame_len(),
                    self.analyzer.sample_rate()
                ),
            });
        }
        Ok(source)
    }

    fn run<S: FrameSource>(
        mut self,
        mut source: S,
        shared: &LoopShared,
        queue: &NotificationQueue,
    ) {
        tracing::info!(
            "[DetectionLoop] Started: {} Hz, frame {} ({:?}), threshold {:.3}",
            self.analyzer.sample_rate(),
            self.analyzer.frame_len(),
            frame_duration(self.analyzer.frame_len(), self.analyzer.sample_rate()),
            self.machine.config().threshold.level()
        );

        let mut consecutive_faults: u32 = 0;

        while shared.running.load(Ordering::Acquire) {
            let report = match source.next_frame() {
                Ok(frame) => {
                    consecutive_faults = 0;
                    match self.analyzer.analyze(&frame) {
                        Ok(report) => Some(report),
                        Err(err) => {
                            tracing::warn!("[DetectionLoop] Skipping frame: {}", err);
                            shared.frames_skipped.fetch_add(1, Ordering::Relaxed);
                            self.telemetry
                                .record_skipped(SkipReason::Analysis, err.code());
                            None
                        }
                    }
                }
                Err(AudioError::EndOfStream) => {
                    tracing::info!("[DetectionLoop] Source exhausted, stopping");
                    break;
                }
                Err(err) => {
                    consecutive_faults = consecutive_faults.saturating_add(1);
                    if consecutive_faults == 1 || consecutive_faults % FAULT_LOG_EVERY == 0 {
                        log_audio_error(&err, "DetectionLoop::next_frame");
                    }
                    shared.frames_skipped.fetch_add(1, Ordering::Relaxed);
                    self.telemetry.record_skipped(SkipReason::Capture, err.code());
                    if consecutive_faults >= FAULT_BACKOFF_AFTER {
                        thread::sleep(self.settings.fault_backoff);
                    }
                    None
                }
            };

            let before = self.machine.state();
            let tick = Tick::from_clock(self.clock.as_ref());
            let event = self.machine.advance(report.as_ref(), tick);
            let after = self.machine.state();

            shared.frames_processed.fetch_add(1, Ordering::Relaxed);
            if let Some(event) = &event {
                self.telemetry.record_transition(before, DetectionState::Confirmed);
                self.telemetry
                    .record_transition(DetectionState::Confirmed, after);
                shared.confirmations.fetch_add(1, Ordering::Relaxed);
                shared.publish(&self.machine);
                self.on_confirmed(event, queue);
            } else {
                if before != after {
                    self.telemetry.record_transition(before, after);
                }
                shared.publish(&self.machine);
            }
        }

        shared.running.store(false, Ordering::Release);
        tracing::info!("[DetectionLoop] Stopped");
    }

    fn on_confirmed(&self, event: &DetectionEvent, queue: &NotificationQueue) {
        self.telemetry.record_confirmation(event);

        let credential = self.authority.issue();
        self.telemetry
            .record_issued(self.authority.validity().as_secs());

        let queued = queue.submit(Notification {
            message: self.settings.message.clone(),
            unlock_url: unlock_url(&self.settings.public_base_url, &credential.code),
        });
        if queued {
            tracing::info!(
                "[DetectionLoop] Chime confirmed at {}, notification queued",
                event.wall
            );
        }
    }
}

/// Read-only status view that can be cloned into other tasks
#[derive(Clone)]
pub struct StatusProbe {
    shared: Arc<LoopShared>,
}

impl StatusProbe {
    pub fn status(&self) -> LoopStatus {
        self.shared.status()
    }
}

/// Owner's view of a running worker. Dropping it stops the worker.
pub struct DetectionLoopHandle {
    shared: Arc<LoopShared>,
    thread: Option<JoinHandle<()>>,
    dispatcher: Option<NotificationDispatcher>,
}

impl DetectionLoopHandle {
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn status(&self) -> LoopStatus {
        self.shared.status()
    }

    pub fn probe(&self) -> StatusProbe {
        StatusProbe {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Ask the worker to stop and wait for it. Takes effect within one
    /// frame-acquisition cycle. Notifications already queued keep draining
    /// on the notifier thread; `join` waits for them.
    pub fn stop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        self.join_thread();
    }

    /// Wait for the worker to end on its own (finite sources), then for
    /// every queued notification.
    pub fn join(mut self) -> LoopStatus {
        self.join_thread();
        if let Some(dispatcher) = self.dispatcher.take() {
            dispatcher.join();
        }
        self.status()
    }

    fn join_thread(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("[DetectionLoop] Worker thread panicked");
                self.shared.running.store(false, Ordering::Release);
            }
        }
    }
}

impl Drop for DetectionLoopHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlock_url_trims_trailing_slash() {
        assert_eq!(
            unlock_url("https://door.example/", "123456"),
            "https://door.example/unlock?otp=123456"
        );
        assert_eq!(
            unlock_url("http://10.0.0.2:5000", "000001"),
            "http://10.0.0.2:5000/unlock?otp=000001"
        );
    }

    #[test]
    fn test_stopped_status() {
        let status = LoopStatus::stopped();
        assert!(!status.running);
        assert_eq!(status.state, DetectionState::Idle);
    }
}
