// NotificationDispatcher - delivers notifications off the detection thread
//
// The detection worker hands each notification to a bounded queue and never
// waits on it. A dedicated thread drains the queue: it takes the snapshot (if
// any), calls the notifier, and counts the outcome. A full queue drops the
// new notification. The thread exits once every queue handle is gone.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::{ImageSource, Notifier};
use crate::error::{log_notifier_error, log_snapshot_error, NotifierError};
use crate::telemetry::TelemetryCollector;

/// Notifications that may wait behind the one being delivered
pub const DEFAULT_QUEUE_DEPTH: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub message: String,
    pub unlock_url: String,
}

/// Delivery outcome counters
#[derive(Debug, Default)]
pub struct DeliveryStats {
    sent: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

impl DeliveryStats {
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Producer side, owned by the detection worker
pub struct NotificationQueue {
    tx: SyncSender<Notification>,
    capacity: usize,
    stats: Arc<DeliveryStats>,
    telemetry: Arc<TelemetryCollector>,
}

impl NotificationQueue {
    /// Queue `notification` without blocking. Returns `false` if it was
    /// dropped.
    pub fn submit(&self, notification: Notification) -> bool {
        match self.tx.try_send(notification) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let err = NotifierError::QueueFull {
                    capacity: self.capacity,
                };
                log_notifier_error(&err, "dispatcher");
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                self.telemetry.record_notification_failure(&err);
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::error!("[Notifier] Dispatcher thread is gone, notification lost");
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }
}

/// Consumer side: the delivery thread
pub struct NotificationDispatcher {
    thread: Option<JoinHandle<()>>,
    stats: Arc<DeliveryStats>,
}

impl NotificationDispatcher {
    /// Start the delivery thread.
    ///
    /// `capacity` is the number of notifications that may wait while one is
    /// in flight; zero means nothing waits.
    pub fn spawn(
        notifier: Arc<dyn Notifier>,
        snapshot: Option<Arc<dyn ImageSource>>,
        telemetry: Arc<TelemetryCollector>,
        capacity: usize,
    ) -> io::Result<(NotificationQueue, Self)> {
        let (tx, rx) = mpsc::sync_channel(capacity);
        let stats = Arc::new(DeliveryStats::default());

        let delivery = Delivery {
            notifier,
            snapshot,
            telemetry: Arc::clone(&telemetry),
            stats: Arc::clone(&stats),
        };
        let thread = thread::Builder::new()
            .name("intercom-notify".to_string())
            .spawn(move || delivery.run(rx))?;

        let queue = NotificationQueue {
            tx,
            capacity,
            stats: Arc::clone(&stats),
            telemetry,
        };
        Ok((
            queue,
            Self {
                thread: Some(thread),
                stats,
            },
        ))
    }

    pub fn stats(&self) -> Arc<DeliveryStats> {
        Arc::clone(&self.stats)
    }

    /// Wait until everything queued has been delivered. Returns only after
    /// the matching `NotificationQueue` is dropped.
    ///
    /// Dropping the dispatcher instead leaves the thread draining in the
    /// background.
    pub fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("[Notifier] Dispatcher thread panicked");
            }
        }
    }
}

struct Delivery {
    notifier: Arc<dyn Notifier>,
    snapshot: Option<Arc<dyn ImageSource>>,
    telemetry: Arc<TelemetryCollector>,
    stats: Arc<DeliveryStats>,
}

impl Delivery {
    fn run(self, rx: Receiver<Notification>) {
        for notification in rx {
            self.deliver(&notification);
        }
        tracing::debug!("[Notifier] Dispatcher drained, exiting");
    }

    fn snapshot(&self) -> Option<Vec<u8>> {
        let source = self.snapshot.as_ref()?;
        match source.capture() {
            Ok(image) => Some(image),
            Err(err) => {
                log_snapshot_error(&err, source.name());
                None
            }
        }
    }

    fn deliver(&self, notification: &Notification) {
        let image = self.snapshot();
        match self.notifier.send(
            &notification.message,
            &notification.unlock_url,
            image.as_deref(),
        ) {
            Ok(()) => {
                self.stats.sent.fetch_add(1, Ordering::Relaxed);
                tracing::info!(
                    "[Notifier] Delivered via {} (image: {})",
                    self.notifier.name(),
                    image.as_ref().map_or(0, Vec::len)
                );
            }
            Err(err) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                log_notifier_error(&err, self.notifier.name());
                self.telemetry.record_notification_failure(&err);
            }
        }
    }
}
