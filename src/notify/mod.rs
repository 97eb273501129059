// Notify module - outbound "someone is at the door" messages
//
// Providers implement `Notifier`. Sends are blocking and happen on the
// dispatcher thread, never on the detection worker or the async runtime.

pub mod dispatch;
pub mod email;
pub mod line;
pub mod slack;
pub mod snapshot;

pub use dispatch::{
    DeliveryStats, Notification, NotificationDispatcher, NotificationQueue, DEFAULT_QUEUE_DEPTH,
};
pub use email::{EmailConfig, EmailNotifier};
pub use line::{LineConfig, LineNotifier};
pub use slack::{SlackConfig, SlackNotifier};
pub use snapshot::{CommandSnapshot, FileSnapshot, ImageSource, SnapshotConfig};

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{log_notifier_error, NotifierError};

pub trait Notifier: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &'static str;

    /// Deliver `message` with the one-time unlock link, plus an optional
    /// JPEG/PNG snapshot.
    fn send(
        &self,
        message: &str,
        unlock_url: &str,
        image: Option<&[u8]>,
    ) -> Result<(), NotifierError>;
}

/// Text body shared by the text-only providers
pub fn compose(message: &str, unlock_url: &str) -> String {
    format!("{}\n\nUnlock: {}", message, unlock_url)
}

/// Writes notifications to the log only
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    fn send(
        &self,
        message: &str,
        unlock_url: &str,
        image: Option<&[u8]>,
    ) -> Result<(), NotifierError> {
        tracing::info!(
            "[Notifier] {} -> {} (image: {} bytes)",
            message,
            unlock_url,
            image.map_or(0, <[u8]>::len)
        );
        Ok(())
    }
}

/// Sends to every provider. All providers are attempted; the first error is
/// returned afterwards.
pub struct FanoutNotifier {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new(notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        Self { notifiers }
    }

    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }
}

impl Notifier for FanoutNotifier {
    fn name(&self) -> &'static str {
        "fanout"
    }

    fn send(
        &self,
        message: &str,
        unlock_url: &str,
        image: Option<&[u8]>,
    ) -> Result<(), NotifierError> {
        let mut first_error = None;
        for notifier in &self.notifiers {
            if let Err(err) = notifier.send(message, unlock_url, image) {
                log_notifier_error(&err, notifier.name());
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Headline of every notification
    pub message: String,
    pub line: Option<LineConfig>,
    pub slack: Option<SlackConfig>,
    pub email: Option<EmailConfig>,
    /// Door camera image attached where the provider supports it
    pub snapshot: SnapshotConfig,
    /// Also (or only) log notifications
    pub log: bool,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            message: "Intercom rang just now".to_string(),
            line: None,
            slack: None,
            email: None,
            snapshot: SnapshotConfig::Disabled,
            log: true,
        }
    }
}

impl NotifierConfig {
    /// Build the configured providers behind one fan-out.
    ///
    /// Falls back to logging when nothing else is configured so a detection
    /// is never silently dropped.
    pub fn build(&self) -> FanoutNotifier {
        let mut notifiers: Vec<Arc<dyn Notifier>> = Vec::new();
        if let Some(line) = &self.line {
            notifiers.push(Arc::new(LineNotifier::new(line.clone())));
        }
        if let Some(slack) = &self.slack {
            notifiers.push(Arc::new(SlackNotifier::new(slack.clone())));
        }
        if let Some(email) = &self.email {
            notifiers.push(Arc::new(EmailNotifier::new(email.clone())));
        }
        if self.log || notifiers.is_empty() {
            notifiers.push(Arc::new(LogNotifier));
        }
        FanoutNotifier::new(notifiers)
    }
}
