//! Email through the Resend HTTP API.
//!
//! One plain-text message per detection, addressed to every configured
//! recipient. Snapshots are not attached.

use std::sync::OnceLock;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use super::{compose, Notifier};
use crate::error::NotifierError;

pub const EMAIL_SUBJECT: &str = "Sound Detection Alert";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    /// Overridden by `RESEND_API_KEY`
    pub api_key: String,
    /// Sender, e.g. `Intercom <door@example.com>`
    pub from: String,
    pub to: Vec<String>,
    pub api_base: String,
    pub timeout_secs: u64,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            from: String::new(),
            to: Vec::new(),
            api_base: "https://api.resend.com".to_string(),
            timeout_secs: 10,
        }
    }
}

pub struct EmailNotifier {
    config: EmailConfig,
    client: OnceLock<Client>,
}

impl EmailNotifier {
    pub fn new(config: EmailConfig) -> Self {
        Self {
            config,
            client: OnceLock::new(),
        }
    }

    fn client(&self) -> Result<&Client, NotifierError> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .build()?;
        Ok(self.client.get_or_init(|| client))
    }
}

#[derive(Serialize)]
struct SendEmail<'a> {
    from: &'a str,
    to: &'a [String],
    subject: &'a str,
    text: &'a str,
}

#[derive(Deserialize, Default)]
struct ResendErrorBody {
    #[serde(default)]
    message: String,
}

impl Notifier for EmailNotifier {
    fn name(&self) -> &'static str {
        "email"
    }

    fn send(
        &self,
        message: &str,
        unlock_url: &str,
        image: Option<&[u8]>,
    ) -> Result<(), NotifierError> {
        if self.config.api_key.is_empty() || self.config.to.is_empty() {
            return Err(NotifierError::NotConfigured { provider: "email" });
        }
        if image.is_some() {
            tracing::debug!("[Notifier] Email is sent without the snapshot");
        }

        let text = compose(message, unlock_url);
        let response = self
            .client()?
            .post(format!("{}/emails", self.config.api_base))
            .bearer_auth(&self.config.api_key)
            .json(&SendEmail {
                from: &self.config.from,
                to: &self.config.to,
                subject: EMAIL_SUBJECT,
                text: &text,
            })
            .send()?;

        let status = response.status();
        if status.is_success() {
            tracing::info!(
                "[Notifier] Email sent to {} recipient(s)",
                self.config.to.len()
            );
            return Ok(());
        }

        let details = response
            .json::<ResendErrorBody>()
            .map(|b| b.message)
            .unwrap_or_default();
        Err(NotifierError::Rejected {
            status: Some(status.as_u16()),
            details,
        })
    }
}
