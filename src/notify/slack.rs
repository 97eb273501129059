//! Slack Web API notifier.
//!
//! Text-only notifications go through `chat.postMessage`. With a snapshot the
//! external upload flow is used instead, and the text becomes the file's
//! initial comment:
//! 1. `files.getUploadURLExternal` reserves an upload URL
//! 2. the bytes are posted to that URL
//! 3. `files.completeUploadExternal` shares the file in the channel

use std::sync::OnceLock;
use std::time::Duration;

use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{compose, Notifier};
use crate::error::NotifierError;

const IMAGE_FILENAME: &str = "intercom_capture.jpg";
const IMAGE_TITLE: &str = "Intercom Detection";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackConfig {
    /// Bot token (xoxb-...), overridden by `SLACK_BOT_TOKEN`
    pub bot_token: String,
    /// Channel ID
    pub channel: String,
    pub api_base: String,
    pub timeout_secs: u64,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            channel: String::new(),
            api_base: "https://slack.com/api".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Envelope every Slack Web API method answers with
#[derive(Debug, Deserialize)]
struct SlackEnvelope<T> {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(flatten)]
    body: Option<T>,
}

#[derive(Debug, Deserialize)]
struct Empty {}

#[derive(Debug, Deserialize)]
struct UploadUrl {
    upload_url: String,
    file_id: String,
}

#[derive(Serialize)]
struct PostMessage<'a> {
    channel: &'a str,
    text: &'a str,
}

#[derive(Serialize)]
struct FileRef<'a> {
    id: &'a str,
    title: &'a str,
}

#[derive(Serialize)]
struct CompleteUpload<'a> {
    files: [FileRef<'a>; 1],
    channel_id: &'a str,
    initial_comment: &'a str,
}

pub struct SlackNotifier {
    config: SlackConfig,
    client: OnceLock<Client>,
}

impl SlackNotifier {
    pub fn new(config: SlackConfig) -> Self {
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

    fn method(&self, name: &str) -> String {
        format!("{}/{}", self.config.api_base, name)
    }

    fn post_message(&self, text: &str) -> Result<(), NotifierError> {
        let response = self
            .client()?
            .post(self.method("chat.postMessage"))
            .bearer_auth(&self.config.bot_token)
            .json(&PostMessage {
                channel: &self.config.channel,
                text,
            })
            .send()?;
        unwrap_envelope::<Empty>(response).map(|_| ())
    }

    fn upload_with_comment(&self, text: &str, image: &[u8]) -> Result<(), NotifierError> {
        let client = self.client()?;

        let length = image.len().to_string();
        let response = client
            .post(self.method("files.getUploadURLExternal"))
            .bearer_auth(&self.config.bot_token)
            .form(&[("filename", IMAGE_FILENAME), ("length", length.as_str())])
            .send()?;
        let reserved = unwrap_envelope::<UploadUrl>(response)?;

        let form = Form::new().part(
            "file",
            Part::bytes(image.to_vec()).file_name(IMAGE_FILENAME),
        );
        let upload = client.post(&reserved.upload_url).multipart(form).send()?;
        if !upload.status().is_success() {
            return Err(NotifierError::Rejected {
                status: Some(upload.status().as_u16()),
                details: "file upload failed".to_string(),
            });
        }

        let response = client
            .post(self.method("files.completeUploadExternal"))
            .bearer_auth(&self.config.bot_token)
            .json(&CompleteUpload {
                files: [FileRef {
                    id: &reserved.file_id,
                    title: IMAGE_TITLE,
                }],
                channel_id: &self.config.channel,
                initial_comment: text,
            })
            .send()?;
        unwrap_envelope::<Empty>(response).map(|_| ())
    }
}

fn unwrap_envelope<T: DeserializeOwned>(response: Response) -> Result<T, NotifierError> {
    let status = response.status();
    if !status.is_success() {
        return Err(NotifierError::Rejected {
            status: Some(status.as_u16()),
            details: status.canonical_reason().unwrap_or("").to_string(),
        });
    }
    let envelope: SlackEnvelope<T> = response.json()?;
    match envelope {
        SlackEnvelope {
            ok: true,
            body: Some(body),
            ..
        } => Ok(body),
        SlackEnvelope { error, .. } => Err(NotifierError::Rejected {
            status: None,
            details: error.unwrap_or_else(|| "malformed response".to_string()),
        }),
    }
}

impl Notifier for SlackNotifier {
    fn name(&self) -> &'static str {
        "slack"
    }

    fn send(
        &self,
        message: &str,
        unlock_url: &str,
        image: Option<&[u8]>,
    ) -> Result<(), NotifierError> {
        if self.config.bot_token.is_empty() || self.config.channel.is_empty() {
            return Err(NotifierError::NotConfigured { provider: "slack" });
        }

        let text = compose(message, unlock_url);
        match image {
            Some(image) if !image.is_empty() => self.upload_with_comment(&text, image)?,
            _ => self.post_message(&text)?,
        }
        tracing::info!("[Notifier] Slack message posted to {}", self.config.channel);
        Ok(())
    }
}
