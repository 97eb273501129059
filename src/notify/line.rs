//! LINE Messaging API broadcast.
//!
//! Sends a text message to every friend of the bot. LINE only accepts
//! images by public URL, so snapshots are not attached here.

use std::sync::OnceLock;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use super::{compose, Notifier};
use crate::error::NotifierError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineConfig {
    /// Overridden by `LINE_CHANNEL_ACCESS_TOKEN`
    pub channel_access_token: String,
    pub api_base: String,
    pub timeout_secs: u64,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            channel_access_token: String::new(),
            api_base: "https://api.line.me/v2/bot".to_string(),
            timeout_secs: 10,
        }
    }
}

pub struct LineNotifier {
    config: LineConfig,
    // Built on first use so it is created on the worker thread
    client: OnceLock<Client>,
}

impl LineNotifier {
    pub fn new(config: LineConfig) -> Self {
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
struct TextMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

#[derive(Serialize)]
struct Broadcast<'a> {
    messages: [TextMessage<'a>; 1],
}

#[derive(Deserialize, Default)]
struct LineErrorBody {
    #[serde(default)]
    message: String,
}

impl Notifier for LineNotifier {
    fn name(&self) -> &'static str {
        "line"
    }

    fn send(
        &self,
        message: &str,
        unlock_url: &str,
        image: Option<&[u8]>,
    ) -> Result<(), NotifierError> {
        if self.config.channel_access_token.is_empty() {
            return Err(NotifierError::NotConfigured { provider: "line" });
        }
        if image.is_some() {
            tracing::debug!("[Notifier] LINE broadcast does not carry inline images");
        }

        let text = compose(message, unlock_url);
        let body = Broadcast {
            messages: [TextMessage {
                kind: "text",
                text: &text,
            }],
        };

        let response = self
            .client()?
            .post(format!("{}/message/broadcast", self.config.api_base))
            .bearer_auth(&self.config.channel_access_token)
            .json(&body)
            .send()?;

        let status = response.status();
        if status.is_success() {
            tracing::info!("[Notifier] LINE broadcast sent");
            return Ok(());
        }

        let details = response
            .json::<LineErrorBody>()
            .map(|b| b.message)
            .unwrap_or_default();
        Err(NotifierError::Rejected {
            status: Some(status.as_u16()),
            details,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};

    /// Serve `router` on a background thread; returns its base URL.
    fn serve(router: Router) -> String {
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
                tx.send(listener.local_addr().unwrap()).unwrap();
                axum::serve(listener, router).await.unwrap();
            });
        });
        format!("http://{}", rx.recv().unwrap())
    }

    #[test]
    fn test_broadcast_payload_and_auth() {
        let (seen_tx, seen_rx) = mpsc::channel();
        let router = Router::new().route(
            "/message/broadcast",
            post(move |headers: HeaderMap, Json(body): Json<serde_json::Value>| {
                let seen_tx = seen_tx.clone();
                async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    seen_tx.send((auth, body)).unwrap();
                    Json(serde_json::json!({}))
                }
            }),
        );
        let base = serve(router);

        let notifier = LineNotifier::new(LineConfig {
            channel_access_token: "secret".to_string(),
            api_base: base,
            timeout_secs: 5,
        });
        notifier
            .send("Intercom rang just now", "http://door/unlock?otp=123456", None)
            .unwrap();

        let (auth, body) = seen_rx.recv().unwrap();
        assert_eq!(auth, "Bearer secret");
        assert_eq!(body["messages"][0]["type"], "text");
        assert!(body["messages"][0]["text"]
            .as_str()
            .unwrap()
            .ends_with("otp=123456"));
    }

    #[test]
    fn test_rejection_carries_status() {
        let router = Router::new().route(
            "/message/broadcast",
            post(|| async {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(serde_json::json!({"message": "Authentication failed"})),
                )
            }),
        );
        let notifier = LineNotifier::new(LineConfig {
            channel_access_token: "bad".to_string(),
            api_base: serve(router),
            timeout_secs: 5,
        });

        assert_eq!(
            notifier.send("m", "u", None),
            Err(NotifierError::Rejected {
                status: Some(401),
                details: "Authentication failed".to_string()
            })
        );
    }

    #[test]
    fn test_missing_token() {
        let notifier = LineNotifier::new(LineConfig::default());
        assert_eq!(
            notifier.send("m", "u", None),
            Err(NotifierError::NotConfigured { provider: "line" })
        );
    }
}
