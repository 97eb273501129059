//! Configuration loading and validation
//!
//! One JSON document with a section per subsystem. Every field has a default,
//! so a partial file (or no file at all) is valid. Secrets can be supplied
//! through the environment instead of the file.

use std::fs;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::actuator::{PwmConfig, ServoAngle};
use crate::credentials::CredentialConfig;
use crate::detection::DetectionConfig;
use crate::error::ConfigError;
use crate::notify::{NotifierConfig, SnapshotConfig};

pub const ENV_ADMIN_TOKEN: &str = "INTERCOM_ADMIN_TOKEN";
pub const ENV_LINE_TOKEN: &str = "LINE_CHANNEL_ACCESS_TOKEN";
pub const ENV_SLACK_TOKEN: &str = "SLACK_BOT_TOKEN";
pub const ENV_RESEND_API_KEY: &str = "RESEND_API_KEY";

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub detection: DetectionConfig,
    pub credentials: CredentialConfig,
    pub unlock: UnlockConfig,
    pub notifier: NotifierConfig,
    pub http: HttpConfig,
}

/// Where detection frames come from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AudioSource {
    /// Default input device
    #[default]
    Microphone,
    /// Replay a recording
    Wav {
        path: PathBuf,
        #[serde(default)]
        looping: bool,
    },
    /// Run without detection (HTTP unlock only)
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    /// Samples per analysis frame
    pub frame_len: usize,
    pub source: AudioSource,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            frame_len: 4410,
            source: AudioSource::Microphone,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActuatorConfig {
    /// Log and record moves instead of driving hardware
    #[default]
    Simulated,
    Pwm(PwmConfig),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnlockConfig {
    /// The only angle the gate will ever command
    pub angle: ServoAngle,
    pub actuator: ActuatorConfig,
}

impl Default for UnlockConfig {
    fn default() -> Self {
        Self {
            angle: ServoAngle::CENTER,
            actuator: ActuatorConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: SocketAddr,
    /// Externally reachable base URL used in notification links
    pub public_base_url: String,
    /// Required for `/generate-otp` and `/events`; overridden by
    /// `INTERCOM_ADMIN_TOKEN`. Those routes are refused when unset.
    pub admin_token: Option<String>,
    pub max_concurrent_requests: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 5000)),
            public_base_url: "http://localhost:5000".to_string(),
            admin_token: None,
            max_concurrent_requests: 64,
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file.
    ///
    /// # Errors
    /// * `ConfigError::ReadFailed` - the file could not be read
    /// * `ConfigError::ParseFailed` - the JSON is malformed or has wrong types
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let config = serde_json::from_str(&contents).map_err(|e| ConfigError::ParseFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        log::info!("[Config] Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Like `load_from_file`, but a missing file yields the defaults.
    /// A file that exists and is broken is still an error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        match fs::metadata(path.as_ref()) {
            Err(err) if err.kind() == ErrorKind::NotFound => {
                log::warn!(
                    "[Config] {:?} not found. Using defaults.",
                    path.as_ref()
                );
                Ok(Self::default())
            }
            _ => Self::load_from_file(path),
        }
    }

    /// Apply secrets from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply secrets from `lookup`; empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = get(ENV_ADMIN_TOKEN) {
            log::info!("[Config] Admin token taken from {}", ENV_ADMIN_TOKEN);
            self.http.admin_token = Some(token);
        }
        if let Some(token) = get(ENV_LINE_TOKEN) {
            log::info!("[Config] LINE token taken from {}", ENV_LINE_TOKEN);
            self.notifier
                .line
                .get_or_insert_with(Default::default)
                .channel_access_token = token;
        }
        if let Some(token) = get(ENV_SLACK_TOKEN) {
            match self.notifier.slack.as_mut() {
                Some(slack) => {
                    log::info!("[Config] Slack token taken from {}", ENV_SLACK_TOKEN);
                    slack.bot_token = token;
                }
                None => log::warn!(
                    "[Config] {} is set but no Slack channel is configured; ignoring",
                    ENV_SLACK_TOKEN
                ),
            }
        }
        if let Some(key) = get(ENV_RESEND_API_KEY) {
            match self.notifier.email.as_mut() {
                Some(email) => {
                    log::info!("[Config] Resend key taken from {}", ENV_RESEND_API_KEY);
                    email.api_key = key;
                }
                None => log::warn!(
                    "[Config] {} is set but no email recipients are configured; ignoring",
                    ENV_RESEND_API_KEY
                ),
            }
        }
    }

    /// Range checks that must pass before anything starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.audio.sample_rate == 0 {
            return Err(ConfigError::invalid("audio.sample_rate", "must be positive"));
        }
        if self.audio.frame_len < 64 {
            return Err(ConfigError::invalid(
                "audio.frame_len",
                format!("must be at least 64 samples (got {})", self.audio.frame_len),
            ));
        }
        self.detection.validate()?;
        self.credentials.validate()?;
        if let ActuatorConfig::Pwm(pwm) = &self.unlock.actuator {
            pwm.validate()?;
        }

        let base = &self.http.public_base_url;
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ConfigError::invalid(
                "http.public_base_url",
                format!("'{}' is not an http(s) URL", base),
            ));
        }
        if matches!(&self.http.admin_token, Some(t) if t.len() < 8) {
            return Err(ConfigError::invalid(
                "http.admin_token",
                "must be at least 8 characters",
            ));
        }
        if self.http.max_concurrent_requests == 0 {
            return Err(ConfigError::invalid(
                "http.max_concurrent_requests",
                "must be positive",
            ));
        }
        if let Some(slack) = &self.notifier.slack {
            if slack.channel.is_empty() {
                return Err(ConfigError::invalid(
                    "notifier.slack.channel",
                    "a channel ID is required",
                ));
            }
        }
        if let SnapshotConfig::Command {
            program,
            timeout_ms,
            ..
        } = &self.notifier.snapshot
        {
            if program.trim().is_empty() || *timeout_ms == 0 {
                return Err(ConfigError::invalid(
                    "notifier.snapshot",
                    "a capture program and a positive timeout_ms are required",
                ));
            }
        }
        if let Some(email) = &self.notifier.email {
            if email.from.is_empty() || email.to.is_empty() {
                return Err(ConfigError::invalid(
                    "notifier.email",
                    "a sender and at least one recipient are required",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::MatchPolicy;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.audio.sample_rate, 44_100);
        assert_eq!(config.audio.frame_len, 4410);
        assert_eq!(config.detection.tones.len(), 2);
        assert_eq!(config.detection.policy, MatchPolicy::All);
        assert!((config.detection.threshold.level() - 0.2).abs() < 1e-6);
        assert_eq!(config.credentials.validity_secs, 30);
        assert_eq!(config.unlock.angle.degrees(), 90);
        assert_eq!(config.http.bind.port(), 5000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json_roundtrip() {
        let config = AppConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let parsed: AppConfig = serde_json::from_str(
            r#"{
                "detection": { "sustain_secs": 2.0, "policy": "any",
                               "quiet_windows": [{"start": "22:00", "end": "08:00"}] },
                "unlock": { "angle": 120, "actuator": { "kind": "pwm", "chip": 1 } }
            }"#,
        )
        .unwrap();

        assert_eq!(parsed.detection.sustain_secs, 2.0);
        assert_eq!(parsed.detection.policy, MatchPolicy::Any);
        assert_eq!(parsed.detection.quiet_windows.len(), 1);
        assert_eq!(parsed.detection.cooldown_secs, 10.0);
        assert_eq!(parsed.unlock.angle.degrees(), 120);
        assert!(matches!(
            parsed.unlock.actuator,
            ActuatorConfig::Pwm(PwmConfig { chip: 1, channel: 0, .. })
        ));
        assert_eq!(parsed.audio, AudioConfig::default());
    }

    #[test]
    fn test_out_of_range_angle_rejected_at_parse() {
        assert!(serde_json::from_str::<AppConfig>(r#"{"unlock": {"angle": 200}}"#).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_ADMIN_TOKEN, "s3cret-admin"),
            (ENV_LINE_TOKEN, "line-token"),
            (ENV_SLACK_TOKEN, " "),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.http.admin_token.as_deref(), Some("s3cret-admin"));
        assert_eq!(
            config.notifier.line.as_ref().unwrap().channel_access_token,
            "line-token"
        );
        assert!(config.notifier.slack.is_none());
    }

    #[test]
    fn test_snapshot_section() {
        let parsed: AppConfig = serde_json::from_str(
            r#"{"notifier": {"snapshot": {"kind": "file", "path": "/run/door.jpg"}}}"#,
        )
        .unwrap();
        assert_eq!(
            parsed.notifier.snapshot,
            SnapshotConfig::File {
                path: "/run/door.jpg".into()
            }
        );
        assert!(parsed.validate().is_ok());

        let mut config = AppConfig::default();
        config.notifier.snapshot = SnapshotConfig::Command {
            program: " ".to_string(),
            args: Vec::new(),
            timeout_ms: 1000,
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "notifier.snapshot",
                ..
            })
        ));
    }

    #[test]
    fn test_resend_key_fills_configured_email() {
        let mut config = AppConfig::default();
        config.notifier.email = Some(crate::notify::EmailConfig {
            from: "door@example.com".to_string(),
            to: vec!["me@example.com".to_string()],
            ..Default::default()
        });
        config.apply_overrides(|k| (k == ENV_RESEND_API_KEY).then(|| "re_live".to_string()));

        assert_eq!(config.notifier.email.as_ref().unwrap().api_key, "re_live");
        assert!(config.validate().is_ok());

        config.notifier.email.as_mut().unwrap().to.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "notifier.email",
                ..
            })
        ));
    }

    #[test]
    fn test_validation_failures() {
        let mut config = AppConfig::default();
        config.http.public_base_url = "door.example".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "http.public_base_url",
                ..
            })
        ));

        let mut config = AppConfig::default();
        config.http.admin_token = Some("short".to_string());
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.audio.frame_len = 16;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.unlock.actuator = ActuatorConfig::Pwm(PwmConfig {
            frequency_hz: 500,
            ..PwmConfig::default()
        });
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "unlock.actuator.frequency_hz",
                ..
            })
        ));
    }
}
