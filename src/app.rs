// App: owns every long-lived component and wires them together
//
// Construction order follows the data flow: clock and telemetry first, then
// the credential authority that both the detection loop and the unlock gate
// share, then the collaborators chosen by configuration.

use std::sync::Arc;

use anyhow::Context;

use crate::actuator::{Actuator, ServoController, SimulatedActuator};
use crate::analysis::FrequencyAnalyzer;
use crate::audio::WavSource;
use crate::clock::{Clock, SystemClock};
use crate::config::{ActuatorConfig, AppConfig, AudioSource};
use crate::credentials::CredentialAuthority;
use crate::detection::{DetectionLoop, DetectionLoopHandle, LoopSettings, StatusProbe};
use crate::error::ConfigError;
use crate::http::{run_http_server, AppState};
use crate::notify::Notifier;
use crate::telemetry::TelemetryCollector;
use crate::unlock::UnlockGate;

/// Build the latch driver selected by configuration.
pub fn build_actuator(config: &ActuatorConfig) -> Arc<dyn Actuator> {
    match config {
        ActuatorConfig::Simulated => {
            tracing::warn!("[App] Using simulated actuator; the door will not move");
            Arc::new(SimulatedActuator::new())
        }
        ActuatorConfig::Pwm(pwm) => Arc::new(ServoController::new(pwm.clone())),
    }
}

pub struct App {
    config: AppConfig,
    clock: Arc<dyn Clock>,
    telemetry: Arc<TelemetryCollector>,
    authority: Arc<CredentialAuthority>,
    gate: Arc<UnlockGate>,
    notifier: Arc<dyn Notifier>,
}

impl App {
    /// Build the application from a validated configuration with real
    /// collaborators.
    pub fn new(config: AppConfig) -> Result<Self, ConfigError> {
        let actuator = build_actuator(&config.unlock.actuator);
        let notifier: Arc<dyn Notifier> = Arc::new(config.notifier.build());
        Self::with_parts(config, Arc::new(SystemClock::default()), actuator, notifier)
    }

    /// Build with injected collaborators.
    pub fn with_parts(
        config: AppConfig,
        clock: Arc<dyn Clock>,
        actuator: Arc<dyn Actuator>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let telemetry = Arc::new(TelemetryCollector::default());
        let authority = Arc::new(CredentialAuthority::new(
            config.credentials.clone(),
            Arc::clone(&clock),
        ));
        let gate = Arc::new(UnlockGate::new(
            Arc::clone(&authority),
            actuator,
            config.unlock.angle,
            Arc::clone(&clock),
            Arc::clone(&telemetry),
        ));

        Ok(Self {
            config,
            clock,
            telemetry,
            authority,
            gate,
            notifier,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn authority(&self) -> &Arc<CredentialAuthority> {
        &self.authority
    }

    pub fn gate(&self) -> &Arc<UnlockGate> {
        &self.gate
    }

    pub fn telemetry(&self) -> &Arc<TelemetryCollector> {
        &self.telemetry
    }

    fn detection_loop(&self) -> Result<DetectionLoop, ConfigError> {
        let audio = &self.config.audio;
        let analyzer = FrequencyAnalyzer::new(
            audio.sample_rate,
            audio.frame_len,
            self.config.detection.tones.clone(),
        )?;

        let detection = DetectionLoop::new(
            analyzer,
            self.config.detection.clone(),
            Arc::clone(&self.authority),
            Arc::clone(&self.notifier),
            Arc::clone(&self.clock),
            Arc::clone(&self.telemetry),
            LoopSettings {
                public_base_url: self.config.http.public_base_url.clone(),
                message: self.config.notifier.message.clone(),
                ..LoopSettings::default()
            },
        );

        Ok(match self.config.notifier.snapshot.build() {
            Some(snapshot) => {
                tracing::info!("[App] Attaching {} snapshots to notifications", snapshot.name());
                detection.with_snapshot(snapshot)
            }
            None => detection,
        })
    }

    /// Start the detection worker for the configured audio source.
    ///
    /// Returns `None` when detection is disabled.
    pub fn start_detection(&self) -> anyhow::Result<Option<DetectionLoopHandle>> {
        let audio = &self.config.audio;
        let (sample_rate, frame_len) = (audio.sample_rate, audio.frame_len);
        let detection = self.detection_loop()?;

        let handle = match audio.source.clone() {
            AudioSource::Disabled => {
                tracing::info!("[App] Detection disabled; serving unlock requests only");
                return Ok(None);
            }
            AudioSource::Wav { path, looping } => detection
                .spawn(move || WavSource::open(path, frame_len).map(|s| s.looping(looping)))
                .context("starting detection from WAV file")?,
            AudioSource::Microphone => Self::spawn_microphone(detection, sample_rate, frame_len)?,
        };
        Ok(Some(handle))
    }

    #[cfg(feature = "cpal-capture")]
    fn spawn_microphone(
        detection: DetectionLoop,
        sample_rate: u32,
        frame_len: usize,
    ) -> anyhow::Result<DetectionLoopHandle> {
        detection
            .spawn(move || crate::audio::CpalSource::open(sample_rate, frame_len))
            .context("starting detection from the default input device")
    }

    #[cfg(not(feature = "cpal-capture"))]
    fn spawn_microphone(
        _detection: DetectionLoop,
        _sample_rate: u32,
        _frame_len: usize,
    ) -> anyhow::Result<DetectionLoopHandle> {
        anyhow::bail!("microphone capture requires the `cpal-capture` feature")
    }

    /// Handler state for the HTTP surface.
    pub fn http_state(&self, detection: Option<StatusProbe>) -> AppState {
        let mut state = AppState::new(
            Arc::clone(&self.gate),
            Arc::clone(&self.authority),
            Arc::clone(&self.telemetry),
        );
        if let Some(probe) = detection {
            state = state.with_detection(probe);
        }
        match &self.config.http.admin_token {
            Some(token) => state.with_admin_token(token.clone()),
            None => {
                tracing::warn!("[App] No admin token configured; admin routes are disabled");
                state
            }
        }
    }

    /// Run detection and the HTTP server until Ctrl-C.
    pub fn run(self) -> anyhow::Result<()> {
        let mut detection = self.start_detection()?;
        let state = self.http_state(detection.as_ref().map(DetectionLoopHandle::probe));

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("building tokio runtime")?;

        let http = &self.config.http;
        let result = runtime.block_on(async {
            let sweeper = tokio::spawn(sweep_periodically(
                Arc::clone(&self.authority),
                self.config.credentials.sweep_interval(),
            ));

            let served = run_http_server(state, http.bind, http.max_concurrent_requests, async {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    tracing::error!("[App] Failed to listen for Ctrl-C: {}", err);
                    std::future::pending::<()>().await;
                }
                tracing::info!("[App] Shutdown requested");
            })
            .await;

            sweeper.abort();
            served
        });

        if let Some(handle) = detection.as_mut() {
            handle.stop();
        }
        result
    }
}

async fn sweep_periodically(authority: Arc<CredentialAuthority>, period: std::time::Duration) {
    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;
        authority.sweep();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::notify::LogNotifier;

    fn app(config: AppConfig) -> Result<App, ConfigError> {
        App::with_parts(
            config,
            Arc::new(ManualClock::at_time_of_day(10, 0)),
            Arc::new(SimulatedActuator::new()),
            Arc::new(LogNotifier),
        )
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = AppConfig::default();
        config.credentials.validity_secs = 0;
        assert!(app(config).is_err());
    }

    #[test]
    fn test_disabled_detection_starts_nothing() {
        let mut config = AppConfig::default();
        config.audio.source = AudioSource::Disabled;
        let app = app(config).unwrap();
        assert!(app.start_detection().unwrap().is_none());
    }

    #[test]
    fn test_missing_wav_fails_to_start() {
        let mut config = AppConfig::default();
        config.audio.source = AudioSource::Wav {
            path: "/nonexistent/chime.wav".into(),
            looping: false,
        };
        let app = app(config).unwrap();
        assert!(app.start_detection().is_err());
    }

    #[test]
    fn test_gate_and_authority_share_codes() {
        let mut config = AppConfig::default();
        config.audio.source = AudioSource::Disabled;
        let app = app(config).unwrap();

        let code = app.authority().issue().code;
        assert!(app.gate().authorize(&code).is_ok());
        assert_eq!(app.telemetry().snapshot().total_events, 1);
    }
}
