// DetectionStateMachine - turns per-frame energy reports into confirmed events
//
// States:
//   Idle ──qualifies──> Accumulating ──sustained──> Confirmed ──> CoolingDown
//     ^                     │                                        │
//     └────fails to qualify─┘                 cooldown elapsed ──────┘
//
// A quiet window forces Idle from any state and clears the accumulator.
// Confirmed is transient: the machine moves on to CoolingDown inside the
// same `advance` call, so it is never observed between calls.

use std::fmt;
use std::time::{Duration, Instant};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::QuietWindow;
use crate::analysis::{EnergyReport, TargetSpectrum, TargetTone};
use crate::clock::Clock;
use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionState {
    Idle,
    Accumulating,
    Confirmed,
    CoolingDown,
}

impl fmt::Display for DetectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DetectionState::Idle => "idle",
            DetectionState::Accumulating => "accumulating",
            DetectionState::Confirmed => "confirmed",
            DetectionState::CoolingDown => "cooling_down",
        };
        f.write_str(name)
    }
}

/// How per-tone results combine into a single "signal present" decision
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Every target tone must be above threshold in the same frame
    #[default]
    All,
    /// At least one target tone above threshold is enough
    Any,
}

/// Qualification threshold, expressed as a multiple of the ambient noise floor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnergyThreshold {
    pub noise_floor: f32,
    pub multiplier: f32,
}

impl Default for EnergyThreshold {
    fn default() -> Self {
        Self {
            noise_floor: 0.1,
            multiplier: 2.0,
        }
    }
}

impl EnergyThreshold {
    /// Effective threshold in [0, 1]
    pub fn level(&self) -> f32 {
        (self.noise_floor * self.multiplier).clamp(0.0, 1.0)
    }
}

/// Detection tuning, loaded once at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub tones: TargetSpectrum,
    pub threshold: EnergyThreshold,
    pub policy: MatchPolicy,
    /// Minimum continuous qualifying time before an event fires
    pub sustain_secs: f64,
    /// Minimum time between two events
    pub cooldown_secs: f64,
    pub quiet_windows: Vec<QuietWindow>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            tones: TargetSpectrum::new(vec![
                TargetTone::new(502.0, 50.0),
                TargetTone::new(648.0, 50.0),
            ]),
            threshold: EnergyThreshold::default(),
            policy: MatchPolicy::All,
            sustain_secs: 3.0,
            cooldown_secs: 10.0,
            quiet_windows: Vec::new(),
        }
    }
}

impl DetectionConfig {
    pub fn sustain(&self) -> Duration {
        Duration::from_secs_f64(self.sustain_secs.max(0.0))
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs_f64(self.cooldown_secs.max(0.0))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tones.is_empty() {
            return Err(ConfigError::invalid(
                "detection.tones",
                "at least one target tone is required",
            ));
        }
        for tone in self.tones.tones() {
            let valid = tone.frequency_hz.is_finite()
                && tone.frequency_hz > 0.0
                && tone.tolerance_hz.is_finite()
                && tone.tolerance_hz >= 0.0;
            if !valid {
                return Err(ConfigError::invalid(
                    "detection.tones",
                    format!(
                        "{} Hz ± {} Hz is not a valid tone",
                        tone.frequency_hz, tone.tolerance_hz
                    ),
                ));
            }
        }
        if !self.threshold.noise_floor.is_finite()
            || !self.threshold.multiplier.is_finite()
            || self.threshold.noise_floor < 0.0
            || self.threshold.multiplier <= 0.0
        {
            return Err(ConfigError::invalid(
                "detection.threshold",
                "noise_floor must be >= 0 and multiplier > 0",
            ));
        }
        if self.threshold.level() >= 1.0 {
            return Err(ConfigError::invalid(
                "detection.threshold",
                "noise_floor * multiplier must be below 1.0 or nothing can qualify",
            ));
        }
        if !self.sustain_secs.is_finite() || self.sustain_secs <= 0.0 {
            return Err(ConfigError::invalid(
                "detection.sustain_secs",
                "must be a positive number of seconds",
            ));
        }
        if !self.cooldown_secs.is_finite() || self.cooldown_secs < 0.0 {
            return Err(ConfigError::invalid(
                "detection.cooldown_secs",
                "must be zero or a positive number of seconds",
            ));
        }
        Ok(())
    }
}

/// Time of one frame, on both clocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// Monotonic time, used for cooldown
    pub at: Instant,
    /// Local wall time, used for quiet windows
    pub wall: NaiveDateTime,
}

impl Tick {
    pub fn new(at: Instant, wall: NaiveDateTime) -> Self {
        Self { at, wall }
    }

    pub fn from_clock(clock: &dyn Clock) -> Self {
        Self::new(clock.now(), clock.wall())
    }
}

/// Emitted exactly once per confirmed chime
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionEvent {
    pub confirmed_at: Instant,
    pub wall: NaiveDateTime,
    /// Qualifying time accumulated when the event fired
    pub sustained: Duration,
    /// Loudest target tone in the confirming frame
    pub peak_energy: f32,
}

/// Read-only copy of the machine state for health reporting
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionSnapshot {
    pub state: DetectionState,
    pub accumulated_ms: u64,
    pub last_confirmed: Option<NaiveDateTime>,
}

pub struct DetectionStateMachine {
    config: DetectionConfig,
    threshold: f32,
    sustain: Duration,
    cooldown: Duration,
    frame_duration: Duration,
    state: DetectionState,
    accumulated: Duration,
    last_confirmed_at: Option<Instant>,
    last_confirmed_wall: Option<NaiveDateTime>,
}

impl DetectionStateMachine {
    /// # Arguments
    /// * `config` - thresholds, policy, sustain/cooldown and quiet windows
    /// * `frame_duration` - time covered by one analyzed frame
    pub fn new(config: DetectionConfig, frame_duration: Duration) -> Self {
        Self {
            threshold: config.threshold.level(),
            sustain: config.sustain(),
            cooldown: config.cooldown(),
            config,
            frame_duration,
            state: DetectionState::Idle,
            accumulated: Duration::ZERO,
            last_confirmed_at: None,
            last_confirmed_wall: None,
        }
    }

    pub fn state(&self) -> DetectionState {
        self.state
    }

    pub fn accumulated(&self) -> Duration {
        self.accumulated
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    pub fn snapshot(&self) -> DetectionSnapshot {
        DetectionSnapshot {
            state: self.state,
            accumulated_ms: self.accumulated.as_millis() as u64,
            last_confirmed: self.last_confirmed_wall,
        }
    }

    /// Whether `wall` falls inside any configured quiet window.
    pub fn is_quiet(&self, wall: NaiveDateTime) -> bool {
        self.config.quiet_windows.iter().any(|w| w.contains(wall))
    }

    /// Whether a report counts as "signal present" under the match policy.
    pub fn qualifies(&self, report: &EnergyReport) -> bool {
        if report.tones.is_empty() {
            return false;
        }
        let above = |energy: f32| energy > self.threshold;
        match self.config.policy {
            MatchPolicy::All => report.energies().all(above),
            MatchPolicy::Any => report.energies().any(above),
        }
    }

    /// Feed one frame.
    ///
    /// `report` is `None` for a frame that could not be analyzed; it counts
    /// as a frame without signal. Returns the event when this frame
    /// confirms a detection.
    pub fn advance(&mut self, report: Option<&EnergyReport>, tick: Tick) -> Option<DetectionEvent> {
        if self.is_quiet(tick.wall) {
            if self.state != DetectionState::Idle {
                tracing::debug!(
                    "[DetectionStateMachine] Quiet window at {}, {} -> idle",
                    tick.wall.time(),
                    self.state
                );
            }
            self.reset();
            return None;
        }

        if self.state == DetectionState::CoolingDown {
            let elapsed = self
                .last_confirmed_at
                .map(|t| tick.at.saturating_duration_since(t));
            match elapsed {
                Some(elapsed) if elapsed < self.cooldown => return None,
                _ => self.state = DetectionState::Idle,
            }
        }

        let qualifies = report.is_some_and(|r| self.qualifies(r));

        match (self.state, qualifies) {
            (DetectionState::Idle, false) => return None,
            (DetectionState::Idle, true) => {
                self.state = DetectionState::Accumulating;
                self.accumulated = self.frame_duration;
            }
            (DetectionState::Accumulating, true) => {
                self.accumulated += self.frame_duration;
            }
            (DetectionState::Accumulating, false) => {
                tracing::debug!(
                    "[DetectionStateMachine] Signal dropped after {:?}",
                    self.accumulated
                );
                self.reset();
                return None;
            }
            // Confirmed never survives an advance call and CoolingDown was
            // resolved above
            (DetectionState::Confirmed | DetectionState::CoolingDown, _) => {
                self.reset();
                return None;
            }
        }

        if self.accumulated < self.sustain {
            return None;
        }

        self.state = DetectionState::Confirmed;
        let event = DetectionEvent {
            confirmed_at: tick.at,
            wall: tick.wall,
            sustained: self.accumulated,
            peak_energy: report.map(EnergyReport::peak).unwrap_or(0.0),
        };
        self.last_confirmed_at = Some(tick.at);
        self.last_confirmed_wall = Some(tick.wall);
        self.accumulated = Duration::ZERO;
        self.state = DetectionState::CoolingDown;

        tracing::info!(
            "[DetectionStateMachine] Confirmed after {:?} (peak {:.3})",
            event.sustained,
            event.peak_energy
        );
        Some(event)
    }

    fn reset(&mut self) {
        self.state = DetectionState::Idle;
        self.accumulated = Duration::ZERO;
    }
}
