// ServoController - hobby servo on a Linux sysfs PWM channel
//
// Pulse width maps linearly from 0.5 ms (0°) to 2.5 ms (180°) inside a
// 20 ms (50 Hz) period. Values are written in nanoseconds to
//   /sys/class/pwm/pwmchip{chip}/pwm{channel}/{period,duty_cycle,enable}
//
// After the hold time the output is disabled so the servo stops buzzing
// against the latch.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{Actuator, ServoAngle};
use crate::error::{ActuatorError, ConfigError};

const MIN_PULSE_NS: u64 = 500_000;
const MAX_PULSE_NS: u64 = 2_500_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PwmConfig {
    /// sysfs root, overridable for tests
    pub sysfs_root: PathBuf,
    pub chip: u32,
    pub channel: u32,
    pub frequency_hz: u32,
    /// Time to keep the pulse applied so the horn reaches the angle
    pub hold_ms: u64,
}

impl Default for PwmConfig {
    fn default() -> Self {
        Self {
            sysfs_root: PathBuf::from("/sys/class/pwm"),
            chip: 0,
            channel: 0,
            frequency_hz: 50,
            hold_ms: 500,
        }
    }
}

impl PwmConfig {
    pub fn period_ns(&self) -> u64 {
        1_000_000_000 / self.frequency_hz.max(1) as u64
    }

    /// The period has to fit the widest pulse, so anything at or above
    /// 400 Hz is refused.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frequency_hz == 0 || self.period_ns() <= MAX_PULSE_NS {
            return Err(ConfigError::invalid(
                "unlock.actuator.frequency_hz",
                format!(
                    "{} Hz leaves no room for a {} ns pulse",
                    self.frequency_hz, MAX_PULSE_NS
                ),
            ));
        }
        Ok(())
    }

    fn chip_dir(&self) -> PathBuf {
        self.sysfs_root.join(format!("pwmchip{}", self.chip))
    }

    fn channel_dir(&self) -> PathBuf {
        self.chip_dir().join(format!("pwm{}", self.channel))
    }
}

/// Pulse width for an angle, in nanoseconds.
pub fn pulse_width_ns(angle: ServoAngle) -> u64 {
    MIN_PULSE_NS
        + (MAX_PULSE_NS - MIN_PULSE_NS) * angle.degrees() as u64 / ServoAngle::MAX_DEGREES as u64
}

pub struct ServoController {
    config: PwmConfig,
    // Serializes moves; holds whether the channel has been exported
    exported: Mutex<bool>,
}

impl ServoController {
    pub fn new(config: PwmConfig) -> Self {
        Self {
            config,
            exported: Mutex::new(false),
        }
    }

    pub fn config(&self) -> &PwmConfig {
        &self.config
    }

    fn export(&self) -> Result<(), ActuatorError> {
        let channel_dir = self.config.channel_dir();
        if !channel_dir.exists() {
            write_value(
                &self.config.chip_dir().join("export"),
                self.config.channel as u64,
            )?;
            tracing::info!("[Servo] Exported PWM channel {:?}", channel_dir);
        }
        // Period must be set before a duty cycle larger than the old period
        write_value(&channel_dir.join("period"), self.config.period_ns())
    }
}

impl Actuator for ServoController {
    fn move_to(&self, angle: ServoAngle) -> Result<(), ActuatorError> {
        let mut exported = self
            .exported
            .lock()
            .map_err(|_| ActuatorError::LockPoisoned)?;
        if !*exported {
            self.export()?;
            *exported = true;
        }

        let channel_dir = self.config.channel_dir();
        let pulse = pulse_width_ns(angle);
        write_value(&channel_dir.join("duty_cycle"), pulse)?;
        write_value(&channel_dir.join("enable"), 1)?;

        tracing::info!(
            "[Servo] Rotating to {} (pulse {:.2} ms)",
            angle,
            pulse as f64 / 1_000_000.0
        );

        thread::sleep(Duration::from_millis(self.config.hold_ms));
        write_value(&channel_dir.join("enable"), 0)?;
        Ok(())
    }
}

fn write_value(path: &Path, value: u64) -> Result<(), ActuatorError> {
    fs::write(path, value.to_string()).map_err(|e| ActuatorError::HardwareError {
        details: format!("{}: {}", path.display(), e),
    })
}
