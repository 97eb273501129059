// Actuator module - door latch control
//
// `Actuator` is the seam between the unlock gate and the hardware. The only
// command is "move to this angle"; sequencing and retries are not its job.

pub mod servo;
pub mod simulated;

pub use servo::{PwmConfig, ServoController};
pub use simulated::SimulatedActuator;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ActuatorError;

/// Servo angle in whole degrees, always within [0, 180]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "u16")]
pub struct ServoAngle(u16);

impl ServoAngle {
    pub const MAX_DEGREES: u16 = 180;
    pub const CENTER: ServoAngle = ServoAngle(90);

    pub fn new(degrees: i32) -> Result<Self, ActuatorError> {
        if (0..=Self::MAX_DEGREES as i32).contains(&degrees) {
            Ok(Self(degrees as u16))
        } else {
            Err(ActuatorError::AngleOutOfRange { angle: degrees })
        }
    }

    pub fn degrees(self) -> u16 {
        self.0
    }
}

impl TryFrom<i32> for ServoAngle {
    type Error = ActuatorError;

    fn try_from(degrees: i32) -> Result<Self, Self::Error> {
        Self::new(degrees)
    }
}

impl From<ServoAngle> for u16 {
    fn from(angle: ServoAngle) -> Self {
        angle.0
    }
}

impl fmt::Display for ServoAngle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°", self.0)
    }
}

/// Physical latch driver. Implementations serialize their own access.
pub trait Actuator: Send + Sync {
    fn move_to(&self, angle: ServoAngle) -> Result<(), ActuatorError>;
}
