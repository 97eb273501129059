use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::{Actuator, ServoAngle};
use crate::error::ActuatorError;

/// In-memory actuator for dry runs and tests. Records every move.
#[derive(Debug, Default)]
pub struct SimulatedActuator {
    moves: Mutex<Vec<ServoAngle>>,
    fail: AtomicBool,
}

impl SimulatedActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent moves fail with a hardware error.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }

    pub fn moves(&self) -> Vec<ServoAngle> {
        self.moves.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Actuator for SimulatedActuator {
    fn move_to(&self, angle: ServoAngle) -> Result<(), ActuatorError> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(ActuatorError::HardwareError {
                details: "simulated failure".to_string(),
            });
        }
        tracing::info!("[Servo] (simulated) Rotating to {}", angle);
        self.moves
            .lock()
            .map_err(|_| ActuatorError::LockPoisoned)?
            .push(angle);
        Ok(())
    }
}
