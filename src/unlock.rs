// UnlockGate - turns a valid one-time code into exactly one latch movement
//
// The angle is fixed at construction. Callers can only present a code; they
// never choose where the servo goes.

use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::actuator::{Actuator, ServoAngle};
use crate::clock::Clock;
use crate::credentials::CredentialAuthority;
use crate::error::{log_actuator_error, UnlockError};
use crate::telemetry::TelemetryCollector;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UnlockReceipt {
    pub angle: ServoAngle,
    pub unlocked_at: NaiveDateTime,
}

pub struct UnlockGate {
    authority: Arc<CredentialAuthority>,
    actuator: Arc<dyn Actuator>,
    angle: ServoAngle,
    clock: Arc<dyn Clock>,
    telemetry: Arc<TelemetryCollector>,
}

impl UnlockGate {
    pub fn new(
        authority: Arc<CredentialAuthority>,
        actuator: Arc<dyn Actuator>,
        angle: ServoAngle,
        clock: Arc<dyn Clock>,
        telemetry: Arc<TelemetryCollector>,
    ) -> Self {
        Self {
            authority,
            actuator,
            angle,
            clock,
            telemetry,
        }
    }

    pub fn angle(&self) -> ServoAngle {
        self.angle
    }

    /// Consume `code` and move the actuator once.
    ///
    /// Blocks for the actuator hold time; call from a blocking context.
    /// A code is spent even when the actuator then fails.
    pub fn authorize(&self, code: &str) -> Result<UnlockReceipt, UnlockError> {
        if let Err(err) = self.authority.validate_and_consume(code) {
            self.telemetry.record_rejected(err);
            return Err(err.into());
        }

        if let Err(err) = self.actuator.move_to(self.angle) {
            log_actuator_error(&err, "UnlockGate::authorize");
            self.telemetry.record_unlock_failure(&err);
            return Err(err.into());
        }

        tracing::info!("[UnlockGate] Unlocked to {}", self.angle);
        self.telemetry.record_unlock(self.angle.degrees());
        Ok(UnlockReceipt {
            angle: self.angle,
            unlocked_at: self.clock.wall(),
        })
    }
}
