//! Time sources shared by the detector and the credential authority.
//!
//! Detection needs both a monotonic instant (cooldowns) and the local wall
//! clock (quiet windows); credentials only use the monotonic side so that
//! wall-clock adjustments cannot extend or shorten a validity window.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDateTime};

/// Trait representing the time source used by the core components.
pub trait Clock: Send + Sync {
    /// Monotonic instant.
    fn now(&self) -> Instant;

    /// Local wall-clock date and time.
    fn wall(&self) -> NaiveDateTime;
}

/// Default clock backed by `Instant::now` and `chrono::Local`.
#[derive(Debug, Default)]
pub struct SystemClock {
    _unit: (),
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Manually advanced clock for deterministic tests and offline replay.
///
/// Both the monotonic and wall readings move together when `advance` is
/// called; nothing moves on its own.
#[derive(Debug)]
pub struct ManualClock {
    start: Instant,
    wall_start: NaiveDateTime,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new(wall_start: NaiveDateTime) -> Self {
        Self {
            start: Instant::now(),
            wall_start,
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Clock whose wall reading starts at `hour:minute` today.
    pub fn at_time_of_day(hour: u32, minute: u32) -> Self {
        let date = Local::now().date_naive();
        Self::new(date.and_hms_opt(hour, minute, 0).unwrap_or_default())
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }

    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    fn wall(&self) -> NaiveDateTime {
        let offset = chrono::Duration::from_std(self.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.wall_start + offset
    }
}
