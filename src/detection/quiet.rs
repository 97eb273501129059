// QuietWindow - daily time-of-day suppression interval
//
// A window is half-open, [start, end). When start > end the window wraps
// midnight (22:00-08:00 covers 23:00 and 07:59 but not 08:00).
//
// Serialized as {"start": "HH:MM", "end": "HH:MM"}.

use chrono::{NaiveDateTime, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ConfigError;

const FORMAT: &str = "%H:%M";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuietWindow {
    start: NaiveTime,
    end: NaiveTime,
}

impl QuietWindow {
    /// Create a window from two times of day.
    ///
    /// # Errors
    /// `ConfigError::Invalid` when `start == end`: an empty window and a
    /// full-day window are indistinguishable, so neither is accepted.
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self, ConfigError> {
        if start == end {
            return Err(ConfigError::invalid(
                "detection.quiet_windows",
                format!("start and end are both {}", start.format(FORMAT)),
            ));
        }
        Ok(Self { start, end })
    }

    /// Convenience constructor from hours and minutes.
    pub fn from_hm(
        start_h: u32,
        start_m: u32,
        end_h: u32,
        end_m: u32,
    ) -> Result<Self, ConfigError> {
        let parse = |h, m| {
            NaiveTime::from_hms_opt(h, m, 0).ok_or_else(|| {
                ConfigError::invalid(
                    "detection.quiet_windows",
                    format!("{:02}:{:02} is not a time of day", h, m),
                )
            })
        };
        Self::new(parse(start_h, start_m)?, parse(end_h, end_m)?)
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn end(&self) -> NaiveTime {
        self.end
    }

    pub fn wraps_midnight(&self) -> bool {
        self.start > self.end
    }

    /// Whether `wall` falls inside the window.
    pub fn contains(&self, wall: NaiveDateTime) -> bool {
        let t = wall.time();
        if self.wraps_midnight() {
            t >= self.start || t < self.end
        } else {
            t >= self.start && t < self.end
        }
    }
}

impl Serialize for QuietWindow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Repr {
            start: String,
            end: String,
        }
        Repr {
            start: self.start.format(FORMAT).to_string(),
            end: self.end.format(FORMAT).to_string(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for QuietWindow {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Repr {
            start: String,
            end: String,
        }
        let repr = Repr::deserialize(deserializer)?;
        let parse = |s: &str| {
            NaiveTime::parse_from_str(s, FORMAT)
                .map_err(|e| serde::de::Error::custom(format!("invalid time '{}': {}", s, e)))
        };
        QuietWindow::new(parse(&repr.start)?, parse(&repr.end)?)
            .map_err(|e| serde::de::Error::custom(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_overnight_window() {
        let window = QuietWindow::from_hm(22, 0, 8, 0).unwrap();
        assert!(window.wraps_midnight());
        assert!(window.contains(at(23, 0, 0)));
        assert!(window.contains(at(22, 0, 0)));
        assert!(window.contains(at(0, 30, 0)));
        assert!(window.contains(at(7, 59, 59)));
        assert!(!window.contains(at(8, 0, 0)));
        assert!(!window.contains(at(21, 59, 59)));
        assert!(!window.contains(at(12, 0, 0)));
    }

    #[test]
    fn test_daytime_window() {
        let window = QuietWindow::from_hm(12, 0, 13, 30).unwrap();
        assert!(!window.wraps_midnight());
        assert!(window.contains(at(12, 0, 0)));
        assert!(window.contains(at(13, 29, 59)));
        assert!(!window.contains(at(13, 30, 0)));
        assert!(!window.contains(at(11, 59, 59)));
    }

    #[test]
    fn test_equal_bounds_rejected() {
        assert!(matches!(
            QuietWindow::from_hm(9, 0, 9, 0),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(QuietWindow::from_hm(25, 0, 9, 0).is_err());
    }

    #[test]
    fn test_serde_uses_hh_mm() {
        let window = QuietWindow::from_hm(22, 0, 8, 0).unwrap();
        let json = serde_json::to_string(&window).unwrap();
        assert_eq!(json, r#"{"start":"22:00","end":"08:00"}"#);

        let parsed: QuietWindow = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, window);

        assert!(serde_json::from_str::<QuietWindow>(r#"{"start":"07:00","end":"07:00"}"#).is_err());
        assert!(serde_json::from_str::<QuietWindow>(r#"{"start":"7pm","end":"08:00"}"#).is_err());
    }
}
