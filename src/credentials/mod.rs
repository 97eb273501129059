// CredentialAuthority - single-use, time-bounded unlock codes
//
// All table access goes through one mutex; check-and-consume happens under
// that lock so two concurrent callers presenting the same code cannot both
// succeed.
//
// Lifecycle of an entry:
//   issued ──validate──> consumed
//      │                    │
//      └──expires_at────────┴──+ retention──> swept
//
// Entries are kept for `retention` after they expire so that a late or
// repeated attempt is answered with Expired / AlreadyConsumed rather than
// NotFound. Validity is measured on the monotonic clock only.

mod code;

pub use code::CodeFormat;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::error::{ConfigError, CredentialError};

/// Total table size (live plus retained) as a multiple of `max_active`
const TABLE_CAPACITY_FACTOR: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialConfig {
    pub validity_secs: u64,
    pub code_format: CodeFormat,
    /// Live (unconsumed, unexpired) codes allowed at once
    pub max_active: usize,
    /// How long spent entries are remembered; defaults to the validity
    pub retention_secs: Option<u64>,
    /// Background sweep period for the server
    pub sweep_interval_secs: u64,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            validity_secs: 30,
            code_format: CodeFormat::default(),
            max_active: 16,
            retention_secs: None,
            sweep_interval_secs: 15,
        }
    }
}

impl CredentialConfig {
    pub fn validity(&self) -> Duration {
        Duration::from_secs(self.validity_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs.unwrap_or(self.validity_secs))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.validity_secs == 0 {
            return Err(ConfigError::invalid(
                "credentials.validity_secs",
                "must be at least one second",
            ));
        }
        if self.max_active == 0 {
            return Err(ConfigError::invalid(
                "credentials.max_active",
                "must allow at least one live code",
            ));
        }
        self.code_format.validate()?;

        // Keep the table well inside the code space so generation always
        // finds a free code quickly
        let table = (self.max_active * TABLE_CAPACITY_FACTOR) as u64;
        if table.saturating_mul(2) > self.code_format.code_space() {
            return Err(ConfigError::invalid(
                "credentials.max_active",
                format!(
                    "{} live codes is too many for a code space of {}",
                    self.max_active,
                    self.code_format.code_space()
                ),
            ));
        }
        Ok(())
    }
}

/// One issued code and its lifecycle state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub code: String,
    pub issued_at: Instant,
    pub expires_at: Instant,
    pub consumed: bool,
}

impl Credential {
    pub fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }

    pub fn is_live(&self, now: Instant) -> bool {
        !self.consumed && !self.is_expired(now)
    }

    /// Remaining validity, zero once expired.
    pub fn expires_in(&self, now: Instant) -> Duration {
        self.expires_at.saturating_duration_since(now)
    }
}

pub struct CredentialAuthority {
    config: CredentialConfig,
    validity: Duration,
    retention: Duration,
    clock: Arc<dyn Clock>,
    table: Mutex<HashMap<String, Credential>>,
}

impl CredentialAuthority {
    pub fn new(config: CredentialConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            validity: config.validity(),
            retention: config.retention(),
            config,
            clock,
            table: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_system_clock(config: CredentialConfig) -> Self {
        Self::new(config, Arc::new(SystemClock::default()))
    }

    pub fn config(&self) -> &CredentialConfig {
        &self.config
    }

    pub fn validity(&self) -> Duration {
        self.validity
    }

    /// Issue a fresh code valid for the configured window.
    ///
    /// When `max_active` live codes already exist, the oldest live one is
    /// evicted first.
    pub fn issue(&self) -> Credential {
        let now = self.clock.now();
        let mut table = self.lock();
        Self::sweep_locked(&mut table, now, self.retention);
        self.make_room(&mut table, now);

        let code = loop {
            let candidate = self.config.code_format.generate();
            if !table.contains_key(&candidate) {
                break candidate;
            }
        };

        let credential = Credential {
            code: code.clone(),
            issued_at: now,
            expires_at: now + self.validity,
            consumed: false,
        };
        table.insert(code, credential.clone());

        tracing::info!(
            "[Credentials] Issued code valid for {}s ({} live)",
            self.validity.as_secs(),
            table.values().filter(|c| c.is_live(now)).count()
        );
        credential
    }

    /// Check a presented code and mark it used.
    ///
    /// # Errors
    /// * `NotFound` - never issued, or already swept
    /// * `Expired` - presented after its validity window
    /// * `AlreadyConsumed` - a previous call already succeeded with it
    pub fn validate_and_consume(&self, code: &str) -> Result<(), CredentialError> {
        let now = self.clock.now();
        let mut table = self.lock();
        Self::sweep_locked(&mut table, now, self.retention);

        let result = match table.get_mut(code) {
            None => Err(CredentialError::NotFound),
            Some(credential) if credential.is_expired(now) => Err(CredentialError::Expired),
            Some(credential) if credential.consumed => Err(CredentialError::AlreadyConsumed),
            Some(credential) => {
                credential.consumed = true;
                Ok(())
            }
        };
        drop(table);

        match result {
            Ok(()) => tracing::info!("[Credentials] Code accepted"),
            Err(err) => tracing::warn!("[Credentials] Code rejected: {:?}", err),
        }
        result
    }

    /// Number of unconsumed, unexpired codes.
    pub fn active_count(&self) -> usize {
        let now = self.clock.now();
        let mut table = self.lock();
        Self::sweep_locked(&mut table, now, self.retention);
        table.values().filter(|c| c.is_live(now)).count()
    }

    /// Drop entries past their retention window. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut table = self.lock();
        let removed = Self::sweep_locked(&mut table, now, self.retention);
        if removed > 0 {
            tracing::debug!("[Credentials] Swept {} spent code(s)", removed);
        }
        removed
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Credential>> {
        // Every mutation is a single store, so a poisoned table is still consistent
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn sweep_locked(
        table: &mut HashMap<String, Credential>,
        now: Instant,
        retention: Duration,
    ) -> usize {
        let before = table.len();
        table.retain(|_, c| now <= c.expires_at + retention);
        before - table.len()
    }

    fn make_room(&self, table: &mut HashMap<String, Credential>, now: Instant) {
        let live = table.values().filter(|c| c.is_live(now)).count();
        if live >= self.config.max_active {
            let oldest = table
                .values()
                .filter(|c| c.is_live(now))
                .min_by_key(|c| c.issued_at)
                .map(|c| c.code.clone());
            if let Some(code) = oldest {
                table.remove(&code);
                tracing::info!("[Credentials] Evicted oldest live code to stay within limit");
            }
        }

        let capacity = self.config.max_active * TABLE_CAPACITY_FACTOR;
        while table.len() >= capacity {
            let oldest = table
                .values()
                .min_by_key(|c| c.issued_at)
                .map(|c| c.code.clone());
            match oldest {
                Some(code) => {
                    table.remove(&code);
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn authority(config: CredentialConfig) -> (CredentialAuthority, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at_time_of_day(12, 0));
        (CredentialAuthority::new(config, clock.clone()), clock)
    }

    #[test]
    fn test_issue_then_consume_once() {
        let (authority, _clock) = authority(CredentialConfig::default());
        let credential = authority.issue();

        assert_eq!(authority.active_count(), 1);
        assert_eq!(authority.validate_and_consume(&credential.code), Ok(()));
        assert_eq!(
            authority.validate_and_consume(&credential.code),
            Err(CredentialError::AlreadyConsumed)
        );
        assert_eq!(authority.active_count(), 0);
    }

    #[test]
    fn test_validity_window_boundaries() {
        let (authority, clock) = authority(CredentialConfig::default());

        let at_limit = authority.issue();
        let late = authority.issue();

        clock.advance(Duration::from_secs(30));
        assert_eq!(authority.validate_and_consume(&at_limit.code), Ok(()));

        clock.advance(Duration::from_secs(1));
        assert_eq!(
            authority.validate_and_consume(&late.code),
            Err(CredentialError::Expired)
        );
    }

    #[test]
    fn test_expired_wins_over_consumed() {
        let (authority, clock) = authority(CredentialConfig::default());
        let credential = authority.issue();
        authority.validate_and_consume(&credential.code).unwrap();

        clock.advance(Duration::from_secs(31));
        assert_eq!(
            authority.validate_and_consume(&credential.code),
            Err(CredentialError::Expired)
        );
    }

    #[test]
    fn test_unknown_code() {
        let (authority, _clock) = authority(CredentialConfig::default());
        assert_eq!(
            authority.validate_and_consume("000000"),
            Err(CredentialError::NotFound)
        );
    }

    #[test]
    fn test_sweep_after_retention() {
        let config = CredentialConfig {
            retention_secs: Some(10),
            ..CredentialConfig::default()
        };
        let (authority, clock) = authority(config);
        let credential = authority.issue();

        clock.advance(Duration::from_secs(40));
        assert_eq!(authority.sweep(), 0);

        clock.advance(Duration::from_secs(1));
        assert_eq!(authority.sweep(), 1);
        assert_eq!(
            authority.validate_and_consume(&credential.code),
            Err(CredentialError::NotFound)
        );
    }

    #[test]
    fn test_max_active_evicts_oldest() {
        let config = CredentialConfig {
            max_active: 2,
            ..CredentialConfig::default()
        };
        let (authority, clock) = authority(config);

        let first = authority.issue();
        clock.advance(Duration::from_millis(10));
        let second = authority.issue();
        clock.advance(Duration::from_millis(10));
        let third = authority.issue();

        assert_eq!(authority.active_count(), 2);
        assert_eq!(
            authority.validate_and_consume(&first.code),
            Err(CredentialError::NotFound)
        );
        assert_eq!(authority.validate_and_consume(&second.code), Ok(()));
        assert_eq!(authority.validate_and_consume(&third.code), Ok(()));
    }

    #[test]
    fn test_codes_are_unique_among_entries() {
        let (authority, _clock) = authority(CredentialConfig::default());
        let mut codes: Vec<String> = (0..16).map(|_| authority.issue().code).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), 16);
    }

    #[test]
    fn test_concurrent_consumers_single_winner() {
        let (authority, _clock) = authority(CredentialConfig::default());
        let code = authority.issue().code;
        let barrier = std::sync::Barrier::new(8);

        let successes = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        authority.validate_and_consume(&code).is_ok()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|ok| *ok)
                .count()
        });

        assert_eq!(successes, 1);
    }

    #[test]
    fn test_config_validation() {
        assert!(CredentialConfig::default().validate().is_ok());
        assert!(CredentialConfig {
            validity_secs: 0,
            ..CredentialConfig::default()
        }
        .validate()
        .is_err());
        assert!(CredentialConfig {
            code_format: CodeFormat::Numeric { digits: 4 },
            max_active: 2000,
            ..CredentialConfig::default()
        }
        .validate()
        .is_err());
    }
}
