//! Alert cool-down bookkeeping.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::core::alert::{Alert, AlertKind};

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(24 * 60 * 60);

pub type AlertKey = (String, AlertKind, String);

pub fn key_for(alert: &Alert) -> AlertKey {
    (
        alert.symbol.clone(),
        alert.kind,
        alert.strategy_name.clone(),
    )
}

/// Suppresses re-firing the same (symbol, kind, strategy) combination
/// within a cool-down window.
///
/// State is process-local on purpose: after a restart every cool-down is
/// reset and a duplicate alert may fire again. That is an accepted
/// limitation, not something persistence should paper over.
pub struct AlertDeduplicator {
    cooldown: Duration,
    last_fired: HashMap<AlertKey, Instant>,
}

impl AlertDeduplicator {
    pub fn new(cooldown: Duration) -> Self {
        AlertDeduplicator {
            cooldown,
            last_fired: HashMap::new(),
        }
    }

    /// Returns true when the alert may fire, recording `now` as the new
    /// last-fired time. Returns false while the key is cooling down.
    pub fn should_fire(&mut self, key: AlertKey, now: Instant) -> bool {
        if let Some(last) = self.last_fired.get(&key) {
            if now.duration_since(*last) < self.cooldown {
                debug!(symbol = %key.0, kind = %key.1, strategy = %key.2, "Alert suppressed by cool-down");
                return false;
            }
        }
        self.last_fired.insert(key, now);
        true
    }
}

impl Default for AlertDeduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}
