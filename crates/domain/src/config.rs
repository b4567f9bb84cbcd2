//! Sync engine configuration
//!
//! Configuration is threaded explicitly through the engine's entry points;
//! nothing reads ambient/global settings.

use chrono::Duration;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Per-invocation configuration for reconciliation and subscription
/// lifecycle operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    /// How far back the provider fetch window reaches.
    pub lookback_hours: i64,
    /// How far ahead the provider fetch window reaches; bounds the pass so a
    /// slow provider cannot stream unbounded history.
    pub lookahead_hours: i64,
    /// Timezone used to anchor date-only (all-day) provider values.
    pub user_timezone: Tz,
    /// Callback URL handed to the provider when installing webhook channels.
    pub webhook_url: String,
    /// Subscriptions expiring within this many hours are renewed by the
    /// scheduler sweep.
    pub renewal_threshold_hours: i64,
    /// Upper bound on per-pass parent-event frequency memoization.
    pub frequency_cache_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            lookback_hours: 24,
            lookahead_hours: 24 * 30,
            user_timezone: Tz::UTC,
            webhook_url: "https://localhost/webhooks/calendar".to_string(),
            renewal_threshold_hours: 12,
            frequency_cache_capacity: 256,
        }
    }
}

impl SyncConfig {
    pub fn lookback(&self) -> Duration {
        Duration::hours(self.lookback_hours)
    }

    pub fn lookahead(&self) -> Duration {
        Duration::hours(self.lookahead_hours)
    }

    pub fn renewal_threshold(&self) -> Duration {
        Duration::hours(self.renewal_threshold_hours)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_window_is_bounded() {
        let config = SyncConfig::default();
        assert!(config.lookback() > Duration::zero());
        assert!(config.lookahead() > Duration::zero());
        assert_eq!(config.user_timezone, Tz::UTC);
    }
}
