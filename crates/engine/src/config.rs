use std::time::Duration;

use radar_core::env::{self, ConfigError};

use crate::reconnect::ReconnectConfig;

/// Timing and fallback settings for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Interval between poll ticks while a job is active.
    pub poll_interval: Duration,
    /// Poll ticks before the job is force-completed as degraded.
    pub poll_max_attempts: u32,
    /// Interval between watchdog checks.
    pub watchdog_interval: Duration,
    /// Silence after which an active job is force-completed.
    pub silence_threshold: Duration,
    /// Backoff for resubscribing to the change feed.
    pub reconnect: ReconnectConfig,
    /// Queries used when the strategy compiler is unavailable. An empty
    /// list makes compilation failures fatal.
    pub fallback_queries: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(20),
            poll_max_attempts: 90,
            watchdog_interval: Duration::from_secs(2),
            silence_threshold: Duration::from_secs(30 * 60),
            reconnect: ReconnectConfig::default(),
            fallback_queries: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                        | Default |
    /// |--------------------------------|---------|
    /// | `RADAR_POLL_INTERVAL_SECS`     | `20`    |
    /// | `RADAR_POLL_MAX_ATTEMPTS`      | `90`    |
    /// | `RADAR_WATCHDOG_CHECK_MS`      | `2000`  |
    /// | `RADAR_SILENCE_THRESHOLD_SECS` | `1800`  |
    /// | `RADAR_RECONNECT_INITIAL_MS`   | `1000`  |
    /// | `RADAR_RECONNECT_MAX_SECS`     | `30`    |
    /// | `RADAR_RECONNECT_STABLE_SECS`  | `10`    |
    /// | `RADAR_FALLBACK_QUERIES`       | empty   |
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let poll_max_attempts = env::var_or("RADAR_POLL_MAX_ATTEMPTS", defaults.poll_max_attempts)?;
        if poll_max_attempts == 0 {
            return Err(ConfigError::Invalid {
                var: "RADAR_POLL_MAX_ATTEMPTS",
                value: "0".into(),
            });
        }

        Ok(Self {
            poll_interval: Duration::from_secs(env::var_or("RADAR_POLL_INTERVAL_SECS", 20)?),
            poll_max_attempts,
            watchdog_interval: Duration::from_millis(env::var_or("RADAR_WATCHDOG_CHECK_MS", 2000)?),
            silence_threshold: Duration::from_secs(env::var_or(
                "RADAR_SILENCE_THRESHOLD_SECS",
                30 * 60,
            )?),
            reconnect: ReconnectConfig {
                initial_delay: Duration::from_millis(env::var_or(
                    "RADAR_RECONNECT_INITIAL_MS",
                    1000,
                )?),
                max_delay: Duration::from_secs(env::var_or("RADAR_RECONNECT_MAX_SECS", 30)?),
                stable_after: Duration::from_secs(env::var_or("RADAR_RECONNECT_STABLE_SECS", 10)?),
                ..defaults.reconnect
            },
            fallback_queries: env::list("RADAR_FALLBACK_QUERIES"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_table() {
        let config = EngineConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(20));
        assert_eq!(config.poll_max_attempts, 90);
        assert_eq!(config.watchdog_interval, Duration::from_secs(2));
        assert_eq!(config.silence_threshold, Duration::from_secs(1800));
        assert_eq!(config.reconnect.stable_after, Duration::from_secs(10));
        assert!(config.fallback_queries.is_empty());
    }
}
