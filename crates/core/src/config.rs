//! Configuration for a shutdown orchestrator.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default time budget for the whole shutdown walk.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for [`crate::Shutdown`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// How long `wait` waits for the walk before reporting a timeout, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT.as_millis() as u64
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl ShutdownConfig {
    /// Set the shutdown timeout. Millisecond precision: sub-millisecond parts
    /// are dropped and anything shorter than 1 ms becomes 1 ms.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis())
            .unwrap_or(u64::MAX)
            .max(1);
        self
    }

    /// The shutdown timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeout_is_five_seconds() {
        let config = ShutdownConfig::default();
        assert_eq!(config.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_with_timeout() {
        let config = ShutdownConfig::default().with_timeout(Duration::from_millis(250));
        assert_eq!(config.timeout_ms, 250);
        assert_eq!(config.timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_sub_millisecond_timeout_clamped() {
        let config = ShutdownConfig::default().with_timeout(Duration::from_micros(300));
        assert_eq!(config.timeout(), Duration::from_millis(1));

        let config = ShutdownConfig::default().with_timeout(Duration::from_micros(2500));
        assert_eq!(config.timeout(), Duration::from_millis(2));
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: ShutdownConfig = toml::from_str("").unwrap();
        assert_eq!(config, ShutdownConfig::default());

        let config: ShutdownConfig = toml::from_str("timeout_ms = 1500").unwrap();
        assert_eq!(config.timeout(), Duration::from_millis(1500));
    }
}
