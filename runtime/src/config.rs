//! Lifecycle configuration.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Unset or unparsable values fall back to the default.
//!
//! | Variable | Default |
//! |---|---|
//! | `BOOKING_RETRY_MAX_RETRIES` | `0` (no retries) |
//! | `BOOKING_RETRY_INITIAL_DELAY_MS` | `50` |
//! | `BOOKING_RETRY_MAX_DELAY_MS` | `1000` |

use crate::retry::RetryPolicy;
use std::env;
use std::time::Duration;

/// Booking lifecycle configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleConfig {
    /// Retry of storage failures on guarded transitions
    pub retry: RetryPolicy,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::disabled(),
        }
    }
}

impl LifecycleConfig {
    /// Load configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parse = |key: &str, default: u64| {
            lookup(key)
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(default)
        };

        let max_retries = lookup("BOOKING_RETRY_MAX_RETRIES")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0);

        Self {
            retry: RetryPolicy::builder()
                .max_retries(max_retries)
                .initial_delay(Duration::from_millis(parse("BOOKING_RETRY_INITIAL_DELAY_MS", 50)))
                .max_delay(Duration::from_millis(parse("BOOKING_RETRY_MAX_DELAY_MS", 1000)))
                .build(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_disable_retries() {
        let config = LifecycleConfig::from_lookup(|_| None);
        assert_eq!(config, LifecycleConfig::default());
        assert_eq!(config.retry.max_retries, 0);
        assert_eq!(config.retry.initial_delay, Duration::from_millis(50));
        assert_eq!(config.retry.max_delay, Duration::from_secs(1));
    }

    #[test]
    fn reads_overrides() {
        let config = LifecycleConfig::from_lookup(lookup_from(&[
            ("BOOKING_RETRY_MAX_RETRIES", "3"),
            ("BOOKING_RETRY_INITIAL_DELAY_MS", "10"),
            ("BOOKING_RETRY_MAX_DELAY_MS", " 200 "),
        ]));
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.initial_delay, Duration::from_millis(10));
        assert_eq!(config.retry.max_delay, Duration::from_millis(200));
    }

    #[test]
    fn garbage_falls_back_to_default() {
        let config = LifecycleConfig::from_lookup(lookup_from(&[("BOOKING_RETRY_MAX_RETRIES", "lots")]));
        assert_eq!(config.retry.max_retries, 0);
    }
}
