//! Resolver configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::env::{EnvLookup, ProcessEnv};

/// Tunables of a [`Resolver`](crate::Resolver)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Start change watches after a successful pass
    pub watch_for_updates: bool,
    /// Upper bound for closing a single source, unbounded when absent
    pub close_timeout_ms: Option<u64>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            watch_for_updates: true,
            close_timeout_ms: None,
        }
    }
}

impl ResolverConfig {
    /// Create configuration from environment variables
    ///
    /// Reads the following environment variables:
    /// - CONFIG_RESOLVER_WATCH: Enable change watches (`1`/`true` or `0`/`false`)
    /// - CONFIG_RESOLVER_CLOSE_TIMEOUT_MS: Per-source close timeout
    pub fn from_env() -> Self {
        Self::from_lookup(&ProcessEnv)
    }

    /// Create configuration from an injected environment
    pub fn from_lookup(env: &dyn EnvLookup) -> Self {
        let defaults = Self::default();
        Self {
            watch_for_updates: env
                .get("CONFIG_RESOLVER_WATCH")
                .and_then(|v| parse_flag(&v))
                .unwrap_or(defaults.watch_for_updates),
            close_timeout_ms: env
                .get("CONFIG_RESOLVER_CLOSE_TIMEOUT_MS")
                .and_then(|v| v.trim().parse().ok())
                .or(defaults.close_timeout_ms),
        }
    }

    /// Enable or disable change watches
    pub fn with_watch_for_updates(mut self, enabled: bool) -> Self {
        self.watch_for_updates = enabled;
        self
    }

    /// Bound the time spent closing each source
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Per-source close timeout
    pub fn close_timeout(&self) -> Option<Duration> {
        self.close_timeout_ms.map(Duration::from_millis)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = ResolverConfig::default();
        assert!(config.watch_for_updates);
        assert_eq!(config.close_timeout(), None);
    }

    #[test]
    fn test_from_lookup() {
        let env = HashMap::from([
            ("CONFIG_RESOLVER_WATCH".to_string(), "false".to_string()),
            ("CONFIG_RESOLVER_CLOSE_TIMEOUT_MS".to_string(), "250".to_string()),
        ]);
        let config = ResolverConfig::from_lookup(&env);
        assert!(!config.watch_for_updates);
        assert_eq!(config.close_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let env = HashMap::from([
            ("CONFIG_RESOLVER_WATCH".to_string(), "maybe".to_string()),
            ("CONFIG_RESOLVER_CLOSE_TIMEOUT_MS".to_string(), "soon".to_string()),
        ]);
        assert_eq!(ResolverConfig::from_lookup(&env), ResolverConfig::default());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: ResolverConfig = serde_json::from_str(r#"{"close_timeout_ms": 1000}"#).unwrap();
        assert!(config.watch_for_updates);
        assert_eq!(config.close_timeout_ms, Some(1000));

        let config = ResolverConfig::default()
            .with_watch_for_updates(false)
            .with_close_timeout(Duration::from_secs(2));
        assert_eq!(config.close_timeout_ms, Some(2000));
    }

    #[test]
    fn test_huge_close_timeout_saturates() {
        let config = ResolverConfig::default().with_close_timeout(Duration::MAX);
        assert_eq!(config.close_timeout_ms, Some(u64::MAX));
    }
}
