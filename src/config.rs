//! Configuration for the resolution engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tuning knobs for the resolver. The timeouts bound individual profile
/// store calls; none of them are retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Bound on the enrichment profile read
    pub read_timeout_ms: u64,

    /// Bound on profile creation
    pub create_timeout_ms: u64,

    /// Bound on the existence check before profile creation
    pub ensure_check_timeout_ms: u64,

    /// How long `shutdown` waits for the engine task to exit
    pub shutdown_timeout_ms: u64,

    /// Buffered identity events per subscriber before it lags
    pub event_capacity: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: 3000,
            create_timeout_ms: 2000,
            ensure_check_timeout_ms: 2000,
            shutdown_timeout_ms: 5000,
            event_capacity: 64,
        }
    }
}

impl ResolverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout_ms = millis(timeout);
        self
    }

    pub fn with_create_timeout(mut self, timeout: Duration) -> Self {
        self.create_timeout_ms = millis(timeout);
        self
    }

    pub fn with_ensure_check_timeout(mut self, timeout: Duration) -> Self {
        self.ensure_check_timeout_ms = millis(timeout);
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout_ms = millis(timeout);
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn create_timeout(&self) -> Duration {
        Duration::from_millis(self.create_timeout_ms)
    }

    pub fn ensure_check_timeout(&self) -> Duration {
        Duration::from_millis(self.ensure_check_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> crate::error::Result<()> {
        let zero_bound = [
            ("read_timeout_ms", self.read_timeout_ms),
            ("create_timeout_ms", self.create_timeout_ms),
            ("ensure_check_timeout_ms", self.ensure_check_timeout_ms),
        ]
        .into_iter()
        .find(|(_, value)| *value == 0);

        if let Some((name, _)) = zero_bound {
            return Err(crate::error::IdentityError::Config(format!(
                "{} must be greater than zero",
                name
            )));
        }
        if self.event_capacity == 0 {
            return Err(crate::error::IdentityError::Config(
                "event_capacity must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ResolverConfig::default();
        assert_eq!(config.read_timeout(), Duration::from_secs(3));
        assert_eq!(config.create_timeout(), Duration::from_secs(2));
        assert_eq!(config.ensure_check_timeout(), Duration::from_secs(2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builders() {
        let config = ResolverConfig::new()
            .with_read_timeout(Duration::from_millis(250))
            .with_event_capacity(8);
        assert_eq!(config.read_timeout_ms, 250);
        assert_eq!(config.event_capacity, 8);
    }

    #[test]
    fn test_partial_deserialization() {
        let config: ResolverConfig = toml::from_str("read_timeout_ms = 1500").unwrap();
        assert_eq!(config.read_timeout_ms, 1500);
        assert_eq!(config.create_timeout_ms, 2000);
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = ResolverConfig::new().with_read_timeout(Duration::ZERO);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("read_timeout_ms"));
    }
}
