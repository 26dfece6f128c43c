//! Pool configuration.

use std::time::Duration;

use crate::error::PoolError;

/// Configuration for a [`Pool`](crate::Pool).
///
/// The retry and wait knobs default to the values the pool has always
/// shipped with; capacity is the one setting most deployments change.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of pooled sessions. Fixed for the pool's lifetime.
    pub capacity: usize,

    /// How many state-machine passes a single checkout may spend before
    /// failing with [`PoolError::RetriesExhausted`].
    pub max_setup_attempts: usize,

    /// Pause between setup attempts after a transient failure.
    pub retry_delay: Duration,

    /// Upper bound on one wait for a returned session. Expiry is not an
    /// error; the waiter re-scans the pool and waits again.
    pub wait_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            max_setup_attempts: 10,
            retry_delay: Duration::from_millis(1000),
            wait_timeout: Duration::from_secs(10),
        }
    }
}

impl PoolConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of pooled sessions.
    #[must_use]
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the setup attempt budget.
    #[must_use]
    pub fn max_setup_attempts(mut self, attempts: usize) -> Self {
        self.max_setup_attempts = attempts;
        self
    }

    /// Set the pause between setup attempts.
    #[must_use]
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set the bound on a single wait for a returned session.
    #[must_use]
    pub fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    /// Check the configuration for values the pool cannot run with.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.capacity == 0 {
            return Err(PoolError::InvalidConfig("capacity must be at least 1".into()));
        }
        if self.max_setup_attempts == 0 {
            return Err(PoolError::InvalidConfig(
                "max_setup_attempts must be at least 1".into(),
            ));
        }
        if self.wait_timeout.is_zero() {
            return Err(PoolError::InvalidConfig(
                "wait_timeout must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PoolConfig::new();
        assert_eq!(config.capacity, 10);
        assert_eq!(config.max_setup_attempts, 10);
        assert_eq!(config.retry_delay, Duration::from_millis(1000));
        assert_eq!(config.wait_timeout, Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_setters() {
        let config = PoolConfig::new()
            .capacity(3)
            .max_setup_attempts(2)
            .retry_delay(Duration::from_millis(50))
            .wait_timeout(Duration::from_secs(1));
        assert_eq!(config.capacity, 3);
        assert_eq!(config.max_setup_attempts, 2);
        assert_eq!(config.retry_delay, Duration::from_millis(50));
        assert_eq!(config.wait_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        assert!(PoolConfig::new().capacity(0).validate().is_err());
        assert!(PoolConfig::new().max_setup_attempts(0).validate().is_err());
        assert!(PoolConfig::new()
            .wait_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }
}
