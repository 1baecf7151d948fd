//! Pool configuration.

use std::sync::Arc;
use std::time::Duration;

use crate::error::PoolError;

/// Pool sizing and lifecycle configuration.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct PoolConfig {
    /// Upper bound on live connections (`in_use + idle`).
    pub max_concurrent: usize,
    /// Idle connections the pool tries to keep warm.
    pub min_idle: usize,
    /// Close idle connections beyond `min_idle` after this long; `None`
    /// keeps them indefinitely.
    pub idle_timeout: Option<Duration>,
    /// Query run against a pooled connection before lending it out;
    /// `None` skips checkout validation.
    pub validation_query: Option<Arc<str>>,
    /// How long `acquire` waits for a free connection.
    pub acquisition_timeout: Duration,
    /// Cadence of the background maintenance pass (eviction and min-idle
    /// replenishment).
    pub maintenance_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            min_idle: 1,
            idle_timeout: Some(Duration::from_secs(600)),
            validation_query: Some(Arc::from("SELECT 1")),
            acquisition_timeout: Duration::from_secs(30),
            maintenance_interval: Duration::from_secs(30),
        }
    }
}

impl PoolConfig {
    /// Default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection cap.
    #[must_use]
    pub fn max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent = n;
        self
    }

    /// Set the warm-idle floor.
    #[must_use]
    pub fn min_idle(mut self, n: usize) -> Self {
        self.min_idle = n;
        self
    }

    /// Set or clear the idle timeout.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set or clear the checkout validation query.
    #[must_use]
    pub fn validation_query(mut self, query: Option<&str>) -> Self {
        self.validation_query = query.map(Arc::from);
        self
    }

    /// Set the acquisition timeout.
    #[must_use]
    pub fn acquisition_timeout(mut self, timeout: Duration) -> Self {
        self.acquisition_timeout = timeout;
        self
    }

    /// Check internal consistency.
    pub fn validate<E>(&self) -> Result<(), PoolError<E>> {
        if self.max_concurrent == 0 {
            return Err(PoolError::Configuration("max_concurrent must be positive"));
        }
        if self.min_idle > self.max_concurrent {
            return Err(PoolError::Configuration(
                "min_idle cannot exceed max_concurrent",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        PoolConfig::default().validate::<std::io::Error>().unwrap();
    }

    #[test]
    fn zero_capacity_rejected() {
        let config = PoolConfig::new().max_concurrent(0);
        assert!(config.validate::<std::io::Error>().is_err());
    }

    #[test]
    fn min_idle_above_capacity_rejected() {
        let config = PoolConfig::new().max_concurrent(2).min_idle(3);
        assert!(config.validate::<std::io::Error>().is_err());
    }
}
