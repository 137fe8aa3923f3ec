//! Mapper configuration.

use std::time::Duration;

/// Configuration for a [`MemoryMapper`](crate::MemoryMapper).
#[derive(Debug, Clone)]
pub struct MapperConfig {
    /// How long a lock stays valid without being re-acquired.
    ///
    /// An expired lock may be taken over by another owner.
    pub lock_lease: Duration,

    /// First key assigned in every table.
    pub first_key: i64,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            lock_lease: Duration::from_secs(30),
            first_key: 1,
        }
    }
}

impl MapperConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the lock lease.
    #[must_use]
    pub const fn lock_lease(mut self, lease: Duration) -> Self {
        self.lock_lease = lease;
        self
    }

    /// Sets the first assigned key.
    #[must_use]
    pub const fn first_key(mut self, key: i64) -> Self {
        self.first_key = key;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = MapperConfig::default();
        assert_eq!(config.lock_lease, Duration::from_secs(30));
        assert_eq!(config.first_key, 1);
    }

    #[test]
    fn builder_pattern() {
        let config = MapperConfig::new()
            .lock_lease(Duration::from_millis(5))
            .first_key(100);
        assert_eq!(config.lock_lease, Duration::from_millis(5));
        assert_eq!(config.first_key, 100);
    }
}
