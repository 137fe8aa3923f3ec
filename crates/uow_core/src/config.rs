//! Transaction configuration.

/// Configuration shared by the transactions a manager begins.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of persistence passes one `commit()` may run.
    ///
    /// Each unresolved reference reported by the mapper costs one extra
    /// pass. Values below 1 are treated as 1.
    pub max_commit_attempts: usize,

    /// Whether `rollback()` also untracks entities registered as new.
    ///
    /// When false, new entities stay pending and are inserted by the
    /// next commit.
    pub discard_new_on_rollback: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_commit_attempts: 16,
            discard_new_on_rollback: false,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the commit pass limit.
    #[must_use]
    pub const fn max_commit_attempts(mut self, value: usize) -> Self {
        self.max_commit_attempts = value;
        self
    }

    /// Sets whether rollback discards new entities.
    #[must_use]
    pub const fn discard_new_on_rollback(mut self, value: bool) -> Self {
        self.discard_new_on_rollback = value;
        self
    }

    pub(crate) fn commit_attempts(&self) -> usize {
        self.max_commit_attempts.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.max_commit_attempts, 16);
        assert!(!config.discard_new_on_rollback);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .max_commit_attempts(3)
            .discard_new_on_rollback(true);

        assert_eq!(config.max_commit_attempts, 3);
        assert!(config.discard_new_on_rollback);
    }

    #[test]
    fn zero_attempts_still_runs_once() {
        assert_eq!(Config::new().max_commit_attempts(0).commit_attempts(), 1);
    }
}
