//! Durable stream configuration.

/// Policies applied by a durable stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Commit immediately after every successful mutation.
    pub auto_commit: bool,

    /// Roll back immediately after any failed mutation.
    pub auto_rollback: bool,

    /// Flush the target after every successful mutation, before commit.
    pub auto_flush: bool,

    /// Sync the backup log after each appended record (safer but slower).
    pub sync_backup: bool,

    /// Treat a truncated final record in an existing log as a clean end.
    ///
    /// A record cut short by a crash was never followed by its mutation,
    /// so dropping it loses nothing.
    pub tolerate_torn_tail: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            auto_commit: false,
            auto_rollback: true,
            auto_flush: false,
            sync_backup: true,
            tolerate_torn_tail: true,
        }
    }
}

impl StreamConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to commit after every successful mutation.
    #[must_use]
    pub const fn auto_commit(mut self, value: bool) -> Self {
        self.auto_commit = value;
        self
    }

    /// Sets whether to roll back after a failed mutation.
    #[must_use]
    pub const fn auto_rollback(mut self, value: bool) -> Self {
        self.auto_rollback = value;
        self
    }

    /// Sets whether to flush the target after every mutation.
    #[must_use]
    pub const fn auto_flush(mut self, value: bool) -> Self {
        self.auto_flush = value;
        self
    }

    /// Sets whether to sync the backup log after each record.
    #[must_use]
    pub const fn sync_backup(mut self, value: bool) -> Self {
        self.sync_backup = value;
        self
    }

    /// Sets whether a torn final record is tolerated when opening a log.
    #[must_use]
    pub const fn tolerate_torn_tail(mut self, value: bool) -> Self {
        self.tolerate_torn_tail = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = StreamConfig::default();
        assert!(!config.auto_commit);
        assert!(config.auto_rollback);
        assert!(!config.auto_flush);
        assert!(config.sync_backup);
    }

    #[test]
    fn builder_pattern() {
        let config = StreamConfig::new()
            .auto_commit(true)
            .auto_rollback(false)
            .auto_flush(true)
            .sync_backup(false);

        assert!(config.auto_commit);
        assert!(!config.auto_rollback);
        assert!(config.auto_flush);
        assert!(!config.sync_backup);
    }
}
