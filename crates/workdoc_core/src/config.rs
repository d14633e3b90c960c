//! Work unit configuration.

use std::time::Duration;

/// Default bound on waiting for a contended row lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(8);

/// Default pause between locking attempts.
pub const DEFAULT_RETRY_PAUSE: Duration = Duration::from_millis(50);

/// Configuration shared by work units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkDocConfig {
    /// How long open and the post-write checks wait for a contended row lock.
    pub lock_timeout: Duration,

    /// Pause between locking attempts while contended.
    pub retry_pause: Duration,

    /// Whether opened documents assign automatic ids to new elements.
    pub auto_ids: bool,
}

impl Default for WorkDocConfig {
    fn default() -> Self {
        Self {
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            retry_pause: DEFAULT_RETRY_PAUSE,
            auto_ids: false,
        }
    }
}

impl WorkDocConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the row lock timeout.
    #[must_use]
    pub const fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Sets the pause between locking attempts.
    #[must_use]
    pub const fn retry_pause(mut self, pause: Duration) -> Self {
        self.retry_pause = pause;
        self
    }

    /// Sets whether new elements get automatic ids.
    #[must_use]
    pub const fn auto_ids(mut self, value: bool) -> Self {
        self.auto_ids = value;
        self
    }
}
