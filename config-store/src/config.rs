use std::path::PathBuf;
use std::time::Duration;

/// Retry range for snapshot saves.
///
/// `(0, 0)` selects synchronous mode: every mutation is saved before its
/// response is sent. Any other value debounces saves behind a timer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackoffConfig {
    pub initial: Duration,
    pub max: Duration,
}

impl BackoffConfig {
    pub fn synchronous() -> Self {
        Self::default()
    }

    pub fn debounced(initial: Duration, max: Duration) -> Self {
        Self { initial, max }
    }

    pub fn is_synchronous(&self) -> bool {
        self.initial.is_zero() && self.max.is_zero()
    }
}

/// Everything the service needs besides a source of requests.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// File holding the persisted snapshot.
    pub storage_path: PathBuf,
    pub save_backoff: BackoffConfig,
}

impl StoreConfig {
    pub fn new(storage_path: impl Into<PathBuf>) -> Self {
        Self {
            storage_path: storage_path.into(),
            save_backoff: BackoffConfig::synchronous(),
        }
    }

    pub fn with_save_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.save_backoff = BackoffConfig::debounced(initial, max);
        self
    }
}
