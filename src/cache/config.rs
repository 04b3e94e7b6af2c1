//! Cache configuration.
//!
//! Shared by every loading cache instance via `plaza.toml`.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

// Default values for cache configuration
const DEFAULT_MAX_SIZE: usize = 15;
const DEFAULT_EXPIRE_SECONDS: u64 = 180;

/// Cache configuration from `plaza.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum live entries per cache instance.
    pub max_size: usize,
    /// Time-to-live measured from the moment an entry is stored.
    pub expire_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            expire_seconds: DEFAULT_EXPIRE_SECONDS,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            max_size: settings.max_size.get(),
            expire_seconds: settings.expire_seconds.get(),
        }
    }
}

impl CacheConfig {
    /// Returns the size bound as NonZeroUsize, clamping to 1 if zero.
    pub fn max_size_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_size).unwrap_or(NonZeroUsize::MIN)
    }

    /// Returns the write TTL, clamping to one second if zero.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.expire_seconds.max(1))
    }
}
