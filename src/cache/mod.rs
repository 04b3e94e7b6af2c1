//! Plaza Cache System
//!
//! Provides an on-demand loading cache for hot, read-heavy query results:
//!
//! - **Single-flight loads**: concurrent misses for one key share one load
//! - **Size bound**: at most `max_size` live entries, LRU eviction
//! - **Write TTL**: entries expire `expire_seconds` after they were stored
//!
//! ## Configuration
//!
//! Cache behavior is controlled via `plaza.toml`:
//!
//! ```toml
//! [cache]
//! max_size = 15
//! expire_seconds = 180
//! ```

mod config;
mod keys;
mod loading;
pub(crate) mod lock;

pub use config::CacheConfig;
pub use keys::PostListKey;
pub use loading::{CacheLoader, LoadingCache};
