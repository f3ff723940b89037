//! Persistent tier of the cache.

use crate::domain::cache::Cached;
use crate::domain::error::FutdataError;

/// Durable key/value storage for serialized cache entries.
///
/// `store(key, None)` records a negative entry, which `load` must report as
/// [`Cached::Absent`] rather than [`Cached::NotCached`].
pub trait CachePort: Send + Sync {
    fn load(&self, key: &str) -> Result<Cached<String>, FutdataError>;

    fn store(&self, key: &str, value: Option<&str>) -> Result<(), FutdataError>;
}
