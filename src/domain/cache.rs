//! Two-tier memoization cache shared by resolvers and fetchers.
//!
//! The memory tier keeps typed values; the optional persistent tier
//! ([`CachePort`]) keeps their JSON form across restarts. Entries are never
//! invalidated: the backing stores hold immutable history.

use crate::domain::error::FutdataError;
use crate::domain::trading_day::TradingDay;
use crate::ports::cache_port::CachePort;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// State of one cache key. "Looked up and found nothing" (`Absent`) is a
/// distinct, cacheable outcome from "never looked up" (`NotCached`).
#[derive(Debug, Clone, PartialEq)]
pub enum Cached<T> {
    NotCached,
    Absent,
    Present(T),
}

impl<T> Cached<T> {
    pub fn is_cached(&self) -> bool {
        !matches!(self, Cached::NotCached)
    }

    /// `None` for `NotCached`, otherwise the cached optional value.
    pub fn into_option(self) -> Option<Option<T>> {
        match self {
            Cached::NotCached => None,
            Cached::Absent => Some(None),
            Cached::Present(v) => Some(Some(v)),
        }
    }
}

type Slot = Cached<Arc<dyn Any + Send + Sync>>;

pub struct Cache {
    slots: Mutex<HashMap<String, Arc<Mutex<Slot>>>>,
    store: Option<Box<dyn CachePort>>,
}

impl Cache {
    pub fn in_memory() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            store: None,
        }
    }

    /// Cache backed by a persistent tier.
    pub fn with_store(store: Box<dyn CachePort>) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            store: Some(store),
        }
    }

    /// Returns the cached value for `key`, running `loader` on a miss.
    ///
    /// Whatever the loader returns, including `None`, is stored under `key`,
    /// so a known-absent lookup never reaches the backing store again.
    /// Concurrent callers for the same key wait for the first loader instead
    /// of running their own. A loader error is returned and nothing is
    /// stored. A persistent entry that no longer decodes counts as a miss and
    /// is overwritten. The loader must not call back into the cache for the
    /// same key.
    pub fn get_or_load<V, F>(&self, key: &str, loader: F) -> Result<Option<V>, FutdataError>
    where
        V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
        F: FnOnce() -> Result<Option<V>, FutdataError>,
    {
        let slot = self.slot(key);
        let mut guard = slot.lock();

        if let Some(value) = read_slot::<V>(key, &guard)? {
            debug!(key, "cache hit");
            return Ok(value);
        }

        if let Some(store) = &self.store {
            match decode::<V>(key, store.load(key)?) {
                Cached::Present(value) => {
                    debug!(key, "cache hit (persistent)");
                    *guard = Cached::Present(Arc::new(value.clone()));
                    return Ok(Some(value));
                }
                Cached::Absent => {
                    debug!(key, "cache hit (persistent, absent)");
                    *guard = Cached::Absent;
                    return Ok(None);
                }
                Cached::NotCached => {}
            }
        }

        debug!(key, "cache miss, loading");
        let value = loader()?;

        if let Some(store) = &self.store {
            let text = value.as_ref().map(serde_json::to_string).transpose()?;
            if let Err(e) = store.store(key, text.as_deref()) {
                warn!(key, error = %e, "failed to persist cache entry");
            }
        }

        *guard = match &value {
            Some(v) => Cached::Present(Arc::new(v.clone())),
            None => Cached::Absent,
        };
        Ok(value)
    }

    /// Peeks at `key` without loading. Consults the persistent tier but does
    /// not promote what it finds.
    pub fn lookup<V>(&self, key: &str) -> Result<Cached<V>, FutdataError>
    where
        V: DeserializeOwned + Clone + 'static,
    {
        let slot = {
            let slots = self.slots.lock();
            slots.get(key).cloned()
        };
        if let Some(slot) = slot {
            let guard = slot.lock();
            match read_slot::<V>(key, &guard)? {
                Some(Some(v)) => return Ok(Cached::Present(v)),
                Some(None) => return Ok(Cached::Absent),
                None => {}
            }
        }

        match &self.store {
            Some(store) => Ok(decode(key, store.load(key)?)),
            None => Ok(Cached::NotCached),
        }
    }

    /// Number of keys resolved in the memory tier.
    pub fn len(&self) -> usize {
        let slots: Vec<_> = self.slots.lock().values().cloned().collect();
        slots.iter().filter(|s| s.lock().is_cached()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, key: &str) -> Arc<Mutex<Slot>> {
        let mut slots = self.slots.lock();
        slots
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Cached::NotCached)))
            .clone()
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// Undecodable text is reported as `NotCached`.
fn decode<V: DeserializeOwned>(key: &str, entry: Cached<String>) -> Cached<V> {
    match entry {
        Cached::Present(text) => match serde_json::from_str(&text) {
            Ok(value) => Cached::Present(value),
            Err(e) => {
                warn!(key, error = %e, "discarding undecodable cache entry");
                Cached::NotCached
            }
        },
        Cached::Absent => Cached::Absent,
        Cached::NotCached => Cached::NotCached,
    }
}

/// `None` when the slot is unresolved.
fn read_slot<V: Clone + 'static>(key: &str, slot: &Slot) -> Result<Option<Option<V>>, FutdataError> {
    match slot {
        Cached::NotCached => Ok(None),
        Cached::Absent => Ok(Some(None)),
        Cached::Present(any) => match (**any).downcast_ref::<V>() {
            Some(v) => Ok(Some(Some(v.clone()))),
            None => Err(FutdataError::Cache {
                reason: format!("entry {key:?} holds a different type"),
            }),
        },
    }
}

/// Formats of the keys under which reference records and tick tables are
/// cached: `<domain>_{day}` and `<domain>_{name}_{day}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKeys {
    pub trading_day_domain: String,
    pub product_domain: String,
    pub instrument_domain: String,
    pub market_domain: String,
}

impl Default for CacheKeys {
    fn default() -> Self {
        Self {
            trading_day_domain: "ChineseFuturesTradingDay".into(),
            product_domain: "ChineseFuturesProduct".into(),
            instrument_domain: "ChineseFuturesInstrument".into(),
            market_domain: "ChineseFuturesMarket".into(),
        }
    }
}

impl CacheKeys {
    pub fn with_market(mut self, market: impl Into<String>) -> Self {
        self.market_domain = market.into();
        self
    }

    pub fn trading_day(&self, day: TradingDay) -> String {
        format!("{}_{}", self.trading_day_domain, day)
    }

    pub fn product(&self, product: &str, day: TradingDay) -> String {
        format!("{}_{}_{}", self.product_domain, product, day)
    }

    pub fn instrument(&self, instrument: &str, day: TradingDay) -> String {
        format!("{}_{}_{}", self.instrument_domain, instrument, day)
    }

    pub fn market(&self, symbol: &str, day: TradingDay) -> String {
        format!("{}_{}_{}", self.market_domain, symbol, day)
    }
}
