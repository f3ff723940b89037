//! Symbol resolution: (product | instrument, trading day) -> tradable symbol.
//!
//! Record lookups go through the shared [`Cache`]; calendar navigation
//! always queries the reference store.

use crate::domain::cache::{Cache, CacheKeys};
use crate::domain::error::FutdataError;
use crate::domain::records::{InstrumentRecord, ProductRecord, TradingDayRecord};
use crate::domain::register_key::RegisterKey;
use crate::domain::trading_day::{Deadline, TradingDay};
use crate::ports::reference_port::{RecordDomain, ReferenceStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct Resolver {
    cache: Arc<Cache>,
    store: Box<dyn ReferenceStore>,
    keys: CacheKeys,
    timeout: Option<Duration>,
}

impl Resolver {
    pub fn new(cache: Arc<Cache>, store: Box<dyn ReferenceStore>) -> Self {
        Self {
            cache,
            store,
            keys: CacheKeys::default(),
            timeout: None,
        }
    }

    pub fn with_keys(mut self, keys: CacheKeys) -> Self {
        self.keys = keys;
        self
    }

    /// Bounds each public operation. Every reference-store call it makes
    /// shares one deadline, taken when the operation starts.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    pub(crate) fn deadline(&self) -> Deadline {
        Deadline::after(self.timeout)
    }

    pub fn trading_day_record(&self, day: TradingDay) -> Result<Option<TradingDayRecord>, FutdataError> {
        let key = self.keys.trading_day(day);
        self.cache
            .get_or_load(&key, || self.store.trading_day_record(day, self.deadline()))
    }

    pub fn product_record(
        &self,
        product: &str,
        day: TradingDay,
    ) -> Result<Option<ProductRecord>, FutdataError> {
        self.product_record_by(product, day, self.deadline())
    }

    pub fn instrument_record(
        &self,
        instrument: &str,
        day: TradingDay,
    ) -> Result<Option<InstrumentRecord>, FutdataError> {
        self.instrument_record_by(instrument, day, self.deadline())
    }

    fn product_record_by(
        &self,
        product: &str,
        day: TradingDay,
        deadline: Deadline,
    ) -> Result<Option<ProductRecord>, FutdataError> {
        let product = product.to_lowercase();
        let key = self.keys.product(&product, day);
        self.cache
            .get_or_load(&key, || self.store.product_record(&product, day, deadline))
    }

    fn instrument_record_by(
        &self,
        instrument: &str,
        day: TradingDay,
        deadline: Deadline,
    ) -> Result<Option<InstrumentRecord>, FutdataError> {
        let instrument = instrument.to_lowercase();
        let key = self.keys.instrument(&instrument, day);
        self.cache
            .get_or_load(&key, || self.store.instrument_record(&instrument, day, deadline))
    }

    pub fn is_trading_day(&self, day: TradingDay) -> Result<bool, FutdataError> {
        Ok(self.trading_day_record(day)?.is_some())
    }

    /// Products traded on `day`, sorted; empty when `day` is not a trading day.
    pub fn fetch_available_product(&self, day: TradingDay) -> Result<Vec<String>, FutdataError> {
        Ok(self
            .trading_day_record(day)?
            .map(|r| r.product_list.into_iter().collect())
            .unwrap_or_default())
    }

    pub fn product_is_available(&self, product: &str, day: TradingDay) -> Result<bool, FutdataError> {
        Ok(self.product_record(product, day)?.is_some())
    }

    pub fn fetch_dominant(&self, product: &str, day: TradingDay) -> Result<Option<String>, FutdataError> {
        Ok(self
            .product_record(product, day)?
            .and_then(|r| r.contract(false).map(str::to_string)))
    }

    pub fn fetch_sub_dominant(
        &self,
        product: &str,
        day: TradingDay,
    ) -> Result<Option<String>, FutdataError> {
        Ok(self
            .product_record(product, day)?
            .and_then(|r| r.contract(true).map(str::to_string)))
    }

    /// Instruments of `product` traded on `day`, in record order.
    pub fn fetch_available_instrument(
        &self,
        product: &str,
        day: TradingDay,
    ) -> Result<Vec<String>, FutdataError> {
        Ok(self
            .product_record(product, day)?
            .map(|r| r.instrument_list)
            .unwrap_or_default())
    }

    pub fn instrument_is_available(
        &self,
        instrument: &str,
        day: TradingDay,
    ) -> Result<bool, FutdataError> {
        Ok(self.instrument_record(instrument, day)?.is_some())
    }

    pub fn product_last_trading_day(
        &self,
        product: &str,
        day: TradingDay,
    ) -> Result<Option<TradingDay>, FutdataError> {
        self.store.last_trading_day_before(
            RecordDomain::Product,
            &product.to_lowercase(),
            day,
            self.deadline(),
        )
    }

    pub fn product_next_trading_day(
        &self,
        product: &str,
        day: TradingDay,
    ) -> Result<Option<TradingDay>, FutdataError> {
        self.store.next_trading_day_after(
            RecordDomain::Product,
            &product.to_lowercase(),
            day,
            self.deadline(),
        )
    }

    pub fn instrument_last_trading_day(
        &self,
        instrument: &str,
        day: TradingDay,
    ) -> Result<Option<TradingDay>, FutdataError> {
        self.store.last_trading_day_before(
            RecordDomain::Instrument,
            &instrument.to_lowercase(),
            day,
            self.deadline(),
        )
    }

    pub fn instrument_next_trading_day(
        &self,
        instrument: &str,
        day: TradingDay,
    ) -> Result<Option<TradingDay>, FutdataError> {
        self.store.next_trading_day_after(
            RecordDomain::Instrument,
            &instrument.to_lowercase(),
            day,
            self.deadline(),
        )
    }

    /// Resolves `key` to the lower-cased symbol to fetch on `day`.
    ///
    /// A product key selects the day's dominant (or sub-dominant) contract,
    /// an instrument key is taken as is; either way the instrument must have
    /// a record for `day`. An index key resolves to the product itself when
    /// the product traded that day.
    pub fn resolve_symbol(&self, key: &RegisterKey, day: TradingDay) -> Result<Option<String>, FutdataError> {
        self.resolve_symbol_by(key, day, self.deadline())
    }

    pub(crate) fn resolve_symbol_by(
        &self,
        key: &RegisterKey,
        day: TradingDay,
        deadline: Deadline,
    ) -> Result<Option<String>, FutdataError> {
        key.validate()?;
        let (product, instrument, sub_dominant) = match key {
            RegisterKey::Index { product } => {
                let product = product.to_lowercase();
                let available = self.product_record_by(&product, day, deadline)?.is_some();
                debug!(%day, %product, available, "resolved index key");
                return Ok(available.then_some(product));
            }
            RegisterKey::Instrument {
                product,
                instrument,
                sub_dominant,
            } => (product, instrument, *sub_dominant),
        };

        let candidate = match product {
            Some(product) => {
                let contract = self
                    .product_record_by(product, day, deadline)?
                    .and_then(|r| r.contract(sub_dominant).map(str::to_string));
                if contract.is_none() {
                    debug!(%day, %product, sub_dominant, "no contract for product");
                }
                contract
            }
            None => instrument.clone(),
        };

        let Some(candidate) = candidate.map(|s| s.to_lowercase()) else {
            return Ok(None);
        };
        if self.instrument_record_by(&candidate, day, deadline)?.is_none() {
            debug!(%day, instrument = %candidate, "instrument not traded");
            return Ok(None);
        }
        Ok(Some(candidate))
    }
}
