//! Tick-table fetching for resolved symbols.

use crate::domain::cache::{Cache, CacheKeys};
use crate::domain::error::FutdataError;
use crate::domain::register_key::RegisterKey;
use crate::domain::resolver::Resolver;
use crate::domain::table::{Cell, Table};
use crate::domain::trading_day::{Deadline, TradingDay};
use crate::ports::tick_port::{TickQuery, TickStore};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_INDEX: &str = "HappenTime";

/// Serves single-day and day-range tick tables.
///
/// Column names are lower-cased, matching how the tick store names them.
pub struct DataFetcher {
    resolver: Resolver,
    ticks: Box<dyn TickStore>,
    cache: Arc<Cache>,
    keys: CacheKeys,
    columns: Vec<String>,
    timeout: Option<Duration>,
}

impl DataFetcher {
    pub fn new(resolver: Resolver, ticks: Box<dyn TickStore>, columns: Vec<String>) -> Self {
        let cache = resolver.cache().clone();
        Self {
            resolver,
            ticks,
            cache,
            keys: CacheKeys::default(),
            columns: columns.iter().map(|c| c.to_lowercase()).collect(),
            timeout: None,
        }
    }

    pub fn with_keys(mut self, keys: CacheKeys) -> Self {
        self.resolver = self.resolver.with_keys(keys.clone());
        self.keys = keys;
        self
    }

    /// Bounds each public operation; the reference and tick calls it makes
    /// share one deadline.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.resolver = self.resolver.with_timeout(timeout);
        self.timeout = timeout;
        self
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn fetch_symbol(&self, key: &RegisterKey, day: TradingDay) -> Result<Option<String>, FutdataError> {
        self.resolver.resolve_symbol(key, day)
    }

    /// Rows of `symbol` on `day`, ordered by `index`.
    ///
    /// No rows is `None`, and with `use_cache` that `None` is cached like any
    /// other result. Without `use_cache` the cache is neither read nor
    /// written.
    pub fn fetch_day_table(
        &self,
        symbol: &str,
        day: TradingDay,
        use_cache: bool,
        index: &str,
    ) -> Result<Option<Table>, FutdataError> {
        self.day_table_by(symbol, day, use_cache, index, self.deadline())
    }

    fn day_table_by(
        &self,
        symbol: &str,
        day: TradingDay,
        use_cache: bool,
        index: &str,
        deadline: Deadline,
    ) -> Result<Option<Table>, FutdataError> {
        let symbol = symbol.to_lowercase();
        let index = index.to_lowercase();
        let load = || self.load_day(&symbol, day, &index, deadline);

        if !use_cache {
            return load();
        }
        let key = self.keys.market(&symbol, day);
        self.cache.get_or_load(&key, load)
    }

    /// Resolves `key` on `day` and fetches the day's table for the result.
    pub fn fetch_register_table(
        &self,
        key: &RegisterKey,
        day: TradingDay,
        index: &str,
    ) -> Result<Option<Table>, FutdataError> {
        let deadline = self.deadline();
        match self.resolver.resolve_symbol_by(key, day, deadline)? {
            Some(symbol) => self.day_table_by(&symbol, day, true, index, deadline),
            None => Ok(None),
        }
    }

    /// Rows of every symbol in `symbols` with `begin <= day < end`, merged by
    /// `index`. Never cached; no rows is an empty table, not `None`.
    pub fn fetch_range_table<S: AsRef<str>>(
        &self,
        symbols: &[S],
        begin: TradingDay,
        end: TradingDay,
        index: &str,
    ) -> Result<Table, FutdataError> {
        let index = index.to_lowercase();
        let mut table = Table::new(self.columns.clone(), &index)?;
        let index_pos = self
            .columns
            .iter()
            .position(|c| *c == index)
            .ok_or_else(|| FutdataError::invalid(format!("index column {index:?} not selected")))?;

        let deadline = self.deadline();
        let mut rows = Vec::new();
        for symbol in symbols {
            let symbol = symbol.as_ref().to_lowercase();
            let query = TickQuery {
                symbol: &symbol,
                columns: &self.columns,
                index: &index,
            };
            let fetched = self.ticks.query_range(&query, begin, end, deadline)?;
            debug!(%symbol, %begin, %end, rows = fetched.len(), "range query");
            if let Some(bad) = fetched.iter().find(|r| r.len() != self.columns.len()) {
                return Err(FutdataError::invalid(format!(
                    "{symbol} returned a row of {} cells for {} columns",
                    bad.len(),
                    self.columns.len()
                )));
            }
            rows.extend(fetched);
        }

        if symbols.len() > 1 {
            rows.sort_by(|a: &Vec<Cell>, b: &Vec<Cell>| {
                a[index_pos]
                    .partial_cmp(&b[index_pos])
                    .unwrap_or(Ordering::Equal)
            });
        }
        for row in rows {
            table.add_row(row)?;
        }
        Ok(table)
    }

    fn load_day(
        &self,
        symbol: &str,
        day: TradingDay,
        index: &str,
        deadline: Deadline,
    ) -> Result<Option<Table>, FutdataError> {
        // validates the column set before touching the store
        let mut table = Table::new(self.columns.clone(), index)?;
        let query = TickQuery {
            symbol,
            columns: &self.columns,
            index,
        };
        let rows = self.ticks.query_day(&query, day, deadline)?;
        info!(%symbol, %day, rows = rows.len(), "fetched day table");
        if rows.is_empty() {
            return Ok(None);
        }
        for row in rows {
            table.add_row(row)?;
        }
        Ok(Some(table))
    }

    fn deadline(&self) -> Deadline {
        Deadline::after(self.timeout)
    }
}
