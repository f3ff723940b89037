//! Reference-metadata store port: trading-day calendar, per-product and
//! per-instrument daily records.

use crate::domain::error::FutdataError;
use crate::domain::records::{InstrumentRecord, ProductRecord, TradingDayRecord};
use crate::domain::trading_day::{Deadline, TradingDay};

/// Which per-entity domain a calendar navigation query walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordDomain {
    Product,
    Instrument,
}

/// Read-only access to reference records. Absence is `Ok(None)`.
///
/// Implementations lower-case product and instrument names before querying.
pub trait ReferenceStore: Send + Sync {
    fn trading_day_record(
        &self,
        day: TradingDay,
        deadline: Deadline,
    ) -> Result<Option<TradingDayRecord>, FutdataError>;

    fn product_record(
        &self,
        product: &str,
        day: TradingDay,
        deadline: Deadline,
    ) -> Result<Option<ProductRecord>, FutdataError>;

    fn instrument_record(
        &self,
        instrument: &str,
        day: TradingDay,
        deadline: Deadline,
    ) -> Result<Option<InstrumentRecord>, FutdataError>;

    /// Latest recorded day strictly before `day` for `key` in `domain`.
    fn last_trading_day_before(
        &self,
        domain: RecordDomain,
        key: &str,
        day: TradingDay,
        deadline: Deadline,
    ) -> Result<Option<TradingDay>, FutdataError>;

    /// Earliest recorded day strictly after `day` for `key` in `domain`.
    fn next_trading_day_after(
        &self,
        domain: RecordDomain,
        key: &str,
        day: TradingDay,
        deadline: Deadline,
    ) -> Result<Option<TradingDay>, FutdataError>;
}
