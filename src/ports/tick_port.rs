//! Tick-series store port.

use crate::domain::error::FutdataError;
use crate::domain::table::Cell;
use crate::domain::trading_day::{Deadline, TradingDay};

/// What to select: the symbol's table, the caller's column list (in output
/// order) and the column rows are ordered by.
#[derive(Debug, Clone, Copy)]
pub struct TickQuery<'a> {
    pub symbol: &'a str,
    pub columns: &'a [String],
    pub index: &'a str,
}

pub trait TickStore: Send + Sync {
    /// Rows with `TradingDay = day`, ordered by the index column.
    fn query_day(
        &self,
        query: &TickQuery<'_>,
        day: TradingDay,
        deadline: Deadline,
    ) -> Result<Vec<Vec<Cell>>, FutdataError>;

    /// Rows with `begin <= TradingDay < end`, ordered by the index column.
    fn query_range(
        &self,
        query: &TickQuery<'_>,
        begin: TradingDay,
        end: TradingDay,
        deadline: Deadline,
    ) -> Result<Vec<Vec<Cell>>, FutdataError>;
}
