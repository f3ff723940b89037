//! SQLite reference and tick stores, opened read-only.

use crate::adapters::sql::{
    column_list, quote_identifier, INSTRUMENT_TABLE, PRODUCT_TABLE, TICK_DAY_COLUMN,
    TRADING_DAY_TABLE,
};
use crate::domain::error::FutdataError;
use crate::domain::records::{InstrumentRecord, ProductRecord, TradingDayRecord};
use crate::domain::table::Cell;
use crate::domain::trading_day::{Deadline, TradingDay};
use crate::ports::config_port::ConfigPort;
use crate::ports::reference_port::{RecordDomain, ReferenceStore};
use crate::ports::tick_port::{TickQuery, TickStore};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::ValueRef;
use rusqlite::{params, OpenFlags, OptionalExtension};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::debug;

/// Schema the reference store reads. Lists are JSON arrays of strings.
pub const REFERENCE_SCHEMA: &str = "CREATE TABLE IF NOT EXISTS trading_day (
        trading_day TEXT PRIMARY KEY,
        product_list TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS product (
        product TEXT NOT NULL,
        trading_day TEXT NOT NULL,
        dominant TEXT,
        sub_dominant TEXT,
        instrument_list TEXT NOT NULL,
        PRIMARY KEY (product, trading_day)
    );
    CREATE TABLE IF NOT EXISTS instrument (
        instrument TEXT NOT NULL,
        trading_day TEXT NOT NULL,
        PRIMARY KEY (instrument, trading_day)
    );";

fn db_err(e: impl std::fmt::Display) -> FutdataError {
    FutdataError::Database {
        reason: e.to_string(),
    }
}

fn query_err(e: rusqlite::Error) -> FutdataError {
    FutdataError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn parse_day(text: &str) -> Result<TradingDay, FutdataError> {
    TradingDay::parse(text).map_err(|_| FutdataError::DatabaseQuery {
        reason: format!("malformed trading day {text:?} in store"),
    })
}

fn parse_list(text: &str) -> Result<Vec<String>, FutdataError> {
    serde_json::from_str(text).map_err(|e| FutdataError::DatabaseQuery {
        reason: format!("malformed list {text:?}: {e}"),
    })
}

/// Read-only connection pool over one SQLite file.
struct ReadOnlyPool {
    pool: Pool<SqliteConnectionManager>,
}

impl ReadOnlyPool {
    fn open<P: AsRef<Path>>(path: P, pool_size: u32) -> Result<Self, FutdataError> {
        let manager = SqliteConnectionManager::file(path.as_ref())
            .with_flags(OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX);
        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .build(manager)
            .map_err(|e: r2d2::Error| db_err(e))?;
        Ok(Self { pool })
    }

    /// Pooled connection whose acquisition and busy waits are bounded by
    /// `deadline`.
    fn get(
        &self,
        deadline: Deadline,
        operation: &str,
    ) -> Result<PooledConnection<SqliteConnectionManager>, FutdataError> {
        deadline.check(operation)?;
        let conn = match deadline.remaining() {
            Some(remaining) => self.pool.get_timeout(remaining),
            None => self.pool.get(),
        };
        let conn = conn.map_err(|e: r2d2::Error| {
            if deadline.is_expired() {
                FutdataError::DeadlineExceeded {
                    operation: operation.to_string(),
                }
            } else {
                db_err(e)
            }
        })?;
        if let Some(remaining) = deadline.remaining() {
            conn.busy_timeout(remaining).map_err(query_err)?;
        }
        Ok(conn)
    }
}

fn pool_from_config(config: &dyn ConfigPort, section: &str) -> Result<ReadOnlyPool, FutdataError> {
    let path = config
        .get_string(section, "path")
        .ok_or_else(|| FutdataError::ConfigMissing {
            section: section.into(),
            key: "path".into(),
        })?;
    let pool_size = config.get_int(section, "pool_size", 4);
    if pool_size < 1 {
        return Err(FutdataError::ConfigInvalid {
            section: section.into(),
            key: "pool_size".into(),
            reason: "must be at least 1".into(),
        });
    }
    ReadOnlyPool::open(path, pool_size as u32)
}

pub struct SqliteReferenceStore {
    pool: ReadOnlyPool,
}

impl SqliteReferenceStore {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, FutdataError> {
        Ok(Self {
            pool: pool_from_config(config, "reference")?,
        })
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, FutdataError> {
        Ok(Self {
            pool: ReadOnlyPool::open(path, 4)?,
        })
    }
}

impl ReferenceStore for SqliteReferenceStore {
    fn trading_day_record(
        &self,
        day: TradingDay,
        deadline: Deadline,
    ) -> Result<Option<TradingDayRecord>, FutdataError> {
        let conn = self.pool.get(deadline, "trading day lookup")?;
        let query = format!("SELECT product_list FROM {TRADING_DAY_TABLE} WHERE trading_day = ?1");
        let list: Option<String> = conn
            .query_row(&query, params![day.to_string()], |row| row.get(0))
            .optional()
            .map_err(query_err)?;

        list.map(|text| {
            Ok(TradingDayRecord {
                trading_day: day,
                product_list: parse_list(&text)?.into_iter().collect::<BTreeSet<_>>(),
            })
        })
        .transpose()
    }

    fn product_record(
        &self,
        product: &str,
        day: TradingDay,
        deadline: Deadline,
    ) -> Result<Option<ProductRecord>, FutdataError> {
        let product = product.to_lowercase();
        let conn = self.pool.get(deadline, "product lookup")?;
        let query = format!(
            "SELECT dominant, sub_dominant, instrument_list FROM {PRODUCT_TABLE}
             WHERE product = ?1 AND trading_day = ?2"
        );
        let row: Option<(Option<String>, Option<String>, String)> = conn
            .query_row(&query, params![product, day.to_string()], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })
            .optional()
            .map_err(query_err)?;

        row.map(|(dominant, sub_dominant, list)| {
            Ok(ProductRecord {
                product: product.clone(),
                trading_day: day,
                dominant,
                sub_dominant,
                instrument_list: parse_list(&list)?,
            })
        })
        .transpose()
    }

    fn instrument_record(
        &self,
        instrument: &str,
        day: TradingDay,
        deadline: Deadline,
    ) -> Result<Option<InstrumentRecord>, FutdataError> {
        let instrument = instrument.to_lowercase();
        let conn = self.pool.get(deadline, "instrument lookup")?;
        let query = format!(
            "SELECT 1 FROM {INSTRUMENT_TABLE} WHERE instrument = ?1 AND trading_day = ?2"
        );
        let found: Option<i64> = conn
            .query_row(&query, params![instrument, day.to_string()], |row| row.get(0))
            .optional()
            .map_err(query_err)?;

        Ok(found.map(|_| InstrumentRecord {
            instrument,
            trading_day: day,
        }))
    }

    fn last_trading_day_before(
        &self,
        domain: RecordDomain,
        key: &str,
        day: TradingDay,
        deadline: Deadline,
    ) -> Result<Option<TradingDay>, FutdataError> {
        navigate(&self.pool, domain, key, day, deadline, "<", "DESC")
    }

    fn next_trading_day_after(
        &self,
        domain: RecordDomain,
        key: &str,
        day: TradingDay,
        deadline: Deadline,
    ) -> Result<Option<TradingDay>, FutdataError> {
        navigate(&self.pool, domain, key, day, deadline, ">", "ASC")
    }
}

fn navigate(
    pool: &ReadOnlyPool,
    domain: RecordDomain,
    key: &str,
    day: TradingDay,
    deadline: Deadline,
    comparison: &str,
    order: &str,
) -> Result<Option<TradingDay>, FutdataError> {
    let (table, column) = match domain {
        RecordDomain::Product => (PRODUCT_TABLE, "product"),
        RecordDomain::Instrument => (INSTRUMENT_TABLE, "instrument"),
    };
    let conn = pool.get(deadline, "calendar navigation")?;
    let query = format!(
        "SELECT trading_day FROM {table}
         WHERE {column} = ?1 AND trading_day {comparison} ?2
         ORDER BY trading_day {order} LIMIT 1"
    );
    let found: Option<String> = conn
        .query_row(&query, params![key.to_lowercase(), day.to_string()], |row| row.get(0))
        .optional()
        .map_err(query_err)?;
    found.as_deref().map(parse_day).transpose()
}

pub struct SqliteTickStore {
    pool: ReadOnlyPool,
}

impl SqliteTickStore {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, FutdataError> {
        Ok(Self {
            pool: pool_from_config(config, "tick")?,
        })
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, FutdataError> {
        Ok(Self {
            pool: ReadOnlyPool::open(path, 4)?,
        })
    }

    fn select(
        &self,
        query: &TickQuery<'_>,
        filter: &str,
        bounds: &[String],
        deadline: Deadline,
    ) -> Result<Vec<Vec<Cell>>, FutdataError> {
        let table = quote_identifier(query.symbol)?;
        let columns = column_list(query.columns)?;
        let index = quote_identifier(query.index)?;
        let sql = format!("SELECT {columns} FROM {table} WHERE {filter} ORDER BY {index}");

        let conn = self.pool.get(deadline, "tick query")?;
        let mut stmt = conn.prepare(&sql).map_err(query_err)?;
        let width = query.columns.len();
        let mut rows = stmt
            .query(rusqlite::params_from_iter(bounds.iter()))
            .map_err(query_err)?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(query_err)? {
            deadline.check("tick query")?;
            let mut cells = Vec::with_capacity(width);
            for i in 0..width {
                cells.push(to_cell(row.get_ref(i).map_err(query_err)?, &query.columns[i])?);
            }
            out.push(cells);
        }
        debug!(symbol = query.symbol, rows = out.len(), "sqlite tick query");
        Ok(out)
    }
}

fn to_cell(value: ValueRef<'_>, column: &str) -> Result<Cell, FutdataError> {
    Ok(match value {
        ValueRef::Null => Cell::Null,
        ValueRef::Integer(v) => Cell::Int(v),
        ValueRef::Real(v) => Cell::Float(v),
        ValueRef::Text(bytes) => Cell::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(_) => {
            return Err(FutdataError::DatabaseQuery {
                reason: format!("column {column:?} holds a blob"),
            });
        }
    })
}

impl TickStore for SqliteTickStore {
    fn query_day(
        &self,
        query: &TickQuery<'_>,
        day: TradingDay,
        deadline: Deadline,
    ) -> Result<Vec<Vec<Cell>>, FutdataError> {
        let filter = format!("{TICK_DAY_COLUMN} = ?1");
        self.select(query, &filter, &[day.to_string()], deadline)
    }

    fn query_range(
        &self,
        query: &TickQuery<'_>,
        begin: TradingDay,
        end: TradingDay,
        deadline: Deadline,
    ) -> Result<Vec<Vec<Cell>>, FutdataError> {
        let filter = format!("{TICK_DAY_COLUMN} >= ?1 AND {TICK_DAY_COLUMN} < ?2");
        self.select(query, &filter, &[begin.to_string(), end.to_string()], deadline)
    }
}
