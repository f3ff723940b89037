//! PostgreSQL reference and tick stores.
//!
//! Reference lists are `text[]` columns. Every query runs inside a
//! transaction with `statement_timeout` set from the caller's deadline.

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
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use postgres::error::SqlState;
use postgres::types::{ToSql, Type};
use postgres::{NoTls, Row};
use r2d2::Pool;
use r2d2_postgres::PostgresConnectionManager;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tracing::debug;

type Manager = PostgresConnectionManager<NoTls>;

fn query_err(e: postgres::Error, deadline: Deadline, operation: &str) -> FutdataError {
    if e.code() == Some(&SqlState::QUERY_CANCELED) || deadline.is_expired() {
        FutdataError::DeadlineExceeded {
            operation: operation.to_string(),
        }
    } else {
        FutdataError::DatabaseQuery {
            reason: e.to_string(),
        }
    }
}

struct PgPool {
    pool: Pool<Manager>,
}

impl PgPool {
    fn connect(conninfo: &str, pool_size: u32) -> Result<Self, FutdataError> {
        let config: postgres::Config =
            conninfo.parse().map_err(|e: postgres::Error| FutdataError::Database {
                reason: e.to_string(),
            })?;
        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .min_idle(Some(0))
            .build_unchecked(PostgresConnectionManager::new(config, NoTls));
        Ok(Self { pool })
    }

    fn from_config(
        config: &dyn ConfigPort,
        key: &str,
        size_section: &str,
    ) -> Result<Self, FutdataError> {
        let conninfo = config
            .get_string("postgres", key)
            .ok_or_else(|| FutdataError::ConfigMissing {
                section: "postgres".into(),
                key: key.into(),
            })?;
        let pool_size = config.get_int(size_section, "pool_size", 4);
        if pool_size < 1 {
            return Err(FutdataError::ConfigInvalid {
                section: size_section.into(),
                key: "pool_size".into(),
                reason: "must be at least 1".into(),
            });
        }
        Self::connect(&conninfo, pool_size as u32)
    }

    /// Runs `sql` bounded by `deadline` and returns every row.
    fn query(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
        deadline: Deadline,
        operation: &str,
    ) -> Result<Vec<Row>, FutdataError> {
        deadline.check(operation)?;
        let conn = match deadline.remaining() {
            Some(remaining) => self.pool.get_timeout(remaining),
            None => self.pool.get(),
        };
        let mut conn = conn.map_err(|e: r2d2::Error| {
            if deadline.is_expired() {
                FutdataError::DeadlineExceeded {
                    operation: operation.to_string(),
                }
            } else {
                FutdataError::Database {
                    reason: e.to_string(),
                }
            }
        })?;

        let mut tx = conn
            .transaction()
            .map_err(|e| query_err(e, deadline, operation))?;
        if let Some(remaining) = deadline.remaining() {
            let millis = remaining.as_millis().max(1);
            tx.batch_execute(&format!("SET LOCAL statement_timeout = {millis}"))
                .map_err(|e| query_err(e, deadline, operation))?;
        }
        let rows = tx
            .query(sql, params)
            .map_err(|e| query_err(e, deadline, operation))?;
        tx.commit().map_err(|e| query_err(e, deadline, operation))?;
        Ok(rows)
    }
}

fn parse_day(text: &str) -> Result<TradingDay, FutdataError> {
    TradingDay::parse(text).map_err(|_| FutdataError::DatabaseQuery {
        reason: format!("malformed trading day {text:?} in store"),
    })
}

fn get<'a, T: postgres::types::FromSql<'a>>(row: &'a Row, idx: usize) -> Result<T, FutdataError> {
    row.try_get(idx).map_err(|e| FutdataError::DatabaseQuery {
        reason: e.to_string(),
    })
}

pub struct PostgresReferenceStore {
    pool: PgPool,
}

impl PostgresReferenceStore {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, FutdataError> {
        Ok(Self {
            pool: PgPool::from_config(config, "reference_conninfo", "reference")?,
        })
    }

    pub fn connect(conninfo: &str) -> Result<Self, FutdataError> {
        Ok(Self {
            pool: PgPool::connect(conninfo, 4)?,
        })
    }

    fn navigate(
        &self,
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
        let sql = format!(
            "SELECT trading_day FROM {table}
             WHERE {column} = $1 AND trading_day {comparison} $2
             ORDER BY trading_day {order} LIMIT 1"
        );
        let key = key.to_lowercase();
        let day = day.to_string();
        let rows = self
            .pool
            .query(&sql, &[&key, &day], deadline, "calendar navigation")?;
        match rows.first() {
            Some(row) => {
                let text: String = get(row, 0)?;
                parse_day(&text).map(Some)
            }
            None => Ok(None),
        }
    }
}

impl ReferenceStore for PostgresReferenceStore {
    fn trading_day_record(
        &self,
        day: TradingDay,
        deadline: Deadline,
    ) -> Result<Option<TradingDayRecord>, FutdataError> {
        let sql = format!("SELECT product_list FROM {TRADING_DAY_TABLE} WHERE trading_day = $1");
        let text = day.to_string();
        let rows = self
            .pool
            .query(&sql, &[&text], deadline, "trading day lookup")?;
        match rows.first() {
            Some(row) => {
                let list: Vec<String> = get(row, 0)?;
                Ok(Some(TradingDayRecord {
                    trading_day: day,
                    product_list: list.into_iter().collect(),
                }))
            }
            None => Ok(None),
        }
    }

    fn product_record(
        &self,
        product: &str,
        day: TradingDay,
        deadline: Deadline,
    ) -> Result<Option<ProductRecord>, FutdataError> {
        let product = product.to_lowercase();
        let sql = format!(
            "SELECT dominant, sub_dominant, instrument_list FROM {PRODUCT_TABLE}
             WHERE product = $1 AND trading_day = $2"
        );
        let text = day.to_string();
        let rows = self
            .pool
            .query(&sql, &[&product, &text], deadline, "product lookup")?;
        match rows.first() {
            Some(row) => Ok(Some(ProductRecord {
                product,
                trading_day: day,
                dominant: get(row, 0)?,
                sub_dominant: get(row, 1)?,
                instrument_list: get(row, 2)?,
            })),
            None => Ok(None),
        }
    }

    fn instrument_record(
        &self,
        instrument: &str,
        day: TradingDay,
        deadline: Deadline,
    ) -> Result<Option<InstrumentRecord>, FutdataError> {
        let instrument = instrument.to_lowercase();
        let sql = format!(
            "SELECT 1 FROM {INSTRUMENT_TABLE} WHERE instrument = $1 AND trading_day = $2"
        );
        let text = day.to_string();
        let rows = self
            .pool
            .query(&sql, &[&instrument, &text], deadline, "instrument lookup")?;
        Ok((!rows.is_empty()).then(|| InstrumentRecord {
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
        self.navigate(domain, key, day, deadline, "<", "DESC")
    }

    fn next_trading_day_after(
        &self,
        domain: RecordDomain,
        key: &str,
        day: TradingDay,
        deadline: Deadline,
    ) -> Result<Option<TradingDay>, FutdataError> {
        self.navigate(domain, key, day, deadline, ">", "ASC")
    }
}

pub struct PostgresTickStore {
    pool: PgPool,
}

impl PostgresTickStore {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, FutdataError> {
        Ok(Self {
            pool: PgPool::from_config(config, "tick_conninfo", "tick")?,
        })
    }

    pub fn connect(conninfo: &str) -> Result<Self, FutdataError> {
        Ok(Self {
            pool: PgPool::connect(conninfo, 4)?,
        })
    }

    fn select(
        &self,
        query: &TickQuery<'_>,
        filter: &str,
        params: &[&(dyn ToSql + Sync)],
        deadline: Deadline,
    ) -> Result<Vec<Vec<Cell>>, FutdataError> {
        let table = quote_identifier(query.symbol)?;
        let columns = column_list(query.columns)?;
        let index = quote_identifier(query.index)?;
        let sql = format!("SELECT {columns} FROM {table} WHERE {filter} ORDER BY {index}");

        let rows = self.pool.query(&sql, params, deadline, "tick query")?;
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            deadline.check("tick query")?;
            let cells = (0..row.len())
                .map(|i| to_cell(row, i))
                .collect::<Result<Vec<_>, _>>()?;
            out.push(cells);
        }
        debug!(symbol = query.symbol, rows = out.len(), "postgres tick query");
        Ok(out)
    }
}

fn to_cell(row: &Row, idx: usize) -> Result<Cell, FutdataError> {
    let ty = row.columns()[idx].type_().clone();
    let cell = if ty == Type::INT2 {
        get::<Option<i16>>(row, idx)?.map(|v| Cell::Int(v.into()))
    } else if ty == Type::INT4 {
        get::<Option<i32>>(row, idx)?.map(|v| Cell::Int(v.into()))
    } else if ty == Type::INT8 {
        get::<Option<i64>>(row, idx)?.map(Cell::Int)
    } else if ty == Type::FLOAT4 {
        get::<Option<f32>>(row, idx)?.map(|v| Cell::Float(v.into()))
    } else if ty == Type::FLOAT8 {
        get::<Option<f64>>(row, idx)?.map(Cell::Float)
    } else if ty == Type::NUMERIC {
        get::<Option<Decimal>>(row, idx)?
            .map(|v| numeric_cell(v, row.columns()[idx].name()))
            .transpose()?
    } else if ty == Type::BOOL {
        get::<Option<bool>>(row, idx)?.map(|v| Cell::Int(v.into()))
    } else if ty == Type::TIMESTAMP {
        get::<Option<NaiveDateTime>>(row, idx)?.map(|v| Cell::Text(timestamp_text(v)))
    } else if ty == Type::TIMESTAMPTZ {
        get::<Option<DateTime<Utc>>>(row, idx)?.map(|v| Cell::Text(timestamptz_text(v)))
    } else if ty == Type::DATE {
        get::<Option<NaiveDate>>(row, idx)?.map(|v| Cell::Text(v.format("%Y-%m-%d").to_string()))
    } else if ty == Type::TIME {
        get::<Option<NaiveTime>>(row, idx)?.map(|v| Cell::Text(v.format("%H:%M:%S%.6f").to_string()))
    } else if ty == Type::TEXT || ty == Type::VARCHAR || ty == Type::BPCHAR || ty == Type::NAME {
        get::<Option<String>>(row, idx)?.map(Cell::Text)
    } else {
        return Err(FutdataError::DatabaseQuery {
            reason: format!(
                "column {:?} has unsupported type {ty}",
                row.columns()[idx].name()
            ),
        });
    };
    Ok(cell.unwrap_or(Cell::Null))
}

// Fixed-width text, so that lexical order is chronological order.
fn timestamp_text(v: NaiveDateTime) -> String {
    v.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

fn timestamptz_text(v: DateTime<Utc>) -> String {
    format!("{}Z", timestamp_text(v.naive_utc()))
}

fn numeric_cell(v: Decimal, column: &str) -> Result<Cell, FutdataError> {
    v.to_f64()
        .map(Cell::Float)
        .ok_or_else(|| FutdataError::DatabaseQuery {
            reason: format!("column {column:?} value {v} does not fit a float"),
        })
}

impl TickStore for PostgresTickStore {
    fn query_day(
        &self,
        query: &TickQuery<'_>,
        day: TradingDay,
        deadline: Deadline,
    ) -> Result<Vec<Vec<Cell>>, FutdataError> {
        let filter = format!("{TICK_DAY_COLUMN} = $1");
        let day = day.to_string();
        self.select(query, &filter, &[&day], deadline)
    }

    fn query_range(
        &self,
        query: &TickQuery<'_>,
        begin: TradingDay,
        end: TradingDay,
        deadline: Deadline,
    ) -> Result<Vec<Vec<Cell>>, FutdataError> {
        let filter = format!("{TICK_DAY_COLUMN} >= $1 AND {TICK_DAY_COLUMN} < $2");
        let (begin, end) = (begin.to_string(), end.to_string());
        self.select(query, &filter, &[&begin, &end], deadline)
    }
}
