#![allow(dead_code)]

use futdata::adapters::sqlite_adapter::REFERENCE_SCHEMA;
use futdata::domain::error::FutdataError;
use futdata::domain::records::{InstrumentRecord, ProductRecord, TradingDayRecord};
use futdata::domain::table::Cell;
use futdata::domain::trading_day::{Deadline, TradingDay};
use futdata::ports::reference_port::{RecordDomain, ReferenceStore};
use futdata::ports::tick_port::{TickQuery, TickStore};
use rusqlite::Connection;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub fn day(s: &str) -> TradingDay {
    TradingDay::parse(s).unwrap()
}

pub fn write_temp_ini(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

/// Shared call counter that survives boxing the fake into a trait object.
#[derive(Clone, Default)]
pub struct Calls(Arc<AtomicUsize>);

impl Calls {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// In-memory reference store counting every call.
#[derive(Default)]
pub struct MockReferenceStore {
    pub days: HashMap<TradingDay, Vec<String>>,
    pub products: HashMap<(String, TradingDay), ProductRecord>,
    pub instruments: Vec<(String, TradingDay)>,
    pub calls: Calls,
}

impl MockReferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_day(mut self, d: &str, products: &[&str]) -> Self {
        self.days
            .insert(day(d), products.iter().map(|p| p.to_string()).collect());
        self
    }

    pub fn with_product(
        mut self,
        product: &str,
        d: &str,
        dominant: Option<&str>,
        sub_dominant: Option<&str>,
    ) -> Self {
        let instrument_list = dominant
            .into_iter()
            .chain(sub_dominant)
            .map(str::to_string)
            .collect();
        self.products.insert(
            (product.to_string(), day(d)),
            ProductRecord {
                product: product.to_string(),
                trading_day: day(d),
                dominant: dominant.map(str::to_string),
                sub_dominant: sub_dominant.map(str::to_string),
                instrument_list,
            },
        );
        self
    }

    pub fn with_instrument(mut self, instrument: &str, d: &str) -> Self {
        self.instruments.push((instrument.to_string(), day(d)));
        self
    }

    fn days_of(&self, domain: RecordDomain, key: &str) -> Vec<TradingDay> {
        let mut days: Vec<TradingDay> = match domain {
            RecordDomain::Product => self
                .products
                .keys()
                .filter(|(p, _)| p == key)
                .map(|(_, d)| *d)
                .collect(),
            RecordDomain::Instrument => self
                .instruments
                .iter()
                .filter(|(i, _)| i == key)
                .map(|(_, d)| *d)
                .collect(),
        };
        days.sort();
        days
    }
}

impl ReferenceStore for MockReferenceStore {
    fn trading_day_record(
        &self,
        d: TradingDay,
        deadline: Deadline,
    ) -> Result<Option<TradingDayRecord>, FutdataError> {
        self.calls.hit();
        deadline.check("mock trading day")?;
        Ok(self.days.get(&d).map(|products| TradingDayRecord {
            trading_day: d,
            product_list: products.iter().cloned().collect(),
        }))
    }

    fn product_record(
        &self,
        product: &str,
        d: TradingDay,
        deadline: Deadline,
    ) -> Result<Option<ProductRecord>, FutdataError> {
        self.calls.hit();
        deadline.check("mock product")?;
        Ok(self.products.get(&(product.to_string(), d)).cloned())
    }

    fn instrument_record(
        &self,
        instrument: &str,
        d: TradingDay,
        deadline: Deadline,
    ) -> Result<Option<InstrumentRecord>, FutdataError> {
        self.calls.hit();
        deadline.check("mock instrument")?;
        Ok(self
            .instruments
            .iter()
            .any(|(i, x)| i == instrument && *x == d)
            .then(|| InstrumentRecord {
                instrument: instrument.to_string(),
                trading_day: d,
            }))
    }

    fn last_trading_day_before(
        &self,
        domain: RecordDomain,
        key: &str,
        d: TradingDay,
        deadline: Deadline,
    ) -> Result<Option<TradingDay>, FutdataError> {
        self.calls.hit();
        deadline.check("mock navigation")?;
        Ok(self.days_of(domain, key).into_iter().filter(|x| *x < d).last())
    }

    fn next_trading_day_after(
        &self,
        domain: RecordDomain,
        key: &str,
        d: TradingDay,
        deadline: Deadline,
    ) -> Result<Option<TradingDay>, FutdataError> {
        self.calls.hit();
        deadline.check("mock navigation")?;
        Ok(self.days_of(domain, key).into_iter().find(|x| *x > d))
    }
}

/// Tick store over `(symbol, day) -> rows`, counting every call. Rows must
/// already be in the column order the caller will ask for.
#[derive(Default)]
pub struct MockTickStore {
    pub rows: HashMap<(String, TradingDay), Vec<Vec<Cell>>>,
    pub calls: Calls,
}

impl MockTickStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(mut self, symbol: &str, d: &str, rows: Vec<Vec<Cell>>) -> Self {
        self.rows.insert((symbol.to_string(), day(d)), rows);
        self
    }
}

impl TickStore for MockTickStore {
    fn query_day(
        &self,
        query: &TickQuery<'_>,
        d: TradingDay,
        deadline: Deadline,
    ) -> Result<Vec<Vec<Cell>>, FutdataError> {
        self.calls.hit();
        deadline.check("mock tick day")?;
        Ok(self
            .rows
            .get(&(query.symbol.to_string(), d))
            .cloned()
            .unwrap_or_default())
    }

    fn query_range(
        &self,
        query: &TickQuery<'_>,
        begin: TradingDay,
        end: TradingDay,
        deadline: Deadline,
    ) -> Result<Vec<Vec<Cell>>, FutdataError> {
        self.calls.hit();
        deadline.check("mock tick range")?;
        let mut days: Vec<&(String, TradingDay)> = self
            .rows
            .keys()
            .filter(|(s, d)| s == query.symbol && *d >= begin && *d < end)
            .collect();
        days.sort();
        Ok(days
            .into_iter()
            .flat_map(|k| self.rows[k].iter().cloned())
            .collect())
    }
}

pub fn tick(time: i64, price: f64) -> Vec<Cell> {
    vec![Cell::Int(time), Cell::Float(price)]
}

/// Reference database for the rb product over the first week of 2017.
///
/// rb1705 is dominant on 0103 and 0104 with rb1710 sub-dominant on 0103;
/// the roll to rb1710 happens on 0105. cu trades on 0103 with no dominant.
pub fn seed_reference_db(path: &Path) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(REFERENCE_SCHEMA).unwrap();
    conn.execute_batch(
        r#"
        INSERT INTO trading_day VALUES ('20170103', '["rb","cu"]');
        INSERT INTO trading_day VALUES ('20170104', '["rb"]');
        INSERT INTO trading_day VALUES ('20170105', '["rb"]');
        INSERT INTO product VALUES ('rb', '20170103', 'rb1705', 'rb1710', '["rb1705","rb1710"]');
        INSERT INTO product VALUES ('rb', '20170104', 'rb1705', NULL, '["rb1705","rb1710"]');
        INSERT INTO product VALUES ('rb', '20170105', 'rb1710', 'rb1705', '["rb1705","rb1710"]');
        INSERT INTO product VALUES ('cu', '20170103', '', NULL, '[]');
        INSERT INTO instrument VALUES ('rb1705', '20170103');
        INSERT INTO instrument VALUES ('rb1705', '20170104');
        INSERT INTO instrument VALUES ('rb1705', '20170105');
        INSERT INTO instrument VALUES ('rb1710', '20170103');
        INSERT INTO instrument VALUES ('rb1710', '20170105');
        "#,
    )
    .unwrap();
}

/// Tick tables for rb1705 and rb1710 keyed on `happentime`.
pub fn seed_tick_db(path: &Path) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE rb1705 (tradingday TEXT, happentime INTEGER, lastprice REAL);
         INSERT INTO rb1705 VALUES ('20170103', 1, 10.0);
         INSERT INTO rb1705 VALUES ('20170103', 2, 12.0);
         INSERT INTO rb1705 VALUES ('20170103', 3, 16.0);
         INSERT INTO rb1705 VALUES ('20170104', 5, 20.0);
         CREATE TABLE rb1710 (tradingday TEXT, happentime INTEGER, lastprice REAL);
         INSERT INTO rb1710 VALUES ('20170103', 2, 30.0);
         INSERT INTO rb1710 VALUES ('20170105', 4, 31.0);",
    )
    .unwrap();
}
