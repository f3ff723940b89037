//! Ordered row table with named columns and one designated index column.
//!
//! Rows are kept in insertion order and the index column must never
//! decrease. Single-day tick tables, range tables and indicator outputs are
//! all `Table`s.

use crate::domain::error::FutdataError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// One dynamically typed value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Cell {
    Null,
    Int(i64),
    Float(#[serde(with = "float_repr")] f64),
    Text(String),
}

/// JSON has no NaN or infinities; those are written as the strings `"NaN"`,
/// `"inf"` and `"-inf"`.
mod float_repr {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(v: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if v.is_finite() {
            serializer.serialize_f64(*v)
        } else if v.is_nan() {
            serializer.serialize_str("NaN")
        } else if *v > 0.0 {
            serializer.serialize_str("inf")
        } else {
            serializer.serialize_str("-inf")
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(v) => Ok(v),
            Repr::Text(s) => match s.as_str() {
                "NaN" => Ok(f64::NAN),
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                other => Err(D::Error::custom(format!("invalid float {other:?}"))),
            },
        }
    }
}

impl Cell {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Int(v) => Some(*v as f64),
            Cell::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }
}

/// Agrees with `partial_cmp`: `Int(1) == Float(1.0)`, and NaN equals nothing.
impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.partial_cmp(other) == Some(Ordering::Equal)
    }
}

impl PartialOrd for Cell {
    /// Numbers compare numerically across `Int`/`Float`, text lexically,
    /// `Null` equals only `Null`. Mixed kinds are unordered.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Cell::Null, Cell::Null) => Some(Ordering::Equal),
            (Cell::Int(a), Cell::Int(b)) => Some(a.cmp(b)),
            (Cell::Text(a), Cell::Text(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => write!(f, "NULL"),
            Cell::Int(v) => write!(f, "{v}"),
            Cell::Float(v) => write!(f, "{v}"),
            Cell::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for Cell {
    fn from(v: i64) -> Self {
        Cell::Int(v)
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::Float(v)
    }
}

impl From<&str> for Cell {
    fn from(v: &str) -> Self {
        Cell::Text(v.to_string())
    }
}

impl From<String> for Cell {
    fn from(v: String) -> Self {
        Cell::Text(v)
    }
}

/// Borrowed view of one table row.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    columns: &'a [String],
    index_pos: usize,
    values: &'a [Cell],
}

impl<'a> Row<'a> {
    pub fn get(&self, column: &str) -> Option<&'a Cell> {
        let values = self.values;
        self.columns.iter().position(|c| c == column).map(|i| &values[i])
    }

    pub fn index(&self) -> &'a Cell {
        let values = self.values;
        &values[self.index_pos]
    }

    pub fn values(&self) -> &'a [Cell] {
        self.values
    }

    pub fn to_map(&self) -> BTreeMap<String, Cell> {
        self.columns
            .iter()
            .cloned()
            .zip(self.values.iter().cloned())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTable")]
pub struct Table {
    columns: Vec<String>,
    index: String,
    #[serde(skip)]
    index_pos: usize,
    rows: Vec<Vec<Cell>>,
}

#[derive(Deserialize)]
struct RawTable {
    columns: Vec<String>,
    index: String,
    rows: Vec<Vec<Cell>>,
}

impl TryFrom<RawTable> for Table {
    type Error = FutdataError;

    fn try_from(raw: RawTable) -> Result<Self, Self::Error> {
        Table::with_rows(raw.columns, &raw.index, raw.rows)
    }
}

impl Table {
    /// Empty table. `index` must be one of `columns`; names must be unique.
    pub fn new(columns: Vec<String>, index: &str) -> Result<Self, FutdataError> {
        for (i, c) in columns.iter().enumerate() {
            if columns[..i].contains(c) {
                return Err(FutdataError::invalid(format!("duplicate column {c:?}")));
            }
        }
        let index_pos = columns
            .iter()
            .position(|c| c == index)
            .ok_or_else(|| FutdataError::invalid(format!("index column {index:?} not in columns")))?;

        Ok(Self {
            columns,
            index: index.to_string(),
            index_pos,
            rows: Vec::new(),
        })
    }

    pub fn with_rows(
        columns: Vec<String>,
        index: &str,
        rows: Vec<Vec<Cell>>,
    ) -> Result<Self, FutdataError> {
        let mut table = Self::new(columns, index)?;
        table.rows.reserve(rows.len());
        for row in rows {
            table.add_row(row)?;
        }
        Ok(table)
    }

    /// Appends a row given in column order.
    pub fn add_row(&mut self, row: Vec<Cell>) -> Result<(), FutdataError> {
        if row.len() != self.columns.len() {
            return Err(FutdataError::invalid(format!(
                "row has {} values, table has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        if let Some(last) = self.rows.last() {
            let prev = &last[self.index_pos];
            let next = &row[self.index_pos];
            match prev.partial_cmp(next) {
                Some(Ordering::Less) | Some(Ordering::Equal) => {}
                _ => {
                    return Err(FutdataError::invalid(format!(
                        "index {} would follow {} in column {:?}",
                        next, prev, self.index
                    )));
                }
            }
        }
        self.rows.push(row);
        Ok(())
    }

    /// Appends a row given by column name; missing columns are `Null`.
    pub fn add_dict<K, I>(&mut self, values: I) -> Result<(), FutdataError>
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, Cell)>,
    {
        let mut row = vec![Cell::Null; self.columns.len()];
        for (name, value) in values {
            let name = name.as_ref();
            let pos = self
                .columns
                .iter()
                .position(|c| c == name)
                .ok_or_else(|| FutdataError::invalid(format!("unknown column {name:?}")))?;
            row[pos] = value;
        }
        self.add_row(row)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn index_name(&self) -> &str {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<Vec<&Cell>> {
        let pos = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|r| &r[pos]).collect())
    }

    pub fn index_values(&self) -> Vec<&Cell> {
        self.rows.iter().map(|r| &r[self.index_pos]).collect()
    }

    pub fn row(&self, i: usize) -> Option<Row<'_>> {
        self.rows.get(i).map(|values| Row {
            columns: &self.columns,
            index_pos: self.index_pos,
            values,
        })
    }

    pub fn last_row(&self) -> Option<Row<'_>> {
        self.len().checked_sub(1).and_then(|i| self.row(i))
    }

    /// Splits the table into single-row tables, in order.
    pub fn frames(&self) -> impl Iterator<Item = Table> + '_ {
        self.rows.iter().map(|values| Table {
            columns: self.columns.clone(),
            index: self.index.clone(),
            index_pos: self.index_pos,
            rows: vec![values.clone()],
        })
    }
}
