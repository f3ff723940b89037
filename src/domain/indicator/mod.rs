//! Incremental indicator engine.
//!
//! An [`IndicatorEngine`] is fed single-row frames in index order and emits
//! exactly one output row per frame into an append-only table. The per-row
//! arithmetic lives in a [`Transform`]; the engine owns ordering checks and
//! the output table.

pub mod diff;
pub mod ema;

pub use diff::Diff;
pub use ema::Ema;

use crate::domain::error::FutdataError;
use crate::domain::table::{Cell, Row, Table};
use std::cmp::Ordering;

/// Index column name of indicator output tables unless told otherwise.
pub const DEFAULT_INDEX_KEY: &str = "time";

/// Per-row update rule of one indicator.
pub trait Transform {
    /// Output column name for the computed value.
    fn output_key(&self) -> &str;

    /// Computes the value for `frame` from the transform's own state and
    /// advances that state. Called once per frame, in order.
    fn next_value(&mut self, frame: Row<'_>) -> Result<f64, FutdataError>;
}

/// Reads a numeric field from a frame.
pub(crate) fn source_value(frame: Row<'_>, field: &str) -> Result<f64, FutdataError> {
    // fetched tables carry lower-cased column names
    frame
        .get(field)
        .or_else(|| frame.get(&field.to_lowercase()))
        .ok_or_else(|| FutdataError::invalid(format!("frame has no field {field:?}")))?
        .as_f64()
        .ok_or_else(|| FutdataError::invalid(format!("field {field:?} is not numeric")))
}

pub struct IndicatorEngine<T: Transform> {
    transform: T,
    output: Table,
    allow_duplicate_index: bool,
}

impl<T: Transform> IndicatorEngine<T> {
    /// Engine writing `(index_key, transform.output_key())` rows.
    pub fn new(transform: T, index_key: &str) -> Result<Self, FutdataError> {
        let columns = vec![index_key.to_string(), transform.output_key().to_string()];
        let output = Table::new(columns, index_key)?;
        Ok(Self {
            transform,
            output,
            allow_duplicate_index: false,
        })
    }

    /// Accept frames whose index equals the previous one.
    pub fn allow_duplicate_index(mut self, allow: bool) -> Self {
        self.allow_duplicate_index = allow;
        self
    }

    /// Consumes one single-row frame and appends one output row.
    ///
    /// The frame's index must be greater than the last one seen (or equal,
    /// when duplicates are allowed); frames are never reordered.
    pub fn update(&mut self, frame: &Table) -> Result<(), FutdataError> {
        if frame.len() != 1 {
            return Err(FutdataError::invalid(format!(
                "update expects a single-row frame, got {} rows",
                frame.len()
            )));
        }
        let Some(row) = frame.row(0) else {
            return Err(FutdataError::invalid("empty frame"));
        };
        let index = row.index().clone();

        if let Some(last) = self.output.last_row() {
            let ok = match last.index().partial_cmp(&index) {
                Some(Ordering::Less) => true,
                Some(Ordering::Equal) => self.allow_duplicate_index,
                _ => false,
            };
            if !ok {
                return Err(FutdataError::invalid(format!(
                    "frame index {} does not follow {}",
                    index,
                    last.index()
                )));
            }
        }

        let value = self.transform.next_value(row)?;
        self.output.add_row(vec![index, Cell::Float(value)])
    }

    /// Feeds every row of `table` in order.
    pub fn update_many(&mut self, table: &Table) -> Result<(), FutdataError> {
        for frame in table.frames() {
            self.update(&frame)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.output.len()
    }

    pub fn is_empty(&self) -> bool {
        self.output.is_empty()
    }

    pub fn last_output_row(&self) -> Option<Row<'_>> {
        self.output.last_row()
    }

    pub fn output(&self) -> &Table {
        &self.output
    }

    pub fn into_output(self) -> Table {
        self.output
    }

    pub fn transform(&self) -> &T {
        &self.transform
    }
}
