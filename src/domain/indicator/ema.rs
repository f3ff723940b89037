//! Exponential moving average with `period` as a direct divisor.
//!
//! y[0] = x[0], then y[i] = (x[i] - y[i-1]) / period + y[i-1].
//! This is not the `2 / (period + 1)` smoothing form; outputs differ.

use crate::domain::error::FutdataError;
use crate::domain::indicator::{IndicatorEngine, Transform, DEFAULT_INDEX_KEY, source_value};
use crate::domain::table::Row;

#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    use_key: String,
    ret_key: String,
    last: Option<f64>,
}

impl Ema {
    pub fn new(period: usize, use_key: impl Into<String>) -> Result<Self, FutdataError> {
        if period == 0 {
            return Err(FutdataError::invalid("EMA period must be > 0"));
        }
        Ok(Self {
            period,
            use_key: use_key.into(),
            ret_key: "ema".into(),
            last: None,
        })
    }

    pub fn with_output_key(mut self, ret_key: impl Into<String>) -> Self {
        self.ret_key = ret_key.into();
        self
    }

    /// Engine indexed by the default `time` column.
    pub fn engine(period: usize, use_key: impl Into<String>) -> Result<IndicatorEngine<Self>, FutdataError> {
        IndicatorEngine::new(Self::new(period, use_key)?, DEFAULT_INDEX_KEY)
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

impl Transform for Ema {
    fn output_key(&self) -> &str {
        &self.ret_key
    }

    fn next_value(&mut self, frame: Row<'_>) -> Result<f64, FutdataError> {
        let x = source_value(frame, &self.use_key)?;
        let y = match self.last {
            Some(prev) => (x - prev) / self.period as f64 + prev,
            None => x,
        };
        self.last = Some(y);
        Ok(y)
    }
}
