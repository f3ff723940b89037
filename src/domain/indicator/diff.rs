//! First difference of a raw source field: 0 for the first frame, then
//! x[i] - x[i-1].

use crate::domain::error::FutdataError;
use crate::domain::indicator::{IndicatorEngine, Transform, DEFAULT_INDEX_KEY, source_value};
use crate::domain::table::Row;

#[derive(Debug, Clone)]
pub struct Diff {
    use_key: String,
    ret_key: String,
    last_value: Option<f64>,
}

impl Diff {
    pub fn new(use_key: impl Into<String>) -> Self {
        Self {
            use_key: use_key.into(),
            ret_key: "diff".into(),
            last_value: None,
        }
    }

    pub fn with_output_key(mut self, ret_key: impl Into<String>) -> Self {
        self.ret_key = ret_key.into();
        self
    }

    pub fn engine(use_key: impl Into<String>) -> Result<IndicatorEngine<Self>, FutdataError> {
        IndicatorEngine::new(Self::new(use_key), DEFAULT_INDEX_KEY)
    }
}

impl Transform for Diff {
    fn output_key(&self) -> &str {
        &self.ret_key
    }

    fn next_value(&mut self, frame: Row<'_>) -> Result<f64, FutdataError> {
        let x = source_value(frame, &self.use_key)?;
        let diff = self.last_value.map_or(0.0, |prev| x - prev);
        self.last_value = Some(x);
        Ok(diff)
    }
}
