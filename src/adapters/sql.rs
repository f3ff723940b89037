//! Helpers shared by the SQL adapters.

use crate::domain::error::FutdataError;

/// Reference tables, as created in either SQL backend.
pub const TRADING_DAY_TABLE: &str = "trading_day";
pub const PRODUCT_TABLE: &str = "product";
pub const INSTRUMENT_TABLE: &str = "instrument";

/// Tick tables carry the trading day in this column.
pub const TICK_DAY_COLUMN: &str = "tradingday";

/// Lower-cases `name` and checks it is safe to splice into SQL as an
/// identifier (`[a-z0-9_]+`). Returns it quoted.
pub fn quote_identifier(name: &str) -> Result<String, FutdataError> {
    let lowered = name.to_lowercase();
    let valid = !lowered.is_empty()
        && lowered
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if !valid {
        return Err(FutdataError::invalid(format!("invalid SQL identifier {name:?}")));
    }
    Ok(format!("\"{lowered}\""))
}

/// `"a", "b", "c"` from a column list.
pub fn column_list(columns: &[String]) -> Result<String, FutdataError> {
    if columns.is_empty() {
        return Err(FutdataError::invalid("no columns selected"));
    }
    let quoted: Vec<String> = columns
        .iter()
        .map(|c| quote_identifier(c))
        .collect::<Result<_, _>>()?;
    Ok(quoted.join(", "))
}
