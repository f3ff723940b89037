//! Reference records: one per trading day for the calendar, each product and
//! each instrument.

use crate::domain::trading_day::TradingDay;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingDayRecord {
    pub trading_day: TradingDay,
    pub product_list: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub product: String,
    pub trading_day: TradingDay,
    pub dominant: Option<String>,
    pub sub_dominant: Option<String>,
    pub instrument_list: Vec<String>,
}

impl ProductRecord {
    /// Dominant or sub-dominant contract; an empty field counts as absent.
    pub fn contract(&self, sub_dominant: bool) -> Option<&str> {
        let field = if sub_dominant {
            &self.sub_dominant
        } else {
            &self.dominant
        };
        field.as_deref().filter(|s| !s.trim().is_empty())
    }
}

/// Presence alone means the instrument traded on `trading_day`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentRecord {
    pub instrument: String,
    pub trading_day: TradingDay,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(dominant: Option<&str>, sub: Option<&str>) -> ProductRecord {
        ProductRecord {
            product: "rb".into(),
            trading_day: TradingDay::parse("20170103").unwrap(),
            dominant: dominant.map(String::from),
            sub_dominant: sub.map(String::from),
            instrument_list: vec!["rb1705".into(), "rb1710".into()],
        }
    }

    #[test]
    fn contract_selects_field() {
        let r = record(Some("rb1705"), Some("rb1710"));
        assert_eq!(r.contract(false), Some("rb1705"));
        assert_eq!(r.contract(true), Some("rb1710"));
    }

    #[test]
    fn empty_contract_is_absent() {
        let r = record(Some(""), None);
        assert_eq!(r.contract(false), None);
        assert_eq!(r.contract(true), None);
    }
}
