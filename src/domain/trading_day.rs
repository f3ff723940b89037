//! Trading day identifier and per-call query deadlines.

use crate::domain::error::FutdataError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

const DAY_FORMAT: &str = "%Y%m%d";

/// A trading day such as `20170103`.
///
/// Stored as a calendar date and rendered as `%Y%m%d`, so chronological and
/// lexical order agree. The rendered form is what backing stores and cache
/// keys see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TradingDay(NaiveDate);

impl TradingDay {
    pub fn parse(s: &str) -> Result<Self, FutdataError> {
        NaiveDate::parse_from_str(s.trim(), DAY_FORMAT)
            .map(TradingDay)
            .map_err(|_| FutdataError::invalid(format!("invalid trading day {s:?} (expected YYYYMMDD)")))
    }

    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(TradingDay)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

impl fmt::Display for TradingDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(DAY_FORMAT))
    }
}

impl FromStr for TradingDay {
    type Err = FutdataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TradingDay::parse(s)
    }
}

impl TryFrom<String> for TradingDay {
    type Error = FutdataError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        TradingDay::parse(&value)
    }
}

impl From<TradingDay> for String {
    fn from(day: TradingDay) -> Self {
        day.to_string()
    }
}

/// Point in time after which a backing-store call gives up.
///
/// `Deadline::none()` never expires. Expiry is reported as
/// [`FutdataError::DeadlineExceeded`] and is never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    pub fn none() -> Self {
        Deadline(None)
    }

    pub fn at(instant: Instant) -> Self {
        Deadline(Some(instant))
    }

    /// A deadline `timeout` from now, or no deadline for `None`.
    pub fn after(timeout: Option<Duration>) -> Self {
        Deadline(timeout.map(|t| Instant::now() + t))
    }

    /// Remaining time; `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.0.map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        matches!(self.remaining(), Some(d) if d.is_zero())
    }

    pub fn check(&self, operation: &str) -> Result<(), FutdataError> {
        if self.is_expired() {
            return Err(FutdataError::DeadlineExceeded {
                operation: operation.to_string(),
            });
        }
        Ok(())
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Deadline::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        let day = TradingDay::parse("20170103").unwrap();
        assert_eq!(day.to_string(), "20170103");
        assert_eq!(day, TradingDay::from_ymd(2017, 1, 3).unwrap());
    }

    #[test]
    fn parse_rejects_other_formats() {
        assert!(TradingDay::parse("2017-01-03").is_err());
        assert!(TradingDay::parse("20171340").is_err());
        assert!(TradingDay::parse("").is_err());
    }

    #[test]
    fn ordering_is_chronological() {
        let a = TradingDay::parse("20161230").unwrap();
        let b = TradingDay::parse("20170103").unwrap();
        assert!(a < b);
        assert!(a.to_string() < b.to_string());
    }

    #[test]
    fn serde_uses_compact_string() {
        let day = TradingDay::parse("20170103").unwrap();
        let json = serde_json::to_string(&day).unwrap();
        assert_eq!(json, "\"20170103\"");
        let back: TradingDay = serde_json::from_str(&json).unwrap();
        assert_eq!(back, day);
        assert!(serde_json::from_str::<TradingDay>("\"garbage\"").is_err());
    }

    #[test]
    fn unbounded_deadline_never_expires() {
        let deadline = Deadline::none();
        assert!(!deadline.is_expired());
        assert_eq!(deadline.remaining(), None);
        assert!(deadline.check("query").is_ok());
    }

    #[test]
    fn past_deadline_is_expired() {
        let deadline = Deadline::at(Instant::now() - Duration::from_millis(5));
        assert!(deadline.is_expired());
        match deadline.check("product lookup") {
            Err(FutdataError::DeadlineExceeded { operation }) => {
                assert_eq!(operation, "product lookup")
            }
            other => panic!("expected DeadlineExceeded, got {other:?}"),
        }
    }

    #[test]
    fn deadline_after_timeout() {
        let deadline = Deadline::after(Some(Duration::from_secs(60)));
        assert!(!deadline.is_expired());
        assert!(deadline.remaining().unwrap() > Duration::from_secs(50));
    }
}
