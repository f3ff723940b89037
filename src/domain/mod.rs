//! Core domain types and logic.

pub mod cache;
pub mod error;
pub mod fetcher;
pub mod indicator;
pub mod records;
pub mod register_key;
pub mod resolver;
pub mod table;
pub mod trading_day;
