//! Concrete adapter implementations for ports.

pub mod file_config_adapter;
#[cfg(feature = "postgres")]
pub mod postgres_adapter;
#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub mod sql;
#[cfg(feature = "sqlite")]
pub mod sqlite_adapter;
#[cfg(feature = "sqlite")]
pub mod sqlite_cache_adapter;
