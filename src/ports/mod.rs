//! Port traits: the seams between domain logic and backing stores.

pub mod cache_port;
pub mod config_port;
pub mod reference_port;
pub mod tick_port;
