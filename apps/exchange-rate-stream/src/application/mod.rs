//! Application Layer - Port definitions.
//!
//! Contains the feed capability consumed by the transport layer.

pub mod ports;

pub use ports::{ConnectionState, PriceFeed, SharedFeed};
