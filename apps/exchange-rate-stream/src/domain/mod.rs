//! Domain Layer - Core pricing types.
//!
//! Pure types with no I/O: the tracked symbol universe and the latest-price
//! cache.

/// Price observations and the latest-price cache.
pub mod pricing;

/// Tracked trading pairs and display names.
pub mod symbols;
