//! Configuration Module
//!
//! Configuration loading for the exchange rate stream service.

mod settings;

pub use settings::{
    ConfigError, FeedMode, FinnhubSettings, ServerSettings, StreamConfig, StreamSettings,
    SyntheticSettings,
};
