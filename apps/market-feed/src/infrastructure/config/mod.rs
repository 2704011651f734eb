//! Configuration Module
//!
//! Configuration loading for the feed client.

mod settings;

pub use settings::{
    BroadcastSettings, ConfigError, FeedConfig, FeedSettings, PositionSeed, ServerSettings,
};
