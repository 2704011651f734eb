//! Application Services
//!
//! - [`FeedConnectionManager`]: connection lifecycle, reconnect backoff and
//!   watchlist resubscription for one feed connection

mod feed_manager;

pub use feed_manager::FeedConnectionManager;
