//! Domain Layer - Feed types and connection lifecycle rules.
//!
//! Pure types with no I/O: connection state and retry budget, the watchlist
//! subscription set, inbound/outbound message types with their JSON codec,
//! display formatting and portfolio valuation.

/// Connection state, status notifications, retry budget and errors.
pub mod connection;

/// Portfolio positions and totals.
pub mod portfolio;

/// Feed message types, codec and display formatting.
pub mod streaming;

/// Watchlist subscription set.
pub mod subscription;
