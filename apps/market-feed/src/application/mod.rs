//! Application Layer - The feed connection manager and its ports.
//!
//! The manager is a synchronous state machine. Everything it talks to
//! (transport, timers, display sink) is behind a port trait so the same
//! logic runs against tokio adapters in production and fakes in tests.

/// Port interfaces for the transport, scheduler and display sink.
pub mod ports;

/// Application services.
pub mod services;
