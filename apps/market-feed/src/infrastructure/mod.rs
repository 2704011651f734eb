//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete implementations of the application ports plus the runtime
//! plumbing around them.

/// Broadcast channels and the display sink that feeds them.
pub mod broadcast;

/// Driver task that owns the connection manager.
pub mod client;

/// Configuration loading.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Tracing subscriber and OpenTelemetry setup.
pub mod telemetry;

/// Tokio and virtual-clock schedulers.
pub mod timer;

/// WebSocket transport.
pub mod websocket;
