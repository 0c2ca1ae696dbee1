//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the feed port
//! defined in the application layer, plus the HTTP surface.

/// Finnhub WebSocket feed adapter.
pub mod finnhub;

/// Synthetic price feed for local development.
pub mod synthetic;

/// Listener registry and fan-out delivery.
pub mod broadcast;

/// Configuration loading.
pub mod config;

/// SSE stream, health, and metrics HTTP server.
pub mod http;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Logging and OpenTelemetry tracing setup.
pub mod telemetry;
