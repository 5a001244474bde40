//! Observability setup for Linkbot: structured logging with optional
//! OpenTelemetry span export.

pub mod tracing_setup;
