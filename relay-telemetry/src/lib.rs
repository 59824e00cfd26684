//! Telemetry setup for the relay services.
//!
//! Provides tracing initialization with environment-appropriate output:
//! structured JSON logs on rotating files in production-like environments,
//! pretty-printed console logs in development.

pub mod tracing;
