//! Observability setup for CAM: structured logging and optional
//! OpenTelemetry span export.

pub mod tracing_setup;
