//! Observability setup for GenSX binaries.

pub mod tracing_setup;
