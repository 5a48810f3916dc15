//! Observability setup for parley processes.

pub mod tracing_setup;
