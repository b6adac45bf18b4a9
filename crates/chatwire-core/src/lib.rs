//! Shared pieces used by every chatwire crate.
//!
//! Right now this is the logging setup: the server and the CLI install the
//! same `tracing` subscriber so protocol warnings (duplicate headers,
//! discarded parser state, failed broadcast writes) show up consistently.

pub mod tracing;

pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
