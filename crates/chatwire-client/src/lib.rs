//! chatwire command-line interface.
//!
//! This crate provides the `chatwire` binary: `serve` runs the relay,
//! framed or HTTP server; `send` and `request` talk to one.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

pub use cli::Cli;
pub use error::{ClientError, ClientResult};
