//! Tracing setup for chatwire.
//!
//! The protocol crate reports its non-fatal conditions (overwritten headers,
//! discarded parser state, forced HTTP version) as `warn!` events and the
//! server logs every connection and broadcast failure. The `chatwire`
//! binary installs one subscriber for all of them through [`init_tracing`]:
//!
//! ```ignore
//! use chatwire_core::tracing::{init_tracing, TracingConfig, TracingOutputFormat};
//!
//! init_tracing(TracingConfig::cli(false).with_format(TracingOutputFormat::Json))?;
//! ```

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Errors that can occur during tracing initialization
#[derive(Debug, Error)]
pub enum TracingError {
    /// A global subscriber was already installed
    #[error("failed to set global tracing subscriber: {0}")]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    /// The filter directive could not be parsed
    #[error("failed to parse log filter: {0}")]
    EnvFilter(#[from] tracing_subscriber::filter::ParseError),
}

/// Output format for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingOutputFormat {
    /// Multi-line human readable output
    Pretty,
    /// Single line per event, no timestamp
    Compact,
    /// Newline delimited JSON, for a relay whose output is collected
    Json,
}

/// What [`init_tracing`] installs.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Level for the `chatwire` targets when no filter is given
    pub level: Level,
    pub format: TracingOutputFormat,
    /// Adds the target and file:line of each callsite
    pub verbose: bool,
    /// Filter directive overriding both `level` and `RUST_LOG`
    pub env_filter: Option<String>,
}

impl TracingConfig {
    /// Config for the command line; `debug` lowers the level and adds callsites.
    #[must_use]
    pub fn cli(debug: bool) -> Self {
        Self {
            level: if debug { Level::DEBUG } else { Level::INFO },
            format: TracingOutputFormat::Compact,
            verbose: debug,
            env_filter: None,
        }
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingOutputFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    fn filter(&self) -> Result<EnvFilter, TracingError> {
        match self.env_filter {
            Some(ref directive) => Ok(EnvFilter::try_new(directive)?),
            None => Ok(EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("chatwire={}", self.level)))),
        }
    }
}

/// Installs the global subscriber described by `config`.
///
/// # Errors
///
/// Fails if a global subscriber is already set or the filter is invalid.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let filter = config.filter()?;
    let verbose = config.verbose;

    match config.format {
        TracingOutputFormat::Pretty => tracing::subscriber::set_global_default(
            tracing_subscriber::registry().with(filter).with(
                fmt::layer()
                    .pretty()
                    .with_target(verbose)
                    .with_file(verbose)
                    .with_line_number(verbose),
            ),
        )?,
        TracingOutputFormat::Compact => tracing::subscriber::set_global_default(
            tracing_subscriber::registry().with(filter).with(
                fmt::layer()
                    .compact()
                    .without_time()
                    .with_target(verbose)
                    .with_file(verbose)
                    .with_line_number(verbose),
            ),
        )?,
        TracingOutputFormat::Json => tracing::subscriber::set_global_default(
            tracing_subscriber::registry().with(filter).with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_file(verbose)
                    .with_line_number(verbose),
            ),
        )?,
    }

    Ok(())
}
