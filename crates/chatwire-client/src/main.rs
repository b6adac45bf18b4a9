//! chatwire CLI entry point.

use std::process::ExitCode;

use clap::Parser;

use chatwire_client::cli::{Cli, Command};
use chatwire_client::commands::{request, send, serve};
use chatwire_client::config::ClientConfig;
use chatwire_client::error::{ClientError, ClientResult};
use chatwire_core::{TracingConfig, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut tracing_config = TracingConfig::cli(cli.debug || config.debug);
    if let Some(format) = cli.log_format {
        tracing_config = tracing_config.with_format(format.into());
    }
    if let Some(ref filter) = config.log_filter {
        tracing_config = tracing_config.with_env_filter(filter.as_str());
    }
    if let Err(e) = init_tracing(tracing_config) {
        eprintln!("error: {}", e);
        return ExitCode::FAILURE;
    }

    match run(cli, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// An explicit `--config` must exist; the default path is optional.
fn load_config(cli: &Cli) -> ClientResult<ClientConfig> {
    match cli.config {
        Some(ref path) => ClientConfig::load_from(path).map_err(ClientError::Config),
        None => ClientConfig::load().map_err(ClientError::Config),
    }
}

async fn run(cli: Cli, config: &ClientConfig) -> ClientResult<()> {
    match cli.command {
        Command::Serve {
            bind,
            mode,
            max_connections,
        } => {
            let options = serve::ServeOptions {
                bind,
                mode,
                max_connections,
            };
            serve::run(options, config).await
        }
        Command::Send {
            addr,
            headers,
            content,
            wait,
        } => {
            let options = send::SendOptions {
                addr,
                headers,
                content,
                wait,
            };
            send::run(options, config).await
        }
        Command::Request {
            addr,
            method,
            target,
            headers,
            content,
        } => {
            let options = request::RequestOptions {
                addr,
                method,
                target,
                headers,
                content,
            };
            request::run(options, config).await
        }
    }
}
