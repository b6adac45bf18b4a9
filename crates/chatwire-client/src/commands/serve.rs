//! Serve command: runs the server in the foreground.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use chatwire_server::{
    ServeMode, ServerConfig, SignalHandler, SocketServer, make_connection_handler,
    new_shared_registry,
};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// Command-line overrides for the `[server]` settings.
#[derive(Debug, Clone, Default)]
pub struct ServeOptions {
    pub bind: Option<SocketAddr>,
    pub mode: Option<ServeMode>,
    pub max_connections: Option<usize>,
}

/// Merges the configuration file with command-line overrides.
pub fn server_config(options: &ServeOptions, config: &ClientConfig) -> ClientResult<ServerConfig> {
    let mut server = config.server.to_server_config()?;
    if let Some(bind) = options.bind {
        server.bind_addr = bind;
    }
    if let Some(mode) = options.mode {
        server = server.with_mode(mode);
    }
    if let Some(max) = options.max_connections {
        server = server.with_max_connections(max);
    }
    server.validate()?;
    Ok(server)
}

/// Starts the server and blocks until SIGINT/SIGTERM.
pub async fn run(options: ServeOptions, config: &ClientConfig) -> ClientResult<()> {
    let server_config = server_config(&options, config)?;

    let signal_handler = SignalHandler::new();
    signal_handler.spawn_listener()?;

    let server = SocketServer::bind(server_config)
        .await
        .map_err(|e| ClientError::Server(format!("failed to start server: {}", e)))?;

    serve(server, signal_handler.shutdown().wait()).await
}

/// Serves connections on an already bound server until `shutdown` completes.
pub async fn serve<S>(server: SocketServer, shutdown: S) -> ClientResult<()>
where
    S: Future<Output = ()> + Send,
{
    let registry = new_shared_registry();
    let handler = make_connection_handler(Arc::new(server.config().clone()), registry.clone());

    info!(
        addr = %server.local_addr()?,
        mode = %server.config().mode,
        "Serving"
    );
    server.run_until_shutdown(handler, shutdown).await?;

    let peers = registry.len().await;
    info!(peers, "Server stopped");
    Ok(())
}
