//! Subcommand implementations.

pub mod request;
pub mod send;
pub mod serve;

use std::future::Future;
use std::time::Duration;

use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{ClientError, ClientResult};

/// Connects to `address` (`host:port`), giving up after `timeout`.
pub(crate) async fn connect(address: &str, timeout: Duration) -> ClientResult<TcpStream> {
    debug!(%address, "connecting to server");
    tokio::time::timeout(timeout, TcpStream::connect(address))
        .await
        .map_err(|_| {
            ClientError::Connection(format!(
                "connection to {} timed out after {}s",
                address,
                timeout.as_secs()
            ))
        })?
        .map_err(|e| ClientError::Connection(format!("failed to connect to {}: {}", address, e)))
}

/// Runs one step of an exchange under `timeout`.
pub(crate) async fn timed<T, F>(timeout: Duration, operation: &str, step: F) -> ClientResult<T>
where
    F: Future<Output = ClientResult<T>>,
{
    tokio::time::timeout(timeout, step)
        .await
        .map_err(|_| ClientError::Timeout(operation.to_string()))?
}
