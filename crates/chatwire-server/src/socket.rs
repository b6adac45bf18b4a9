//! TCP listener and per-connection I/O.

use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, ReadBuf};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};

/// TCP server handing accepted connections to a handler.
pub struct SocketServer {
    config: ServerConfig,
    listener: TcpListener,
    /// Limits concurrent connections to `max_connections`.
    connection_semaphore: Arc<Semaphore>,
}

impl SocketServer {
    /// Validates the configuration and binds the listener.
    pub async fn bind(config: ServerConfig) -> ServerResult<Self> {
        config.validate()?;

        let listener = TcpListener::bind(config.bind_addr).await?;
        info!(
            addr = %listener.local_addr()?,
            mode = %config.mode,
            max_connections = config.max_connections,
            "Server listening"
        );

        let connection_semaphore = Arc::new(Semaphore::new(config.max_connections));

        Ok(Self {
            config,
            listener,
            connection_semaphore,
        })
    }

    /// The bound address; differs from the configured one when port 0 was requested.
    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Accepts a single connection, waiting for a free slot first.
    pub async fn accept(&self) -> ServerResult<Connection> {
        let permit = self
            .connection_semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ServerError::Shutdown)?;

        let (stream, peer_addr) = self.listener.accept().await?;
        debug!(peer = %peer_addr, "Accepted new connection");

        Ok(Connection {
            stream,
            peer_addr,
            timeout: self.config.connection_timeout,
            permit,
        })
    }

    /// Runs the accept loop, spawning the handler for each connection.
    ///
    /// Accept errors are logged and the loop continues.
    pub async fn run<F, Fut>(&self, handler: F) -> ServerResult<()>
    where
        F: Fn(Connection) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        loop {
            match self.accept().await {
                Ok(connection) => {
                    tokio::spawn(handler(connection));
                }
                Err(ServerError::Shutdown) => return Err(ServerError::Shutdown),
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    /// Runs the accept loop until `shutdown` completes.
    pub async fn run_until_shutdown<F, Fut, S>(&self, handler: F, shutdown: S) -> ServerResult<()>
    where
        F: Fn(Connection) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
        S: std::future::Future<Output = ()> + Send,
    {
        tokio::select! {
            result = self.run(handler) => result,
            _ = shutdown => {
                info!("Shutdown signal received");
                Ok(())
            }
        }
    }
}

/// An accepted client connection.
///
/// Holds a connection slot until dropped.
pub struct Connection {
    stream: TcpStream,
    peer_addr: SocketAddr,
    timeout: Duration,
    permit: OwnedSemaphorePermit,
}

impl Connection {
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Reads whatever is available into `buf`; `Ok(0)` means the peer closed.
    pub async fn read_chunk(&mut self, buf: &mut [u8]) -> ServerResult<usize> {
        match tokio::time::timeout(self.timeout, self.stream.read(buf)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ServerError::timeout("read")),
        }
    }

    /// Writes all of `bytes`.
    pub async fn write_all(&mut self, bytes: &[u8]) -> ServerResult<()> {
        match tokio::time::timeout(self.timeout, self.stream.write_all(bytes)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ServerError::timeout("write")),
        }
    }

    /// Closes the write direction, signalling EOF to the peer.
    pub async fn shutdown(&mut self) -> ServerResult<()> {
        self.stream.shutdown().await?;
        Ok(())
    }

    /// Splits into a reader that keeps the connection slot and a write half
    /// that can be registered for broadcast.
    pub fn into_split(self) -> (ConnectionReader, OwnedWriteHalf) {
        let (read, write) = self.stream.into_split();
        let reader = ConnectionReader {
            inner: read,
            peer_addr: self.peer_addr,
            _permit: self.permit,
        };
        (reader, write)
    }
}

/// Read side of a split [`Connection`].
pub struct ConnectionReader {
    inner: OwnedReadHalf,
    peer_addr: SocketAddr,
    _permit: OwnedSemaphorePermit,
}

impl ConnectionReader {
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }
}

impl AsyncRead for ConnectionReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}
