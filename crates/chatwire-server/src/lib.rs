//! TCP server for chatwire.
//!
//! This crate provides:
//! - A [`PeerRegistry`] of connected peers with lock-held broadcast
//! - A TCP [`SocketServer`] with a bounded number of concurrent connections
//! - Connection handlers for the relay, framed and HTTP modes
//! - SIGINT/SIGTERM driven shutdown
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use chatwire_server::{
//!     ServerConfig, SignalHandler, SocketServer, make_connection_handler, new_shared_registry,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = SocketServer::bind(ServerConfig::default()).await?;
//!     let signals = SignalHandler::new();
//!     signals.spawn_listener()?;
//!
//!     let handler = make_connection_handler(
//!         Arc::new(server.config().clone()),
//!         new_shared_registry(),
//!     );
//!     server
//!         .run_until_shutdown(handler, signals.shutdown().wait())
//!         .await?;
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod handler;
mod registry;
mod signals;
mod socket;

pub use config::{DEFAULT_PORT, ServeMode, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use handler::{ConnectionHandler, SERVER_NAME, make_connection_handler};
pub use registry::{PeerId, PeerRegistry, SharedRegistry, new_shared_registry};
pub use signals::{ShutdownHandle, ShutdownSignal, SignalHandler};
pub use socket::{Connection, ConnectionReader, SocketServer};
