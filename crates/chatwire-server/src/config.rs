//! Server configuration.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use chatwire_protocol::{DEFAULT_MAX_FRAME_SIZE, DEFAULT_MAX_MESSAGE_SIZE, Separators};
use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

/// Default listening port.
pub const DEFAULT_PORT: u16 = 3000;

/// What the server does with each connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServeMode {
    /// Chat relay: every chunk read from a peer is broadcast to all peers.
    #[default]
    Relay,
    /// Frame reassembly: complete messages are validated and re-broadcast.
    Framed,
    /// One HTTP request and response per connection.
    Http,
}

impl ServeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Relay => "relay",
            Self::Framed => "framed",
            Self::Http => "http",
        }
    }
}

impl fmt::Display for ServeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServeMode {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "relay" => Ok(Self::Relay),
            "framed" => Ok(Self::Framed),
            "http" => Ok(Self::Http),
            other => Err(ServerError::config(format!(
                "unknown mode '{other}' (expected relay, framed or http)"
            ))),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on.
    pub bind_addr: SocketAddr,

    /// Connection handling mode.
    pub mode: ServeMode,

    /// Maximum concurrent connections.
    pub max_connections: usize,

    /// Size of each relay read.
    pub read_buffer_size: usize,

    /// Largest frame accepted or produced, header included.
    pub max_frame_size: u32,

    /// Largest reassembled message or HTTP request.
    pub max_message_size: usize,

    /// Timeout for HTTP request reads and response writes.
    pub connection_timeout: Duration,

    /// Separators used to parse framed messages.
    pub separators: Separators,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            mode: ServeMode::default(),
            max_connections: 256,
            read_buffer_size: 1024,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            connection_timeout: Duration::from_secs(30),
            separators: Separators::http(),
        }
    }
}

impl ServerConfig {
    /// Creates a new server configuration listening on `bind_addr`.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    /// Builder: set mode.
    pub fn with_mode(mut self, mode: ServeMode) -> Self {
        self.mode = mode;
        self
    }

    /// Builder: set max connections.
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Builder: set relay read size.
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Builder: set max frame size.
    pub fn with_max_frame_size(mut self, size: u32) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Builder: set max message size.
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Builder: set connection timeout.
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Builder: set framed-mode separators.
    pub fn with_separators(mut self, separators: Separators) -> Self {
        self.separators = separators;
        self
    }

    /// Checks the limits that would otherwise fail per connection.
    pub fn validate(&self) -> ServerResult<()> {
        if self.max_connections == 0 {
            return Err(ServerError::config("max_connections must be at least 1"));
        }
        if self.read_buffer_size == 0 {
            return Err(ServerError::config("read_buffer_size must be at least 1"));
        }
        if self.max_frame_size as usize <= chatwire_protocol::FRAME_HEADER_SIZE {
            return Err(ServerError::config(format!(
                "max_frame_size must exceed the {}-byte frame header",
                chatwire_protocol::FRAME_HEADER_SIZE
            )));
        }
        if self.max_message_size == 0 {
            return Err(ServerError::config("max_message_size must be at least 1"));
        }
        Ok(())
    }
}
