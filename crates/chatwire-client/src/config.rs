//! Client configuration.
//!
//! Settings live in a single `config.toml` file at
//! `~/.config/chatwire/config.toml` by default:
//!
//! ```toml
//! log_filter = "chatwire_server=debug"
//!
//! [server]
//! bind = "0.0.0.0:3000"
//! mode = "framed"
//! max_connections = 64
//!
//! [connection]
//! address = "chat.example.net:3000"
//! timeout_secs = 10
//! ```
//!
//! Command-line flags override anything set here.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use chatwire_protocol::{DEFAULT_MAX_FRAME_SIZE, DEFAULT_MAX_MESSAGE_SIZE, Separators};
use chatwire_server::{ServeMode, ServerConfig};

use crate::error::{ClientError, ClientResult};

/// Configuration for the chatwire binary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Debug mode.
    pub debug: bool,

    /// Log filter directive (`RUST_LOG` syntax), e.g. `"chatwire_server=debug"`.
    pub log_filter: Option<String>,

    /// Settings for `chatwire serve`.
    pub server: ServerSettings,

    /// Settings for `chatwire send` and `chatwire request`.
    pub connection: ConnectionSettings,
}

/// Server settings, mirroring [`ServerConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: SocketAddr,
    pub mode: ServeMode,
    pub max_connections: usize,
    pub read_buffer_size: usize,
    pub max_frame_size: u32,
    pub max_message_size: usize,
    /// HTTP read/write timeout in seconds.
    pub connection_timeout_secs: u64,
    pub key_value_separator: String,
    pub entry_separator: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        let defaults = ServerConfig::default();
        let separators = Separators::http();
        Self {
            bind: defaults.bind_addr,
            mode: defaults.mode,
            max_connections: defaults.max_connections,
            read_buffer_size: defaults.read_buffer_size,
            max_frame_size: defaults.max_frame_size,
            max_message_size: defaults.max_message_size,
            connection_timeout_secs: defaults.connection_timeout.as_secs(),
            key_value_separator: separators.key_value().to_string(),
            entry_separator: separators.entry().to_string(),
        }
    }
}

impl ServerSettings {
    /// Converts to a validated server configuration.
    pub fn to_server_config(&self) -> ClientResult<ServerConfig> {
        let separators = Separators::new(&self.key_value_separator, &self.entry_separator)
            .map_err(|e| ClientError::Config(e.to_string()))?;

        let config = ServerConfig::new(self.bind)
            .with_mode(self.mode)
            .with_max_connections(self.max_connections)
            .with_read_buffer_size(self.read_buffer_size)
            .with_max_frame_size(self.max_frame_size)
            .with_max_message_size(self.max_message_size)
            .with_connection_timeout(Duration::from_secs(self.connection_timeout_secs))
            .with_separators(separators);
        config.validate()?;
        Ok(config)
    }
}

/// Settings used when connecting to a running server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// `host:port` of the server.
    pub address: String,

    /// Connect/read/write timeout in seconds.
    pub timeout_secs: u64,

    /// Frame size used by `send`.
    pub max_frame_size: u32,

    /// Largest reply accepted.
    pub max_message_size: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            address: format!("127.0.0.1:{}", chatwire_server::DEFAULT_PORT),
            timeout_secs: 5,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl ConnectionSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ClientConfig {
    /// Loads configuration from the default path, or defaults if it does not exist.
    pub fn load() -> Result<Self, String> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read config {}: {}", path.display(), e))?;
        toml::from_str(&content)
            .map_err(|e| format!("failed to parse config {}: {}", path.display(), e))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("chatwire")
    }
}
