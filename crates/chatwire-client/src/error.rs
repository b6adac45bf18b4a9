//! Client error types.

use std::fmt;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client.
#[derive(Debug)]
pub enum ClientError {
    /// Configuration error.
    Config(String),
    /// IO error.
    Io(std::io::Error),
    /// Connecting to the server failed.
    Connection(String),
    /// Framing or message parse error.
    Protocol(String),
    /// The server failed to start or stopped with an error.
    Server(String),
    /// An operation timed out.
    Timeout(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {}", msg),
            Self::Io(err) => write!(f, "IO error: {}", err),
            Self::Connection(msg) => write!(f, "connection error: {}", msg),
            Self::Protocol(msg) => write!(f, "protocol error: {}", msg),
            Self::Server(msg) => write!(f, "server error: {}", msg),
            Self::Timeout(msg) => write!(f, "timeout: {}", msg),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                Self::Timeout(err.to_string())
            }
            _ => Self::Io(err),
        }
    }
}

impl From<chatwire_protocol::ProtocolError> for ClientError {
    fn from(err: chatwire_protocol::ProtocolError) -> Self {
        match err {
            chatwire_protocol::ProtocolError::Io(io) => io.into(),
            other => Self::Protocol(other.to_string()),
        }
    }
}

impl From<chatwire_server::ServerError> for ClientError {
    fn from(err: chatwire_server::ServerError) -> Self {
        match err {
            chatwire_server::ServerError::Config { message } => Self::Config(message),
            other => Self::Server(other.to_string()),
        }
    }
}
