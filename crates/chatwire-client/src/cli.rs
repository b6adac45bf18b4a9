//! Command-line interface definition.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use chatwire_core::TracingOutputFormat;
use chatwire_server::ServeMode;

/// chatwire - broadcast chat relay and framed message tools
#[derive(Debug, Parser)]
#[command(name = "chatwire")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "CHATWIRE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v', global = true)]
    pub debug: bool,

    /// Log line format
    #[arg(long, value_enum, global = true)]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the server until SIGINT/SIGTERM
    Serve {
        /// Address to listen on
        #[arg(long, env = "CHATWIRE_BIND")]
        bind: Option<SocketAddr>,

        /// Connection handling mode (relay, framed, http)
        #[arg(long)]
        mode: Option<ServeMode>,

        /// Maximum concurrent connections
        #[arg(long)]
        max_connections: Option<usize>,
    },

    /// Send one framed message to a framed-mode server
    Send {
        /// Server address (host:port)
        #[arg(long, env = "CHATWIRE_ADDR")]
        addr: Option<String>,

        /// Header as KEY=VALUE (can be repeated)
        #[arg(long = "header", short = 'H', value_parser = parse_header, action = clap::ArgAction::Append)]
        headers: Vec<(String, String)>,

        /// Message content
        #[arg(long, default_value = "")]
        content: String,

        /// Wait for the relayed message and print it
        #[arg(long)]
        wait: bool,
    },

    /// Send an HTTP request to an http-mode server
    Request {
        /// Server address (host:port)
        #[arg(long, env = "CHATWIRE_ADDR")]
        addr: Option<String>,

        /// Request method
        method: String,

        /// Request target
        target: String,

        /// Header as KEY=VALUE (can be repeated)
        #[arg(long = "header", short = 'H', value_parser = parse_header, action = clap::ArgAction::Append)]
        headers: Vec<(String, String)>,

        /// Request body
        #[arg(long)]
        content: Option<String>,
    },
}

/// Log line formats selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

impl From<LogFormat> for TracingOutputFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
            LogFormat::Json => Self::Json,
        }
    }
}

/// Parses a `KEY=VALUE` header argument.
fn parse_header(arg: &str) -> Result<(String, String), String> {
    let (key, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("invalid header '{arg}': expected KEY=VALUE"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("invalid header '{arg}': empty key"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_serve_flags() {
        let cli = Cli::try_parse_from([
            "chatwire",
            "serve",
            "--bind",
            "127.0.0.1:4000",
            "--mode",
            "framed",
            "--max-connections",
            "8",
        ])
        .unwrap();

        match cli.command {
            Command::Serve {
                bind,
                mode,
                max_connections,
            } => {
                assert_eq!(bind, Some("127.0.0.1:4000".parse().unwrap()));
                assert_eq!(mode, Some(ServeMode::Framed));
                assert_eq!(max_connections, Some(8));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parse_send_headers() {
        let cli = Cli::try_parse_from([
            "chatwire",
            "send",
            "-H",
            "From=alice",
            "--header",
            "Channel = general",
            "--content",
            "hi",
            "--wait",
        ])
        .unwrap();

        match cli.command {
            Command::Send {
                addr,
                headers,
                content,
                wait,
            } => {
                assert_eq!(addr, None);
                assert_eq!(
                    headers,
                    vec![
                        ("From".to_string(), "alice".to_string()),
                        ("Channel".to_string(), "general".to_string()),
                    ]
                );
                assert_eq!(content, "hi");
                assert!(wait);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parse_request_positionals() {
        let cli = Cli::try_parse_from([
            "chatwire",
            "--debug",
            "request",
            "POST",
            "/echo",
            "--content",
            "body",
        ])
        .unwrap();

        assert!(cli.debug);
        match cli.command {
            Command::Request {
                method,
                target,
                content,
                ..
            } => {
                assert_eq!(method, "POST");
                assert_eq!(target, "/echo");
                assert_eq!(content.as_deref(), Some("body"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_header() {
        assert!(parse_header("no-equals").is_err());
        assert!(parse_header("=value").is_err());
        assert_eq!(
            parse_header("k=a=b").unwrap(),
            ("k".to_string(), "a=b".to_string())
        );
    }

    #[test]
    fn rejects_unknown_mode() {
        assert!(Cli::try_parse_from(["chatwire", "serve", "--mode", "gopher"]).is_err());
    }
}
