//! Request command: one HTTP exchange with an http-mode server.

use std::fmt::Write as _;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};

use chatwire_protocol::{HttpMessage, WireCodec};

use crate::commands::{connect, timed};
use crate::config::{ClientConfig, ConnectionSettings};
use crate::error::{ClientError, ClientResult};

#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub addr: Option<String>,
    pub method: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub content: Option<String>,
}

/// Builds the request, adding `Content-Length` when there is a body.
pub fn build_request(
    method: &str,
    target: &str,
    headers: &[(String, String)],
    content: Option<&str>,
) -> HttpMessage {
    let mut request = HttpMessage::new();
    request.request(method, target);
    for (key, value) in headers {
        request.add_header(key.as_str(), value.as_str());
    }
    if let Some(content) = content {
        if request.header("Content-Length").is_none() {
            request.add_header("Content-Length", content.len().to_string());
        }
        request.set_content(content);
    }
    request
}

pub async fn run(options: RequestOptions, config: &ClientConfig) -> ClientResult<()> {
    let request = build_request(
        &options.method,
        &options.target,
        &options.headers,
        options.content.as_deref(),
    );
    let address = options
        .addr
        .unwrap_or_else(|| config.connection.address.clone());

    let response = exchange(address.clone(), request.serialize(), config.connection.clone()).await?;
    info!(
        %address,
        status = response.status_code().unwrap_or_default(),
        "Response received"
    );

    print!("{}", render_response(&response));
    Ok(())
}

/// Writes the request and parses everything the server sends before closing.
pub async fn exchange(
    address: String,
    request: Vec<u8>,
    settings: ConnectionSettings,
) -> ClientResult<HttpMessage> {
    let timeout = settings.timeout();
    let mut stream = connect(&address, timeout).await?;

    timed(timeout, "sending request", async {
        stream.write_all(&request).await?;
        stream.flush().await?;
        Ok::<_, ClientError>(())
    })
    .await?;
    debug!(bytes = request.len(), "Request written");

    let limit = settings.max_message_size;
    let raw = timed(timeout, "reading response", async {
        let mut raw = Vec::new();
        (&mut stream).take(limit as u64 + 1).read_to_end(&mut raw).await?;
        Ok::<_, ClientError>(raw)
    })
    .await?;
    if raw.len() > limit {
        return Err(ClientError::Protocol(format!(
            "response exceeds {} bytes",
            limit
        )));
    }

    let mut response = HttpMessage::new();
    response.parse(&raw)?;
    Ok(response)
}

/// Renders the status line, headers, a blank line, then the body.
pub fn render_response(response: &HttpMessage) -> String {
    let mut out = String::new();
    if let Some(line) = response.start_line() {
        let _ = writeln!(out, "{}", line);
    }
    for (key, value) in response.headers() {
        let _ = writeln!(out, "{}: {}", key, value);
    }
    out.push('\n');
    out.push_str(&String::from_utf8_lossy(response.content()));
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}
