//! Send command: writes one framed message to a framed-mode server.

use std::fmt::Write as _;

use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use chatwire_protocol::{AsyncFrameReader, FrameGenerator, Message, WireCodec};

use crate::commands::{connect, timed};
use crate::config::{ClientConfig, ConnectionSettings};
use crate::error::{ClientError, ClientResult};

#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    pub addr: Option<String>,
    pub headers: Vec<(String, String)>,
    pub content: String,
    pub wait: bool,
}

/// Builds a message with HTTP-style separators.
pub fn build_message(headers: &[(String, String)], content: &str) -> Message {
    let mut message = Message::http();
    for (key, value) in headers {
        message.add_header(key.as_str(), value.as_str());
    }
    message.set_content(content);
    message
}

pub async fn run(options: SendOptions, config: &ClientConfig) -> ClientResult<()> {
    let message = build_message(&options.headers, &options.content);
    let address = options
        .addr
        .unwrap_or_else(|| config.connection.address.clone());

    let (frames, reply) = exchange(
        address.clone(),
        message.serialize(),
        config.connection.clone(),
        options.wait,
    )
    .await?;
    info!(%address, frames, "Message sent");

    if let Some(reply) = reply {
        print!("{}", render_message(&reply));
    }
    Ok(())
}

/// Sends `payload` as frames and, with `wait`, reads one reassembled message back.
///
/// Returns the number of frames written.
pub async fn exchange(
    address: String,
    payload: Vec<u8>,
    settings: ConnectionSettings,
    wait: bool,
) -> ClientResult<(u32, Option<Message>)> {
    let timeout = settings.timeout();
    let generator = FrameGenerator::new(payload, settings.max_frame_size)?;
    let frames = generator.total_frame_count();
    let mut stream = connect(&address, timeout).await?;

    timed(timeout, "sending message", async {
        for packet in generator {
            stream.write_all(packet.as_bytes()).await?;
        }
        stream.flush().await?;
        Ok::<_, ClientError>(())
    })
    .await?;
    debug!(frames, "Frames written");

    if !wait {
        return Ok((frames, None));
    }

    let payload = timed(timeout, "waiting for the relayed message", async {
        AsyncFrameReader::new(&mut stream, settings.max_message_size)
            .read_payload()
            .await?
            .ok_or_else(|| {
                ClientError::Connection("server closed the connection before relaying".into())
            })
    })
    .await?;

    let mut reply = Message::http();
    reply.parse(&payload)?;
    Ok((frames, Some(reply)))
}

/// Renders headers, a blank line, then the content.
pub fn render_message(message: &Message) -> String {
    let mut out = String::new();
    for (key, value) in message.headers() {
        let _ = writeln!(out, "{}: {}", key, value);
    }
    out.push('\n');
    out.push_str(&String::from_utf8_lossy(message.content()));
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}
