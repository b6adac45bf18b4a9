//! Connection handlers, one per [`ServeMode`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chatwire_protocol::{
    AsyncFrameReader, HttpMessage, Message, ProtocolError, WireCodec, encode_frames,
};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, warn};

use crate::config::{ServeMode, ServerConfig};
use crate::error::{ServerError, ServerResult};
use crate::registry::SharedRegistry;
use crate::socket::Connection;

/// Value of the `Server` header on HTTP responses.
pub const SERVER_NAME: &str = concat!("chatwire/", env!("CARGO_PKG_VERSION"));

/// Handles connections according to the configured mode.
pub struct ConnectionHandler {
    config: Arc<ServerConfig>,
    registry: SharedRegistry,
}

impl ConnectionHandler {
    pub fn new(config: Arc<ServerConfig>, registry: SharedRegistry) -> Self {
        Self { config, registry }
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// Serves one connection until the peer leaves.
    #[tracing::instrument(skip_all, fields(peer = %conn.peer_addr(), mode = %self.config.mode))]
    pub async fn handle_connection(&self, conn: Connection) -> ServerResult<()> {
        match self.config.mode {
            ServeMode::Relay => self.serve_relay(conn).await,
            ServeMode::Framed => self.serve_framed(conn).await,
            ServeMode::Http => self.serve_http(conn).await,
        }
    }

    async fn serve_relay(&self, conn: Connection) -> ServerResult<()> {
        let (mut reader, writer) = conn.into_split();
        let id = self.registry.register(writer).await;
        info!(peer_id = %id, "Peer joined");

        let result = self.relay_chunks(&mut reader).await;

        // Close the socket only once it is out of the registry.
        let handle = self.registry.deregister(id).await;
        drop(handle);
        info!(peer_id = %id, "Peer left");
        result
    }

    async fn relay_chunks<R: AsyncRead + Unpin>(&self, reader: &mut R) -> ServerResult<()> {
        let mut buf = vec![0u8; self.config.read_buffer_size];
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                return Ok(());
            }
            let delivered = self.registry.broadcast(&buf[..n]).await;
            debug!(bytes = n, delivered, "Relayed chunk");
        }
    }

    async fn serve_framed(&self, conn: Connection) -> ServerResult<()> {
        let (mut reader, writer) = conn.into_split();
        let id = self.registry.register(writer).await;
        info!(peer_id = %id, "Peer joined");

        let result = self.relay_messages(&mut reader).await;

        let handle = self.registry.deregister(id).await;
        drop(handle);
        info!(peer_id = %id, "Peer left");
        result
    }

    /// Reassembles frames into messages, validates them and re-broadcasts
    /// each valid one as freshly generated frames.
    async fn relay_messages<R: AsyncRead + Unpin>(&self, reader: R) -> ServerResult<()> {
        let mut frames = AsyncFrameReader::new(reader, self.config.max_message_size)
            .with_max_frame_size(self.config.max_frame_size);

        loop {
            let payload = match frames.read_payload().await {
                Ok(Some(payload)) => payload,
                Ok(None) => return Ok(()),
                Err(e) if e.is_recoverable() => {
                    warn!(error = %e, "Discarding partial message");
                    continue;
                }
                Err(ProtocolError::IncompleteFrame { .. }) => {
                    warn!(
                        buffered = frames.buffered_len(),
                        "Peer closed in the middle of a message"
                    );
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            };

            let mut message = Message::new(self.config.separators.clone());
            if let Err(e) = message.parse(&payload) {
                warn!(error = %e, bytes = payload.len(), "Dropping invalid message");
                continue;
            }

            let encoded = encode_frames(&message.serialize(), self.config.max_frame_size)?;
            let delivered = self.registry.broadcast(&encoded).await;
            debug!(
                headers = message.header_count(),
                content_len = message.content().len(),
                delivered,
                "Relayed message"
            );
        }
    }

    async fn serve_http(&self, mut conn: Connection) -> ServerResult<()> {
        let response = match self.read_request(&mut conn).await {
            Ok(RequestRead::Closed) => {
                debug!("Client closed before sending a request");
                return Ok(());
            }
            Ok(RequestRead::TooLarge) => {
                warn!(max = self.config.max_message_size, "Request too large");
                error_response(413, "Payload Too Large")
            }
            Ok(RequestRead::Complete(bytes)) => {
                let mut request = HttpMessage::new();
                match request.parse(&bytes) {
                    Ok(()) => respond_to(&request),
                    Err(e) => {
                        warn!(error = %e, "Rejecting malformed request");
                        error_response(400, "Bad Request")
                    }
                }
            }
            Err(ServerError::Timeout { .. }) => {
                warn!(timeout = ?conn.timeout(), "Request read timed out");
                error_response(408, "Request Timeout")
            }
            Err(e) => return Err(e),
        };

        info!(
            status = response.status_code().unwrap_or_default(),
            reason = response.reason(),
            "Sending response"
        );
        conn.write_all(&response.serialize()).await?;
        conn.shutdown().await
    }

    /// Reads the request head up to the blank line, then `Content-Length`
    /// bytes of body.
    async fn read_request(&self, conn: &mut Connection) -> ServerResult<RequestRead> {
        let limit = self.config.max_message_size;
        let mut buf = Vec::new();
        let mut chunk = vec![0u8; self.config.read_buffer_size];
        let mut expected: Option<usize> = None;
        // Bytes already searched for the blank line.
        let mut scanned = 0;

        loop {
            match expected {
                Some(total) if buf.len() >= total => {
                    buf.truncate(total);
                    return Ok(RequestRead::Complete(buf));
                }
                Some(_) => {}
                None => {
                    if let Some(end) = find_blank_line(&buf, scanned) {
                        let head_len = end + BLANK_LINE.len();
                        let total = head_len.saturating_add(content_length(&buf[..head_len]));
                        if total > limit {
                            return Ok(RequestRead::TooLarge);
                        }
                        expected = Some(total);
                        continue;
                    }
                    if buf.len() > limit {
                        return Ok(RequestRead::TooLarge);
                    }
                    scanned = buf.len().saturating_sub(BLANK_LINE.len() - 1);
                }
            }

            let n = conn.read_chunk(&mut chunk).await?;
            if n == 0 {
                if buf.is_empty() {
                    return Ok(RequestRead::Closed);
                }
                return Ok(RequestRead::Complete(buf));
            }
            buf.extend_from_slice(&chunk[..n]);
        }
    }
}

enum RequestRead {
    Closed,
    TooLarge,
    Complete(Vec<u8>),
}

const BLANK_LINE: &[u8] = b"\r\n\r\n";

/// Position of the first `\r\n\r\n` starting at or after `from`.
fn find_blank_line(buf: &[u8], from: usize) -> Option<usize> {
    buf.get(from..)?
        .windows(BLANK_LINE.len())
        .position(|window| window == BLANK_LINE)
        .map(|pos| from + pos)
}

/// `Content-Length` of a request head, 0 when absent or unreadable.
fn content_length(head: &[u8]) -> usize {
    let mut request = HttpMessage::new();
    if request.parse(head).is_err() {
        return 0;
    }
    request
        .headers()
        .find(|(key, _)| key.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}

fn respond_to(request: &HttpMessage) -> HttpMessage {
    debug!(
        method = request.method(),
        target = request.target(),
        content_len = request.content().len(),
        "Handling request"
    );
    match request.method() {
        "GET" => build_response(
            200,
            "OK",
            format!("You requested {}\n", request.target()).into_bytes(),
            "text/plain",
        ),
        "POST" => {
            let content_type = request
                .headers()
                .find(|(key, _)| key.eq_ignore_ascii_case("content-type"))
                .map_or("application/octet-stream", |(_, value)| value);
            build_response(200, "OK", request.content().to_vec(), content_type)
        }
        _ => {
            let mut response = error_response(405, "Method Not Allowed");
            response.add_header("Allow", "GET, POST");
            response
        }
    }
}

fn error_response(code: i32, reason: &str) -> HttpMessage {
    build_response(
        code,
        reason,
        format!("{code} {reason}\n").into_bytes(),
        "text/plain",
    )
}

fn build_response(code: i32, reason: &str, content: Vec<u8>, content_type: &str) -> HttpMessage {
    let mut response = HttpMessage::new();
    response.response(code, reason);
    response.add_header("Server", SERVER_NAME);
    let len = content.len();
    response.set_content_with_type(content, content_type);
    response.add_header("Content-Length", len.to_string());
    response
}

/// Creates a connection handler closure for [`crate::SocketServer::run`].
pub fn make_connection_handler(
    config: Arc<ServerConfig>,
    registry: SharedRegistry,
) -> impl Fn(Connection) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync + 'static {
    let handler = Arc::new(ConnectionHandler::new(config, registry));
    move |conn| {
        let handler = handler.clone();
        Box::pin(async move {
            if let Err(e) = handler.handle_connection(conn).await
                && !matches!(e, ServerError::Shutdown)
            {
                warn!(error = %e, "Connection handler error");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::time::Duration;

    use chatwire_protocol::{FrameHeader, Separators};
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpStream;

    use crate::registry::new_shared_registry;
    use crate::socket::SocketServer;

    async fn start(config: ServerConfig) -> (SocketAddr, SharedRegistry) {
        let server = SocketServer::bind(config).await.unwrap();
        let addr = server.local_addr().unwrap();
        let registry = new_shared_registry();
        let handler = make_connection_handler(Arc::new(server.config().clone()), registry.clone());
        tokio::spawn(async move {
            let _ = server.run(handler).await;
        });
        (addr, registry)
    }

    fn loopback(mode: ServeMode) -> ServerConfig {
        ServerConfig::new("127.0.0.1:0".parse().unwrap())
            .with_mode(mode)
            .with_connection_timeout(Duration::from_secs(5))
    }

    async fn wait_for_peers(registry: &SharedRegistry, expected: usize) {
        for _ in 0..500 {
            if registry.len().await == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("registry never reached {expected} peers");
    }

    async fn read_message(stream: &mut TcpStream, separators: Separators) -> Message {
        let payload = AsyncFrameReader::new(stream, 1024 * 1024)
            .read_payload()
            .await
            .unwrap()
            .unwrap();
        let mut message = Message::new(separators);
        message.parse(&payload).unwrap();
        message
    }

    async fn http_exchange(addr: SocketAddr, request: &[u8]) -> HttpMessage {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request).await.unwrap();
        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await.unwrap();

        let mut response = HttpMessage::new();
        response.parse(&raw).unwrap();
        response
    }

    #[tokio::test]
    async fn relay_broadcasts_to_every_peer_including_sender() {
        let (addr, registry) = start(loopback(ServeMode::Relay)).await;
        let mut alice = TcpStream::connect(addr).await.unwrap();
        let mut bob = TcpStream::connect(addr).await.unwrap();
        wait_for_peers(&registry, 2).await;

        alice.write_all(b"hello").await.unwrap();

        let mut buf = [0u8; 5];
        bob.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
        alice.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[tokio::test]
    async fn relay_deregisters_on_disconnect() {
        let (addr, registry) = start(loopback(ServeMode::Relay)).await;
        let first = TcpStream::connect(addr).await.unwrap();
        let mut second = TcpStream::connect(addr).await.unwrap();
        wait_for_peers(&registry, 2).await;

        drop(first);
        wait_for_peers(&registry, 1).await;

        second.write_all(b"anyone?").await.unwrap();
        let mut buf = [0u8; 7];
        second.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"anyone?");
    }

    #[tokio::test]
    async fn framed_relays_valid_messages() {
        let config = loopback(ServeMode::Framed).with_max_frame_size(32);
        let (addr, registry) = start(config).await;
        let mut sender = TcpStream::connect(addr).await.unwrap();
        let mut receiver = TcpStream::connect(addr).await.unwrap();
        wait_for_peers(&registry, 2).await;

        let mut message = Message::http();
        message.add_header("From", "alice");
        message.add_header("Channel", "general");
        message.set_content("a message long enough to need several frames");

        let frames = encode_frames(&message.serialize(), 32).unwrap();
        sender.write_all(&frames).await.unwrap();

        let received = read_message(&mut receiver, Separators::http()).await;
        assert_eq!(received.header("From"), Some("alice"));
        assert_eq!(received.header("Channel"), Some("general"));
        assert_eq!(received.content(), message.content());
    }

    #[tokio::test]
    async fn framed_drops_invalid_messages() {
        let (addr, registry) = start(loopback(ServeMode::Framed)).await;
        let mut sender = TcpStream::connect(addr).await.unwrap();
        let mut receiver = TcpStream::connect(addr).await.unwrap();
        wait_for_peers(&registry, 2).await;

        let garbage = encode_frames(b"no separators here\r\n\r\n", 65535).unwrap();
        sender.write_all(&garbage).await.unwrap();

        let mut valid = Message::http();
        valid.add_header("k", "v");
        valid.set_content("ok");
        sender
            .write_all(&encode_frames(&valid.serialize(), 65535).unwrap())
            .await
            .unwrap();

        let received = read_message(&mut receiver, Separators::http()).await;
        assert_eq!(received.header("k"), Some("v"));
        assert_eq!(received.content(), b"ok");
    }

    #[tokio::test]
    async fn framed_closes_on_oversized_frame() {
        let config = loopback(ServeMode::Framed).with_max_frame_size(64);
        let (addr, registry) = start(config).await;
        let mut peer = TcpStream::connect(addr).await.unwrap();
        wait_for_peers(&registry, 1).await;

        peer.write_all(&FrameHeader::new(1000, 1, 1).encode())
            .await
            .unwrap();
        wait_for_peers(&registry, 0).await;
    }

    #[tokio::test]
    async fn framed_closes_when_frame_exceeds_message_limit() {
        let config = loopback(ServeMode::Framed).with_max_message_size(100);
        let (addr, registry) = start(config).await;
        let mut peer = TcpStream::connect(addr).await.unwrap();
        wait_for_peers(&registry, 1).await;

        // Fits the frame size limit but not the message limit; no data follows.
        peer.write_all(&FrameHeader::new(1000, 1, 1).encode())
            .await
            .unwrap();
        wait_for_peers(&registry, 0).await;
    }

    #[tokio::test]
    async fn framed_peer_closing_mid_message_is_deregistered() {
        let config = loopback(ServeMode::Framed).with_max_frame_size(20);
        let (addr, registry) = start(config).await;
        let mut peer = TcpStream::connect(addr).await.unwrap();
        wait_for_peers(&registry, 1).await;

        let frames = encode_frames(b"k: v\r\n\r\nlonger content", 20).unwrap();
        peer.write_all(&frames[..20]).await.unwrap();
        drop(peer);
        wait_for_peers(&registry, 0).await;
    }

    #[tokio::test]
    async fn http_get_describes_target() {
        let (addr, registry) = start(loopback(ServeMode::Http)).await;
        let response = http_exchange(
            addr,
            b"GET /index.html HTTP/1.1\r\nHost: localhost\r\n\r\n",
        )
        .await;

        assert_eq!(response.status_code(), Some(200));
        assert_eq!(response.reason(), "OK");
        assert_eq!(response.header("Server"), Some(SERVER_NAME));
        assert_eq!(response.header("Content-Type"), Some("text/plain"));
        assert_eq!(response.content_str(), Some("You requested /index.html\n"));
        assert_eq!(
            response.header("Content-Length"),
            Some(response.content().len().to_string().as_str())
        );
        // HTTP connections never join the broadcast set.
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn http_post_echoes_content() {
        let (addr, _registry) = start(loopback(ServeMode::Http)).await;
        let mut request = HttpMessage::new();
        request.request("POST", "/echo");
        request.add_header("Content-Length", "15");
        request.set_content_with_type("Hello, network!", "text/x-greeting");

        let response = http_exchange(addr, &request.serialize()).await;
        assert_eq!(response.status_code(), Some(200));
        assert_eq!(response.header("Content-Type"), Some("text/x-greeting"));
        assert_eq!(response.content(), b"Hello, network!");
    }

    #[tokio::test]
    async fn http_body_arriving_late_is_read() {
        let (addr, _registry) = start(loopback(ServeMode::Http)).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"POST /late HTTP/1.1\r\nContent-Length: 4\r\n\r\n")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        stream.write_all(b"body").await.unwrap();

        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await.unwrap();
        let mut response = HttpMessage::new();
        response.parse(&raw).unwrap();
        assert_eq!(response.content(), b"body");
    }

    #[tokio::test]
    async fn http_rejects_other_methods() {
        let (addr, _registry) = start(loopback(ServeMode::Http)).await;
        let response = http_exchange(addr, b"DELETE /item HTTP/1.1\r\n\r\n").await;
        assert_eq!(response.status_code(), Some(405));
        assert_eq!(response.header("Allow"), Some("GET, POST"));
    }

    #[tokio::test]
    async fn http_malformed_request_is_bad_request() {
        let (addr, _registry) = start(loopback(ServeMode::Http)).await;
        let response = http_exchange(addr, b"You are such a moron\r\n\r\n").await;
        assert_eq!(response.status_code(), Some(400));
        assert_eq!(response.content_str(), Some("400 Bad Request\n"));
    }

    #[tokio::test]
    async fn http_oversized_request_is_refused() {
        let config = loopback(ServeMode::Http).with_max_message_size(256);
        let (addr, _registry) = start(config).await;
        let response = http_exchange(
            addr,
            b"POST /big HTTP/1.1\r\nContent-Length: 100000\r\n\r\n",
        )
        .await;
        assert_eq!(response.status_code(), Some(413));
    }

    #[tokio::test]
    async fn http_slow_client_times_out() {
        let config = loopback(ServeMode::Http).with_connection_timeout(Duration::from_millis(50));
        let (addr, _registry) = start(config).await;
        let response = http_exchange(addr, b"GET / HTTP/1.1\r\n").await;
        assert_eq!(response.status_code(), Some(408));
    }

    #[test]
    fn blank_line_scan_resumes_where_it_stopped() {
        let mut buf = b"GET / HTTP/1.1\r\nHost: x\r\n".to_vec();
        assert_eq!(find_blank_line(&buf, 0), None);

        // The next chunk completes a blank line that straddles the boundary.
        let scanned = buf.len().saturating_sub(BLANK_LINE.len() - 1);
        buf.extend_from_slice(b"\r\nbody");
        assert_eq!(find_blank_line(&buf, scanned), Some(23));
        assert_eq!(find_blank_line(&buf, 0), Some(23));
        assert_eq!(find_blank_line(&buf, buf.len() + 1), None);
    }

    #[test]
    fn content_length_lookup_ignores_case() {
        assert_eq!(content_length(b"POST / HTTP/1.1\r\ncontent-length: 12\r\n\r\n"), 12);
        assert_eq!(content_length(b"POST / HTTP/1.1\r\nContent-Length: x\r\n\r\n"), 0);
        assert_eq!(content_length(b"nonsense\r\n\r\n"), 0);
    }
}
