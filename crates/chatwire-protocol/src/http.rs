//! HTTP-shaped messages.
//!
//! An [`HttpMessage`] is a start line followed by `"\r\n"` and a
//! [`Message`] using `": "` / `"\r\n"`:
//!
//! ```text
//! request-line ::= METHOD " " TARGET " " VERSION
//! status-line  ::= VERSION " " STATUS-CODE " " REASON
//! ```
//!
//! A start line whose first token begins with `HTTP` is a status line;
//! anything else must be a three-token request line.

use std::fmt;

use tracing::warn;

use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{Message, WireCodec, find};

/// The only version a response is written with.
pub const HTTP_1_1: &str = "HTTP/1.1";

/// First line of an HTTP message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartLine {
    Request {
        method: String,
        target: String,
        version: String,
    },
    /// `reason` keeps its words separated by single spaces, so
    /// `"HTTP/1.1 404 Not Found"` parses to `"Not Found"`, not `"NotFound"`.
    Status {
        version: String,
        code: i32,
        reason: String,
    },
}

impl StartLine {
    /// Parses a start line (without its terminator).
    pub fn parse(line: &str) -> ProtocolResult<Self> {
        let tokens: Vec<&str> = line.split(' ').collect();
        if tokens.len() < 3 {
            return Err(ProtocolError::parse(format!("invalid start line {line:?}")));
        }

        if tokens[0].starts_with("HTTP") {
            let code = tokens[1].parse::<i32>().map_err(|_| {
                ProtocolError::parse(format!("invalid status code {:?}", tokens[1]))
            })?;
            Ok(Self::Status {
                version: tokens[0].to_string(),
                code,
                reason: tokens[2..].join(" "),
            })
        } else {
            if tokens.len() != 3 {
                return Err(ProtocolError::parse(format!(
                    "invalid request line {line:?}"
                )));
            }
            Ok(Self::Request {
                method: tokens[0].to_string(),
                target: tokens[1].to_string(),
                version: tokens[2].to_string(),
            })
        }
    }

    pub fn version(&self) -> &str {
        match self {
            Self::Request { version, .. } | Self::Status { version, .. } => version,
        }
    }

    pub fn is_request(&self) -> bool {
        matches!(self, Self::Request { .. })
    }
}

impl fmt::Display for StartLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request {
                method,
                target,
                version,
            } => write!(f, "{method} {target} {version}"),
            Self::Status {
                version,
                code,
                reason,
            } => write!(f, "{version} {code} {reason}"),
        }
    }
}

/// A request or response: start line plus headers and content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpMessage {
    start_line: Option<StartLine>,
    version: String,
    message: Message,
}

impl Default for HttpMessage {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpMessage {
    pub fn new() -> Self {
        Self {
            start_line: None,
            version: HTTP_1_1.to_string(),
            message: Message::http(),
        }
    }

    /// Sets the start line to a request line using the current version.
    pub fn request(&mut self, method: impl Into<String>, target: impl Into<String>) -> &mut Self {
        self.warn_if_start_line_set();
        self.start_line = Some(StartLine::Request {
            method: method.into(),
            target: target.into(),
            version: self.version.clone(),
        });
        self
    }

    /// Sets the start line to a status line. Responses are always HTTP/1.1.
    pub fn response(&mut self, code: i32, reason: impl Into<String>) -> &mut Self {
        self.warn_if_start_line_set();
        if self.version != HTTP_1_1 {
            warn!(version = %self.version, "responses must be HTTP/1.1, overriding version");
            self.version = HTTP_1_1.to_string();
        }
        self.start_line = Some(StartLine::Status {
            version: self.version.clone(),
            code,
            reason: reason.into(),
        });
        self
    }

    fn warn_if_start_line_set(&self) {
        if let Some(existing) = &self.start_line {
            warn!(start_line = %existing, "start line already exists, overwriting");
        }
    }

    /// Version used for the next request line.
    pub fn set_version(&mut self, version: impl Into<String>) -> &mut Self {
        self.version = version.into();
        self
    }

    pub fn start_line(&self) -> Option<&StartLine> {
        self.start_line.as_ref()
    }

    /// Request method, empty unless the start line is a request line.
    pub fn method(&self) -> &str {
        match &self.start_line {
            Some(StartLine::Request { method, .. }) => method,
            _ => "",
        }
    }

    /// Request target, empty unless the start line is a request line.
    pub fn target(&self) -> &str {
        match &self.start_line {
            Some(StartLine::Request { target, .. }) => target,
            _ => "",
        }
    }

    pub fn version(&self) -> &str {
        self.start_line
            .as_ref()
            .map_or(self.version.as_str(), StartLine::version)
    }

    /// Status code, `None` until a status line is set or parsed.
    pub fn status_code(&self) -> Option<i32> {
        match &self.start_line {
            Some(StartLine::Status { code, .. }) => Some(*code),
            _ => None,
        }
    }

    /// Reason phrase, empty unless the start line is a status line.
    pub fn reason(&self) -> &str {
        match &self.start_line {
            Some(StartLine::Status { reason, .. }) => reason,
            _ => "",
        }
    }

    pub fn add_header(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.message.add_header(key, value)
    }

    pub fn set_content(&mut self, content: impl Into<Vec<u8>>) -> Option<Vec<u8>> {
        self.message.set_content(content)
    }

    /// Sets the content and records its type in a `Content-Type` header.
    pub fn set_content_with_type(
        &mut self,
        content: impl Into<Vec<u8>>,
        content_type: impl Into<String>,
    ) -> &mut Self {
        self.message.add_header("Content-Type", content_type);
        self.message.set_content(content);
        self
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.message.header(key)
    }

    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.message.headers()
    }

    pub fn content(&self) -> &[u8] {
        self.message.content()
    }

    pub fn content_str(&self) -> Option<&str> {
        self.message.content_str()
    }

    /// The header/content part.
    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn message_mut(&mut self) -> &mut Message {
        &mut self.message
    }

    fn reset_start_line(&mut self) {
        self.start_line = None;
        self.version = HTTP_1_1.to_string();
    }
}

impl WireCodec for HttpMessage {
    fn serialize(&self) -> Vec<u8> {
        let entry = self.message.separators().entry().as_bytes();
        let line = match &self.start_line {
            Some(line) => line.to_string(),
            None => {
                warn!("serializing an HTTP message without a start line");
                String::new()
            }
        };

        let mut out = Vec::with_capacity(line.len() + entry.len() + 64);
        out.extend_from_slice(line.as_bytes());
        out.extend_from_slice(entry);
        self.message.write_to(&mut out);
        out
    }

    /// Parses a start line, then hands the rest to [`Message`]'s parser.
    ///
    /// On failure the start line is unset.
    fn parse(&mut self, input: &[u8]) -> ProtocolResult<()> {
        if let Some(existing) = &self.start_line {
            warn!(start_line = %existing, "existing start line will be discarded by parse");
        }
        self.reset_start_line();

        let entry = self.message.separators().entry().as_bytes();
        let (line, rest) = match find(input, entry, 0) {
            Some(end) => (&input[..end], Some(&input[end + entry.len()..])),
            None => (input, None),
        };

        let line = std::str::from_utf8(line)
            .map_err(|_| ProtocolError::parse("start line is not valid UTF-8"))?;
        let start_line = StartLine::parse(line)?;
        let rest = rest.ok_or_else(|| ProtocolError::parse("start line is not terminated"))?;

        self.version = start_line.version().to_string();
        self.start_line = Some(start_line);

        if let Err(e) = self.message.parse(rest) {
            self.reset_start_line();
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUEST: &str = "POST /test.jpg HTTP/1.1\r\n\
                           Host: localhost:8000\r\n\
                           User-Agent: Mozilla/5.0 Chrome/99.99\r\n\
                           Content-Type: Text\r\n\
                           \r\n\
                           Hello, network!";

    const RESPONSE: &str = "HTTP/1.1 403 FORBIDDEN\r\n\
                            Server: Apache\r\n\
                            Content-Type: text/html; charset=iso-8895-1\r\n\
                            Date: Sun, 6 Nov 2022 20:54:51 GMT\r\n\
                            Content-Length: 67\r\n\
                            \r\n\
                            <!DOCTYPE HTML PUBLIC \"-//IETF/DTD HTML 2.0//EN\">\
                            <h1>FORBIDDEN</h1>";

    #[test]
    fn build_request() {
        let mut http = HttpMessage::new();
        http.request("POST", "/test.jpg");
        http.add_header("Host", "localhost:8000");
        http.add_header("User-Agent", "Mozilla/5.0 Chrome/99.99");
        http.set_content_with_type("Hello, network!", "Text");

        assert_eq!(http.serialize(), REQUEST.as_bytes());
    }

    #[test]
    fn build_response() {
        let mut http = HttpMessage::new();
        http.response(404, "FORBIDDEN");
        http.add_header("header", "value");
        http.set_content_with_type("Access denied", "Text");

        assert_eq!(
            http.serialize(),
            b"HTTP/1.1 404 FORBIDDEN\r\nheader: value\r\nContent-Type: Text\r\n\r\nAccess denied"
        );
    }

    #[test]
    fn parse_request() {
        let mut parser = HttpMessage::new();
        parser.parse(REQUEST.as_bytes()).unwrap();

        assert_eq!(parser.method(), "POST");
        assert_eq!(parser.target(), "/test.jpg");
        assert_eq!(parser.version(), "HTTP/1.1");
        assert_eq!(parser.status_code(), None);
        assert_eq!(parser.header("Host"), Some("localhost:8000"));
        assert_eq!(parser.header("User-Agent"), Some("Mozilla/5.0 Chrome/99.99"));
        assert_eq!(parser.header("Content-Type"), Some("Text"));
        assert_eq!(parser.content(), b"Hello, network!");
    }

    #[test]
    fn parse_minimal_request() {
        let mut parser = HttpMessage::new();
        parser.parse(b"POST /test.jpg HTTP/1.1\r\nHost: localhost:8000\r\n\r\nHello, network!")
            .unwrap();
        assert_eq!(parser.method(), "POST");
        assert_eq!(parser.content_str(), Some("Hello, network!"));

        parser.parse(b"POST /key.txt HTTP1.1\r\n\r\n").unwrap();
        assert_eq!(parser.target(), "/key.txt");
        assert_eq!(parser.version(), "HTTP1.1");
        assert_eq!(parser.message().header_count(), 0);
    }

    #[test]
    fn parse_rejects_malformed_requests() {
        let mut parser = HttpMessage::new();
        for input in [
            "You are such a moron",
            "POST /key.txt HTTP1.1\r\n",
            "POST /key.txt HTTP1.1\r\nheader:key",
            "POST /key.txt HTTP1.1\r\nheader:key\r\n",
            "POST /key.txt\r\n\r\n",
            "GET / HTTP/1.1 extra\r\n\r\n",
        ] {
            assert!(
                matches!(parser.parse(input.as_bytes()), Err(ProtocolError::Parse(_))),
                "accepted {input:?}"
            );
            assert!(parser.start_line().is_none());
        }
    }

    #[test]
    fn parse_response() {
        let mut parser = HttpMessage::new();
        parser.parse(RESPONSE.as_bytes()).unwrap();

        assert_eq!(parser.status_code(), Some(403));
        assert_eq!(parser.version(), "HTTP/1.1");
        assert_eq!(parser.reason(), "FORBIDDEN");
        assert_eq!(parser.header("Server"), Some("Apache"));
        assert_eq!(
            parser.header("Content-Type"),
            Some("text/html; charset=iso-8895-1")
        );
        assert_eq!(parser.header("Date"), Some("Sun, 6 Nov 2022 20:54:51 GMT"));
        assert_eq!(
            parser.content_str(),
            Some("<!DOCTYPE HTML PUBLIC \"-//IETF/DTD HTML 2.0//EN\"><h1>FORBIDDEN</h1>")
        );
    }

    #[test]
    fn reason_phrase_keeps_its_words() {
        let mut parser = HttpMessage::new();
        parser.parse(b"HTTP/1.0 404 Not Found\r\n\r\n").unwrap();
        assert_eq!(parser.reason(), "Not Found");
        assert_eq!(parser.version(), "HTTP/1.0");
    }

    #[test]
    fn status_code_must_be_an_integer() {
        let mut parser = HttpMessage::new();
        assert!(parser.parse(b"HTTP/1.1 abc OK\r\n\r\n").is_err());
        assert!(parser.parse(b"HTTP/1.1 20x OK\r\n\r\n").is_err());
        assert_eq!(parser.status_code(), None);
    }

    #[test]
    fn response_forces_http_1_1() {
        let mut http = HttpMessage::new();
        http.set_version("HTTP/1.0");
        http.request("GET", "/");
        assert_eq!(http.version(), "HTTP/1.0");

        http.response(200, "OK");
        assert_eq!(http.version(), HTTP_1_1);
        assert_eq!(http.method(), "");
        insta::assert_snapshot!(http.start_line().unwrap().to_string(), @"HTTP/1.1 200 OK");
    }

    #[test]
    fn request_after_response_overwrites() {
        let mut http = HttpMessage::new();
        http.response(500, "Internal Server Error");
        http.request("DELETE", "/item/7");
        assert!(http.start_line().unwrap().is_request());
        assert_eq!(http.status_code(), None);
        insta::assert_snapshot!(http.start_line().unwrap().to_string(), @"DELETE /item/7 HTTP/1.1");
    }

    #[test]
    fn roundtrip_through_frames() {
        let mut http = HttpMessage::new();
        http.request("PUT", "/upload");
        http.add_header("Host", "example");
        http.set_content(vec![b'x'; 200]);

        let mut bytes = Vec::new();
        for packet in http.frames(64).unwrap() {
            bytes.extend_from_slice(&packet.as_bytes()[crate::FRAME_HEADER_SIZE..]);
        }

        let mut parsed = HttpMessage::new();
        parsed.parse(&bytes).unwrap();
        assert_eq!(parsed, http);
    }

    #[test]
    fn serialize_without_start_line_starts_with_blank_line() {
        let mut http = HttpMessage::new();
        http.add_header("k", "v");
        assert_eq!(http.serialize(), b"\r\nk: v\r\n\r\n");
    }
}
