//! Generic header + content message.
//!
//! Wire layout, with both separators configurable per message:
//!
//! ```text
//! <key><key_value_sep><value><entry_sep>     one line per header, insertion order
//! <entry_sep>                                blank line ends the headers
//! <content, verbatim and unterminated>
//! ```
//!
//! Header keys are unique. Header values must not contain the entry
//! separator; content may contain anything.

use tracing::warn;

use crate::error::{ProtocolError, ProtocolResult};
use crate::frame::FrameGenerator;

/// Serialize/parse contract shared by [`Message`] and [`crate::HttpMessage`].
pub trait WireCodec {
    /// Renders the message to its wire bytes.
    fn serialize(&self) -> Vec<u8>;

    /// Replaces the message with the one encoded in `input`.
    fn parse(&mut self, input: &[u8]) -> ProtocolResult<()>;

    /// Serializes and prepares the bytes for fragmentation.
    fn frames(&self, max_frame_size: u32) -> ProtocolResult<FrameGenerator> {
        FrameGenerator::new(self.serialize(), max_frame_size)
    }
}

/// The two separators a message is written with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Separators {
    key_value: String,
    entry: String,
}

impl Separators {
    /// Creates a separator pair; neither may be empty.
    pub fn new(key_value: impl Into<String>, entry: impl Into<String>) -> ProtocolResult<Self> {
        let key_value = key_value.into();
        let entry = entry.into();
        if key_value.is_empty() || entry.is_empty() {
            return Err(ProtocolError::config("separators must not be empty"));
        }
        Ok(Self { key_value, entry })
    }

    /// `": "` between key and value, `"\r\n"` after each entry.
    pub fn http() -> Self {
        Self {
            key_value: ": ".to_string(),
            entry: "\r\n".to_string(),
        }
    }

    pub fn key_value(&self) -> &str {
        &self.key_value
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }
}

impl Default for Separators {
    fn default() -> Self {
        Self::http()
    }
}

/// Ordered, unique headers plus an opaque content blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    separators: Separators,
    headers: Vec<(String, String)>,
    content: Vec<u8>,
}

impl Default for Message {
    fn default() -> Self {
        Self::http()
    }
}

impl Message {
    /// Creates an empty message written with `separators`.
    pub fn new(separators: Separators) -> Self {
        Self {
            separators,
            headers: Vec::new(),
            content: Vec::new(),
        }
    }

    /// Creates an empty message with HTTP separators.
    pub fn http() -> Self {
        Self::new(Separators::http())
    }

    pub fn separators(&self) -> &Separators {
        &self.separators
    }

    /// Adds a header, or overwrites the value of an existing key in place.
    ///
    /// Returns the overwritten value, if any.
    pub fn add_header(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = key.into();
        let value = value.into();

        match self.headers.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, slot)) => {
                warn!(key = %key, "header already exists, overwriting");
                Some(std::mem::replace(slot, value))
            }
            None => {
                self.headers.push((key, value));
                None
            }
        }
    }

    /// Sets the content; returns the previous content if there was any.
    pub fn set_content(&mut self, content: impl Into<Vec<u8>>) -> Option<Vec<u8>> {
        let previous = std::mem::replace(&mut self.content, content.into());
        if previous.is_empty() {
            None
        } else {
            warn!("content already exists, overwriting");
            Some(previous)
        }
    }

    /// Looks up a header value by exact key.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.as_str())
    }

    /// Headers in insertion order.
    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn header_count(&self) -> usize {
        self.headers.len()
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// The content as text, if it is valid UTF-8.
    pub fn content_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.content).ok()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty() && self.content.is_empty()
    }

    /// Drops all headers and content; separators are kept.
    pub fn clear(&mut self) {
        self.headers.clear();
        self.content.clear();
    }

    /// Appends the wire form to `out`.
    pub(crate) fn write_to(&self, out: &mut Vec<u8>) {
        let kv = self.separators.key_value.as_bytes();
        let entry = self.separators.entry.as_bytes();

        for (key, value) in &self.headers {
            out.extend_from_slice(key.as_bytes());
            out.extend_from_slice(kv);
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(entry);
        }
        out.extend_from_slice(entry);
        out.extend_from_slice(&self.content);
    }

    fn serialized_len(&self) -> usize {
        let kv = self.separators.key_value.len();
        let entry = self.separators.entry.len();
        self.headers
            .iter()
            .map(|(k, v)| k.len() + kv + v.len() + entry)
            .sum::<usize>()
            + entry
            + self.content.len()
    }
}

impl WireCodec for Message {
    fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.serialized_len());
        self.write_to(&mut out);
        out
    }

    /// Parses `input`, discarding whatever the message held before.
    ///
    /// Empty input is rejected without touching the current state. Any
    /// other failure leaves the message empty.
    fn parse(&mut self, input: &[u8]) -> ProtocolResult<()> {
        if !self.headers.is_empty() {
            warn!(count = self.headers.len(), "existing headers will be discarded by parse");
        }
        if !self.content.is_empty() {
            warn!(len = self.content.len(), "existing content will be discarded by parse");
        }
        if input.is_empty() {
            return Err(ProtocolError::parse("empty message"));
        }
        self.clear();

        let (fields, content) = split_sections(input, &self.separators)?;
        for (key, value) in fields {
            self.add_header(key, value);
        }
        self.content = content.to_vec();
        Ok(())
    }
}

/// Splits `input` into header pairs and the content slice.
///
/// Scanning stops at the first empty line; everything after its separator
/// is content. Input that ends right after a header line has no content.
fn split_sections<'a>(
    input: &'a [u8],
    separators: &Separators,
) -> ProtocolResult<(Vec<(String, String)>, &'a [u8])> {
    let entry = separators.entry.as_bytes();
    let kv = separators.key_value.as_bytes();

    let mut fields = Vec::new();
    let mut cursor = 0;
    let mut content_start = input.len();

    while cursor < input.len() {
        let end = find(input, entry, cursor).ok_or_else(|| {
            ProtocolError::parse(format!(
                "header line {:?} is not terminated",
                String::from_utf8_lossy(&input[cursor..])
            ))
        })?;

        if end == cursor {
            content_start = cursor + entry.len();
            break;
        }

        let line = &input[cursor..end];
        let split = find(line, kv, 0).ok_or_else(|| {
            ProtocolError::parse(format!(
                "header line {:?} has no key/value separator",
                String::from_utf8_lossy(line)
            ))
        })?;

        fields.push((
            utf8(&line[..split], "header key")?,
            utf8(&line[split + kv.len()..], "header value")?,
        ));
        cursor = end + entry.len();
    }

    Ok((fields, &input[content_start.min(input.len())..]))
}

/// Position of the first `needle` in `haystack` at or after `from`.
pub(crate) fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() || needle.is_empty() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}

fn utf8(bytes: &[u8], what: &str) -> ProtocolResult<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| ProtocolError::parse(format!("{what} is not valid UTF-8")))
}
