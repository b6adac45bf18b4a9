//! Wire format codecs for chatwire.
//!
//! # Layers
//!
//! - [`Packet`]: fixed-capacity byte buffer with a write cursor and checked
//!   reads/writes.
//! - [`FrameGenerator`]: splits a serialized payload into bounded frames,
//!   each starting with a 12-byte [`FrameHeader`]; [`FrameAssembler`] puts
//!   them back together on the receiving side; [`FrameReader`] and
//!   [`AsyncFrameReader`] do that over a blocking or tokio stream.
//! - [`Message`]: ordered unique headers plus opaque content, serialized as
//!   `key<kv-sep>value<entry-sep>...<entry-sep>content`.
//! - [`HttpMessage`]: a request or status line layered on a `Message`
//!   using `": "` and `"\r\n"`.
//!
//! # Frame layout
//!
//! ```text
//! +----------------+-----------------+-------------------+--------------+
//! | frame_size (4) | sequence (4)    | total_frames (4)  | data ...     |
//! +----------------+-----------------+-------------------+--------------+
//! ```
//!
//! All three fields are big-endian `u32`; `sequence` starts at 1.
//!
//! # Example
//!
//! ```rust
//! use chatwire_protocol::{HttpMessage, WireCodec};
//!
//! let mut request = HttpMessage::new();
//! request.request("POST", "/test.jpg");
//! request.add_header("Host", "localhost:8000");
//! request.set_content("Hello, network!");
//!
//! let bytes = request.serialize();
//! let mut parsed = HttpMessage::new();
//! parsed.parse(&bytes).unwrap();
//! assert_eq!(parsed.method(), "POST");
//! assert_eq!(parsed.content(), b"Hello, network!");
//! ```

mod error;
mod frame;
mod framing;
mod http;
mod message;
mod packet;

pub use error::{ProtocolError, ProtocolResult};
pub use frame::{
    FRAME_HEADER_SIZE, Frame, FrameAssembler, FrameGenerator, FrameHeader, encode_frames,
};
pub use framing::{AsyncFrameReader, FrameReader, FrameWriter};
pub use http::{HTTP_1_1, HttpMessage, StartLine};
pub use message::{Message, Separators, WireCodec};
pub use packet::{Packet, WireInt};

/// Default maximum frame size, header included.
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 65535;

/// Default upper bound on a reassembled payload (1 MB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;
