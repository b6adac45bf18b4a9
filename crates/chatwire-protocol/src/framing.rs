//! Frame I/O over byte streams.
//!
//! [`FrameWriter`] fragments each payload with a [`FrameGenerator`] and
//! writes the frames back to back. [`FrameReader`] (blocking) and
//! [`AsyncFrameReader`] (tokio) read frames one at a time and feed them to a
//! [`FrameAssembler`] until a payload completes.
//!
//! Both readers check every header against the frame size limit and the
//! payload budget left in the assembler before reading the frame's data.

use std::io::{ErrorKind, Read, Write};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{ProtocolError, ProtocolResult};
use crate::frame::{FRAME_HEADER_SIZE, Frame, FrameAssembler, FrameGenerator, FrameHeader};

/// Reassembly state and limits shared by both readers.
#[derive(Debug)]
struct Inbound {
    assembler: FrameAssembler,
    max_frame_size: u32,
}

impl Inbound {
    fn new(max_message_size: usize) -> Self {
        Self {
            assembler: FrameAssembler::new(max_message_size),
            max_frame_size: u32::MAX,
        }
    }

    /// Decodes a header read from the stream, refusing frames that could not
    /// be accepted anyway.
    fn admit(&mut self, buf: &[u8; FRAME_HEADER_SIZE], filled: usize) -> ProtocolResult<FrameHeader> {
        if filled < FRAME_HEADER_SIZE {
            return Err(ProtocolError::IncompleteFrame {
                expected: FRAME_HEADER_SIZE,
                received: filled,
            });
        }
        let header = FrameHeader::decode(buf).ok_or(ProtocolError::IncompleteFrame {
            expected: FRAME_HEADER_SIZE,
            received: filled,
        })?;
        header.validate()?;

        if header.frame_size > self.max_frame_size {
            self.assembler.reset();
            return Err(ProtocolError::MessageTooLarge {
                size: header.frame_size as usize,
                max: self.max_frame_size as usize,
            });
        }
        if header.data_len() > self.assembler.remaining() {
            let size = self.assembler.buffered_len() + header.data_len();
            self.assembler.reset();
            return Err(ProtocolError::MessageTooLarge {
                size,
                max: self.assembler.max_message_size(),
            });
        }
        Ok(header)
    }

    fn frame(header: FrameHeader, data: Vec<u8>, received: usize) -> ProtocolResult<Frame> {
        if received < data.len() {
            return Err(ProtocolError::IncompleteFrame {
                expected: header.frame_size as usize,
                received: FRAME_HEADER_SIZE + received,
            });
        }
        Ok(Frame {
            header,
            data: Bytes::from(data),
        })
    }

    /// Result of a stream ending where a header was expected.
    fn end_of_stream(&self) -> ProtocolResult<Option<Vec<u8>>> {
        if self.assembler.is_idle() {
            Ok(None)
        } else {
            Err(ProtocolError::IncompleteFrame {
                expected: FRAME_HEADER_SIZE,
                received: 0,
            })
        }
    }
}

/// Reads framed payloads from a blocking byte stream.
pub struct FrameReader<R> {
    reader: R,
    inbound: Inbound,
}

impl<R: Read> FrameReader<R> {
    /// Creates a reader that refuses payloads larger than `max_message_size`.
    pub fn new(reader: R, max_message_size: usize) -> Self {
        Self {
            reader,
            inbound: Inbound::new(max_message_size),
        }
    }

    /// Also refuses single frames larger than `max_frame_size`, header included.
    #[must_use]
    pub fn with_max_frame_size(mut self, max_frame_size: u32) -> Self {
        self.inbound.max_frame_size = max_frame_size;
        self
    }

    /// Reads frames until one payload is complete.
    ///
    /// Returns `Ok(None)` if the stream ends cleanly between payloads.
    /// EOF in the middle of a frame or payload is an error.
    pub fn read_payload(&mut self) -> ProtocolResult<Option<Vec<u8>>> {
        loop {
            let Some(frame) = self.read_frame()? else {
                return self.inbound.end_of_stream();
            };
            if let Some(payload) = self.inbound.assembler.push(&frame)? {
                return Ok(Some(payload));
            }
        }
    }

    /// Reads a single frame, `None` on EOF before its first byte.
    pub fn read_frame(&mut self) -> ProtocolResult<Option<Frame>> {
        let mut header_buf = [0u8; FRAME_HEADER_SIZE];
        let filled = read_full(&mut self.reader, &mut header_buf)?;
        if filled == 0 {
            return Ok(None);
        }
        let header = self.inbound.admit(&header_buf, filled)?;

        let mut data = vec![0u8; header.data_len()];
        let received = read_full(&mut self.reader, &mut data)?;
        Inbound::frame(header, data, received).map(Some)
    }

    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Fills `buf` as far as the stream allows; returns the byte count read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> ProtocolResult<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

/// Reads framed payloads from a tokio stream.
///
/// Same rules as [`FrameReader`]; used by the server's framed mode and by
/// clients waiting for a relayed message.
pub struct AsyncFrameReader<R> {
    reader: R,
    inbound: Inbound,
}

impl<R: AsyncRead + Unpin> AsyncFrameReader<R> {
    pub fn new(reader: R, max_message_size: usize) -> Self {
        Self {
            reader,
            inbound: Inbound::new(max_message_size),
        }
    }

    #[must_use]
    pub fn with_max_frame_size(mut self, max_frame_size: u32) -> Self {
        self.inbound.max_frame_size = max_frame_size;
        self
    }

    /// Reads frames until one payload is complete, `None` on a clean EOF.
    ///
    /// A recoverable error (bad sequence, changed frame count) drops the
    /// partial payload; the caller may keep reading.
    pub async fn read_payload(&mut self) -> ProtocolResult<Option<Vec<u8>>> {
        loop {
            let Some(frame) = self.read_frame().await? else {
                return self.inbound.end_of_stream();
            };
            if let Some(payload) = self.inbound.assembler.push(&frame)? {
                return Ok(Some(payload));
            }
        }
    }

    pub async fn read_frame(&mut self) -> ProtocolResult<Option<Frame>> {
        let mut header_buf = [0u8; FRAME_HEADER_SIZE];
        let filled = read_full_async(&mut self.reader, &mut header_buf).await?;
        if filled == 0 {
            return Ok(None);
        }
        let header = self.inbound.admit(&header_buf, filled)?;

        let mut data = vec![0u8; header.data_len()];
        let received = read_full_async(&mut self.reader, &mut data).await?;
        Inbound::frame(header, data, received).map(Some)
    }

    /// True when no payload is partially assembled.
    pub fn is_idle(&self) -> bool {
        self.inbound.assembler.is_idle()
    }

    /// Bytes of the current partial payload.
    pub fn buffered_len(&self) -> usize {
        self.inbound.assembler.buffered_len()
    }

    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

async fn read_full_async<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
) -> ProtocolResult<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Writes payloads to a byte stream as frames.
pub struct FrameWriter<W> {
    writer: W,
    max_frame_size: u32,
}

impl<W: Write> FrameWriter<W> {
    /// Creates a writer emitting frames of at most `max_frame_size` bytes.
    ///
    /// The size is validated on the first write.
    pub fn new(writer: W, max_frame_size: u32) -> Self {
        Self {
            writer,
            max_frame_size,
        }
    }

    /// Fragments `payload` and writes every frame; returns the frame count.
    pub fn write_payload(&mut self, payload: impl Into<Bytes>) -> ProtocolResult<u32> {
        let generator = FrameGenerator::new(payload, self.max_frame_size)?;
        let total = generator.total_frame_count();
        for packet in generator {
            self.writer.write_all(packet.as_bytes())?;
        }
        Ok(total)
    }

    pub fn flush(&mut self) -> ProtocolResult<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
