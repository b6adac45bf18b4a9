//! Frame fragmentation and reassembly.
//!
//! A serialized message of any size is cut into frames of at most
//! `max_frame_size` bytes. Every frame starts with a [`FrameHeader`]:
//!
//! ```text
//! byte[0..4)   frame_size         header + data, u32 BE
//! byte[4..8)   sequence_number    1-based, u32 BE
//! byte[8..12)  total_frame_count  same for every frame of a payload, u32 BE
//! byte[12..)   data               frame_size - 12 bytes
//! ```
//!
//! [`FrameGenerator`] produces the frames lazily and cannot be rewound;
//! [`FrameAssembler`] checks ordering on the receiving side and hands back
//! the payload once the last frame arrives. There is no retransmission: a
//! gap or reordering is an error and the partial payload is dropped.

use std::iter::FusedIterator;

use bytes::Bytes;

use crate::error::{ProtocolError, ProtocolResult};
use crate::packet::Packet;

/// Size of the fixed frame header.
pub const FRAME_HEADER_SIZE: usize = 12;

/// Sequence metadata at the start of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Total bytes in the frame, header included.
    pub frame_size: u32,
    /// 1-based position of the frame in its payload.
    pub sequence_number: u32,
    /// Number of frames the payload was split into.
    pub total_frame_count: u32,
}

impl FrameHeader {
    pub fn new(frame_size: u32, sequence_number: u32, total_frame_count: u32) -> Self {
        Self {
            frame_size,
            sequence_number,
            total_frame_count,
        }
    }

    /// Number of data bytes following the header.
    #[inline]
    pub fn data_len(&self) -> usize {
        (self.frame_size as usize).saturating_sub(FRAME_HEADER_SIZE)
    }

    /// True for the final frame of a payload.
    #[inline]
    pub fn is_last(&self) -> bool {
        self.sequence_number == self.total_frame_count
    }

    pub fn encode(&self) -> [u8; FRAME_HEADER_SIZE] {
        let mut buf = [0u8; FRAME_HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.frame_size.to_be_bytes());
        buf[4..8].copy_from_slice(&self.sequence_number.to_be_bytes());
        buf[8..12].copy_from_slice(&self.total_frame_count.to_be_bytes());
        buf
    }

    /// Decodes a header from the first 12 bytes of `buf`.
    ///
    /// Returns `None` if the buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < FRAME_HEADER_SIZE {
            return None;
        }
        Some(Self {
            frame_size: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
            sequence_number: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            total_frame_count: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
        })
    }

    /// Rejects headers whose declared size cannot hold the header itself.
    pub fn validate(&self) -> ProtocolResult<()> {
        if (self.frame_size as usize) < FRAME_HEADER_SIZE {
            return Err(ProtocolError::InvalidFrameSize {
                declared: self.frame_size,
                header: FRAME_HEADER_SIZE,
                available: FRAME_HEADER_SIZE,
            });
        }
        Ok(())
    }
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub data: Bytes,
}

impl Frame {
    /// Decodes exactly one frame from `buf`.
    pub fn decode(buf: &[u8]) -> ProtocolResult<Self> {
        let header = FrameHeader::decode(buf).ok_or(ProtocolError::IncompleteFrame {
            expected: FRAME_HEADER_SIZE,
            received: buf.len(),
        })?;
        header.validate()?;

        let declared = header.frame_size as usize;
        if declared > buf.len() {
            return Err(ProtocolError::IncompleteFrame {
                expected: declared,
                received: buf.len(),
            });
        }
        if declared < buf.len() {
            return Err(ProtocolError::InvalidFrameSize {
                declared: header.frame_size,
                header: FRAME_HEADER_SIZE,
                available: buf.len(),
            });
        }

        Ok(Self {
            header,
            data: Bytes::copy_from_slice(&buf[FRAME_HEADER_SIZE..]),
        })
    }

    /// Decodes a packet produced by [`FrameGenerator`].
    pub fn from_packet(packet: &Packet) -> ProtocolResult<Self> {
        Self::decode(packet.as_bytes())
    }

    #[inline]
    pub fn sequence_number(&self) -> u32 {
        self.header.sequence_number
    }

    #[inline]
    pub fn total_frame_count(&self) -> u32 {
        self.header.total_frame_count
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Lazily splits one payload into frames.
///
/// Single use: once exhausted it keeps returning `None`.
#[derive(Debug)]
pub struct FrameGenerator {
    payload: Bytes,
    max_frame_size: u32,
    offset: usize,
    generated: u32,
    total: u32,
}

impl FrameGenerator {
    /// Prepares to fragment `payload` into frames of at most `max_frame_size` bytes.
    ///
    /// Fails if `max_frame_size` leaves no room for data after the header,
    /// or if the payload would need more than `u32::MAX` frames.
    pub fn new(payload: impl Into<Bytes>, max_frame_size: u32) -> ProtocolResult<Self> {
        let payload = payload.into();
        let chunk = (max_frame_size as usize)
            .checked_sub(FRAME_HEADER_SIZE)
            .filter(|chunk| *chunk > 0)
            .ok_or_else(|| {
                ProtocolError::config(format!(
                    "max frame size {max_frame_size} must exceed the {FRAME_HEADER_SIZE}-byte header"
                ))
            })?;

        let total = u32::try_from(payload.len().div_ceil(chunk)).map_err(|_| {
            ProtocolError::config(format!(
                "payload of {} bytes needs more than {} frames of {max_frame_size} bytes",
                payload.len(),
                u32::MAX
            ))
        })?;

        Ok(Self {
            payload,
            max_frame_size,
            offset: 0,
            generated: 0,
            total,
        })
    }

    /// Produces the next frame, or `None` once the payload is exhausted.
    pub fn next_frame(&mut self) -> Option<Packet> {
        if self.is_finished() {
            return None;
        }

        let data_len = self.chunk_size().min(self.payload.len() - self.offset);
        let data = &self.payload[self.offset..self.offset + data_len];
        let header = FrameHeader::new(
            (data_len + FRAME_HEADER_SIZE) as u32,
            self.generated + 1,
            self.total,
        );

        self.offset += data_len;
        self.generated += 1;

        Some(Packet::from_parts(&[&header.encode(), data]))
    }

    /// Frames this payload will be split into; 0 for an empty payload.
    pub fn total_frame_count(&self) -> u32 {
        self.total
    }

    /// Frames produced so far.
    pub fn generated_count(&self) -> u32 {
        self.generated
    }

    pub fn max_frame_size(&self) -> u32 {
        self.max_frame_size
    }

    pub fn is_finished(&self) -> bool {
        self.offset >= self.payload.len()
    }

    fn chunk_size(&self) -> usize {
        self.max_frame_size as usize - FRAME_HEADER_SIZE
    }
}

impl Iterator for FrameGenerator {
    type Item = Packet;

    fn next(&mut self) -> Option<Packet> {
        self.next_frame()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.total - self.generated) as usize;
        (left, Some(left))
    }
}

impl ExactSizeIterator for FrameGenerator {}

impl FusedIterator for FrameGenerator {}

/// Fragments `payload` and concatenates the frames, ready to be written to a stream.
pub fn encode_frames(payload: &[u8], max_frame_size: u32) -> ProtocolResult<Vec<u8>> {
    let generator = FrameGenerator::new(Bytes::copy_from_slice(payload), max_frame_size)?;
    let mut out =
        Vec::with_capacity(payload.len() + generator.len() * FRAME_HEADER_SIZE);
    for packet in generator {
        out.extend_from_slice(packet.as_bytes());
    }
    Ok(out)
}

/// Reassembles payloads from frames received in order.
#[derive(Debug)]
pub struct FrameAssembler {
    max_message_size: usize,
    next_sequence: u32,
    expected_total: Option<u32>,
    buffer: Vec<u8>,
}

impl FrameAssembler {
    /// Creates an assembler refusing payloads larger than `max_message_size`.
    pub fn new(max_message_size: usize) -> Self {
        Self {
            max_message_size,
            next_sequence: 1,
            expected_total: None,
            buffer: Vec::new(),
        }
    }

    /// Adds one frame; returns the payload when `frame` completes it.
    ///
    /// Any error discards the partial payload, so the next frame must start
    /// a new one at sequence number 1.
    pub fn push(&mut self, frame: &Frame) -> ProtocolResult<Option<Vec<u8>>> {
        let result = self.accept(frame);
        if result.is_err() {
            self.reset();
        }
        result
    }

    fn accept(&mut self, frame: &Frame) -> ProtocolResult<Option<Vec<u8>>> {
        let header = frame.header;

        if header.total_frame_count == 0 {
            return Err(ProtocolError::parse(
                "frame declares a total frame count of 0",
            ));
        }
        if header.sequence_number != self.next_sequence {
            return Err(ProtocolError::UnexpectedSequence {
                expected: self.next_sequence,
                received: header.sequence_number,
            });
        }
        match self.expected_total {
            Some(expected) if expected != header.total_frame_count => {
                return Err(ProtocolError::FrameCountMismatch {
                    expected,
                    received: header.total_frame_count,
                });
            }
            Some(_) => {}
            None => self.expected_total = Some(header.total_frame_count),
        }

        let size = self.buffer.len() + frame.data.len();
        if size > self.max_message_size {
            return Err(ProtocolError::MessageTooLarge {
                size,
                max: self.max_message_size,
            });
        }

        self.buffer.extend_from_slice(&frame.data);
        self.next_sequence += 1;

        if header.is_last() {
            let payload = std::mem::take(&mut self.buffer);
            self.reset();
            Ok(Some(payload))
        } else {
            Ok(None)
        }
    }

    /// True when no payload is partially assembled.
    pub fn is_idle(&self) -> bool {
        self.expected_total.is_none()
    }

    /// Bytes of the payload collected so far.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Payload bytes that can still be accepted before the size limit.
    pub fn remaining(&self) -> usize {
        self.max_message_size.saturating_sub(self.buffer.len())
    }

    /// Drops any partial payload.
    pub fn reset(&mut self) {
        self.next_sequence = 1;
        self.expected_total = None;
        self.buffer.clear();
    }
}
