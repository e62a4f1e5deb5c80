//! DCCNET Frame Structures and Serialization
//!
//! Every frame starts with an 8-byte sync marker followed by a 7-byte header
//! and the payload. All multi-byte integers are big-endian.
//!
//! ```text
//!  0       4       8       10      12      14  15
//! +-------+-------+-------+-------+-------+---+----------------+
//! | SYNC  | SYNC  | csum  |  len  |  id   | f | payload (len)  |
//! +-------+-------+-------+-------+-------+---+----------------+
//! ```
//!
//! The checksum covers the whole frame with the checksum field read as zero.

use crate::checksum::{checksum, checksum_excluding};
use crate::config::ProtocolConfig;
use crate::sequence::FrameId;
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use std::ops::BitOr;
use thiserror::Error;

/// Size of the doubled sync marker in bytes
pub const SYNC_SIZE: usize = 8;

/// Size of everything before the payload (sync + checksum + length + id + flags)
pub const HEADER_SIZE: usize = 15;

const OFF_CHECKSUM: usize = 8;
const OFF_LENGTH: usize = 10;
const OFF_ID: usize = 12;
const OFF_FLAGS: usize = 14;

/// Frame flag bitset
#[derive(Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct Flags(u8);

impl Flags {
    /// Acknowledgement of the frame with the same id
    pub const ACK: Flags = Flags(0x80);
    /// Last data frame of a transfer
    pub const FINAL: Flags = Flags(0x40);
    /// Forced connection termination
    pub const RESET: Flags = Flags(0x20);

    /// No flags set
    #[inline]
    pub const fn empty() -> Self {
        Flags(0)
    }

    /// Wrap the raw flags byte. Unknown bits are preserved.
    #[inline]
    pub const fn from_bits(bits: u8) -> Self {
        Flags(bits)
    }

    /// Raw flags byte
    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether every bit of `other` is set
    #[inline]
    pub fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(Flags::ACK) {
            names.push("ACK");
        }
        if self.contains(Flags::FINAL) {
            names.push("FINAL");
        }
        if self.contains(Flags::RESET) {
            names.push("RESET");
        }
        write!(f, "Flags({:#04x}", self.0)?;
        if !names.is_empty() {
            write!(f, " {}", names.join("|"))?;
        }
        write!(f, ")")
    }
}

/// What a frame means to the connection, in dispatch priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// RESET bit set; terminates the connection regardless of id
    Reset,
    /// ACK bit set
    Ack,
    /// Anything else carries application data
    Data,
}

/// A logical frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Alternating id (0/1), or [`FrameId::RESET`]
    pub id: FrameId,
    /// Flag bitset
    pub flags: Flags,
    /// Checksum as stored on the wire.
    ///
    /// Filled in by [`FrameCodec::decode`]; zero on locally built frames
    /// until they are encoded.
    pub checksum: u16,
    /// Application bytes
    pub payload: Bytes,
}

impl Frame {
    /// Build a data frame
    pub fn data(id: FrameId, payload: Bytes, is_final: bool) -> Self {
        let flags = if is_final {
            Flags::FINAL
        } else {
            Flags::empty()
        };
        Frame {
            id,
            flags,
            checksum: 0,
            payload,
        }
    }

    /// Build an empty acknowledgement for `id`
    pub fn ack(id: FrameId) -> Self {
        Frame {
            id,
            flags: Flags::ACK,
            checksum: 0,
            payload: Bytes::new(),
        }
    }

    /// Build a RESET frame
    pub fn reset() -> Self {
        Frame {
            id: FrameId::RESET,
            flags: Flags::RESET,
            checksum: 0,
            payload: Bytes::new(),
        }
    }

    /// Classify the frame for dispatch
    pub fn kind(&self) -> FrameKind {
        if self.flags.contains(Flags::RESET) {
            FrameKind::Reset
        } else if self.flags.contains(Flags::ACK) {
            FrameKind::Ack
        } else {
            FrameKind::Data
        }
    }

    /// Whether the FINAL flag is set
    pub fn is_final(&self) -> bool {
        self.flags.contains(Flags::FINAL)
    }
}

/// Frame parsing and validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Insufficient data: expected {expected} bytes, got {actual}")]
    InsufficientData { expected: usize, actual: usize },

    #[error("Frame does not start with the sync marker")]
    BadSync,

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Length mismatch: header declares {declared} payload bytes, frame has {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("Checksum mismatch: stored {stored:#06x}, computed {computed:#06x}")]
    ChecksumMismatch { stored: u16, computed: u16 },
}

/// Encoder/decoder bound to one connection's sync marker and payload ceiling
#[derive(Debug, Clone)]
pub struct FrameCodec {
    sync: [u8; SYNC_SIZE],
    max_payload_size: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        FrameCodec::new(&ProtocolConfig::default())
    }
}

impl FrameCodec {
    /// Create a codec from the connection's protocol configuration
    pub fn new(config: &ProtocolConfig) -> Self {
        FrameCodec {
            sync: config.sync_pattern(),
            max_payload_size: config.max_payload_size,
        }
    }

    /// The doubled sync marker
    pub fn sync_pattern(&self) -> &[u8; SYNC_SIZE] {
        &self.sync
    }

    /// Largest payload a frame may declare
    pub fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }

    /// Lay out a frame on the wire and stamp its checksum
    pub fn encode(&self, payload: &[u8], id: FrameId, flags: Flags) -> Result<Bytes, FrameError> {
        let too_large = FrameError::PayloadTooLarge {
            size: payload.len(),
            max: self.max_payload_size,
        };
        if payload.len() > self.max_payload_size {
            return Err(too_large);
        }
        // The length field is 16 bits wide whatever the configured ceiling.
        let length = u16::try_from(payload.len()).map_err(|_| too_large)?;

        let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
        buf.put_slice(&self.sync);
        // Checksum is zero while computing the checksum.
        buf.put_u16(0);
        buf.put_u16(length);
        buf.put_u16(id.as_raw());
        buf.put_u8(flags.bits());
        buf.put_slice(payload);

        let csum = checksum(&buf);
        buf[OFF_CHECKSUM..OFF_CHECKSUM + 2].copy_from_slice(&csum.to_be_bytes());

        Ok(buf.freeze())
    }

    /// Encode a logical frame. Any checksum already stored on `frame` is ignored.
    pub fn encode_frame(&self, frame: &Frame) -> Result<Bytes, FrameError> {
        self.encode(&frame.payload, frame.id, frame.flags)
    }

    /// Read the declared payload length out of a buffered header.
    ///
    /// Returns `None` until all [`HEADER_SIZE`] bytes are present.
    pub fn declared_length(&self, header: &[u8]) -> Option<usize> {
        if header.len() < HEADER_SIZE {
            return None;
        }
        Some(u16::from_be_bytes([header[OFF_LENGTH], header[OFF_LENGTH + 1]]) as usize)
    }

    /// Parse exactly one frame from `bytes`.
    ///
    /// `bytes` must start at the sync marker and end at the last payload
    /// byte; finding frame boundaries in a stream is the reassembler's job.
    pub fn decode(&self, bytes: &[u8]) -> Result<Frame, FrameError> {
        if bytes.len() < HEADER_SIZE {
            return Err(FrameError::InsufficientData {
                expected: HEADER_SIZE,
                actual: bytes.len(),
            });
        }

        if bytes[..SYNC_SIZE] != self.sync {
            return Err(FrameError::BadSync);
        }

        let stored = u16::from_be_bytes([bytes[OFF_CHECKSUM], bytes[OFF_CHECKSUM + 1]]);
        let length = u16::from_be_bytes([bytes[OFF_LENGTH], bytes[OFF_LENGTH + 1]]) as usize;
        let id = u16::from_be_bytes([bytes[OFF_ID], bytes[OFF_ID + 1]]);
        let flags = bytes[OFF_FLAGS];

        if length > self.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: length,
                max: self.max_payload_size,
            });
        }

        if bytes.len() != HEADER_SIZE + length {
            return Err(FrameError::LengthMismatch {
                declared: length,
                actual: bytes.len() - HEADER_SIZE,
            });
        }

        let computed = checksum_excluding(bytes, OFF_CHECKSUM);
        if computed != stored {
            return Err(FrameError::ChecksumMismatch { stored, computed });
        }

        Ok(Frame {
            id: FrameId::from_raw(id),
            flags: Flags::from_bits(flags),
            checksum: stored,
            payload: Bytes::copy_from_slice(&bytes[HEADER_SIZE..]),
        })
    }
}
