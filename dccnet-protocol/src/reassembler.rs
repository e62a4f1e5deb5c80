//! Stream reassembler
//!
//! Turns the raw byte stream from the underlying connection back into frames.
//! The scanner looks for the doubled sync marker, waits until the header and
//! the declared payload are buffered, and hands the candidate to the codec.
//!
//! A marker that leads to an oversized length or a failed checksum is treated
//! as a false match: only the 8 marker bytes are skipped, never the (possibly
//! corrupt) declared length, and the scan restarts. This lets the parser
//! recover from a sync pattern occurring inside payload data and from bit
//! errors.

use crate::frame::{Frame, FrameCodec, FrameError, HEADER_SIZE, SYNC_SIZE};
use bytes::{Buf, BytesMut};

/// Counters kept by the reassembler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReassemblerStats {
    /// Frames successfully decoded
    pub frames: u64,
    /// Sync matches rejected (oversized length or bad checksum)
    pub resyncs: u64,
    /// Bytes thrown away while resynchronising or skipping leading noise
    pub discarded_bytes: u64,
}

/// Result of one scan step
enum Scan {
    Frame(Frame),
    NeedMore,
    Resync,
}

/// Accumulates stream bytes and yields validated frames
pub struct StreamReassembler {
    codec: FrameCodec,
    buffer: BytesMut,
    stats: ReassemblerStats,
}

impl StreamReassembler {
    /// Create a reassembler using `codec` for sync marker, ceiling, and decoding
    pub fn new(codec: FrameCodec) -> Self {
        let capacity = 2 * (HEADER_SIZE + codec.max_payload_size());
        StreamReassembler {
            codec,
            buffer: BytesMut::with_capacity(capacity),
            stats: ReassemblerStats::default(),
        }
    }

    /// Append bytes read from the stream and drain every complete frame
    pub fn push(&mut self, data: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame() {
            frames.push(frame);
        }
        frames
    }

    /// Try to extract one frame from what is already buffered
    pub fn next_frame(&mut self) -> Option<Frame> {
        loop {
            match self.scan() {
                Scan::Frame(frame) => return Some(frame),
                Scan::NeedMore => return None,
                Scan::Resync => continue,
            }
        }
    }

    fn scan(&mut self) -> Scan {
        let pos = match find(&self.buffer, self.codec.sync_pattern()) {
            Some(pos) => pos,
            // The marker may still be completed by the next read.
            None => return Scan::NeedMore,
        };

        let length = match self.codec.declared_length(&self.buffer[pos..]) {
            Some(length) => length,
            None => return Scan::NeedMore,
        };

        if length > self.codec.max_payload_size() {
            tracing::debug!(
                offset = pos,
                length,
                max = self.codec.max_payload_size(),
                "declared length too large, resynchronising"
            );
            self.skip_marker(pos);
            return Scan::Resync;
        }

        let end = pos + HEADER_SIZE + length;
        if self.buffer.len() < end {
            return Scan::NeedMore;
        }

        match self.codec.decode(&self.buffer[pos..end]) {
            Ok(frame) => {
                self.stats.discarded_bytes += pos as u64;
                self.buffer.advance(end);
                self.stats.frames += 1;
                Scan::Frame(frame)
            }
            Err(FrameError::ChecksumMismatch { stored, computed }) => {
                tracing::debug!(
                    offset = pos,
                    stored,
                    computed,
                    "checksum mismatch, resynchronising"
                );
                self.skip_marker(pos);
                Scan::Resync
            }
            Err(e) => {
                // Sync and length were already checked, so this is unexpected;
                // recover the same way.
                tracing::debug!(offset = pos, error = %e, "undecodable frame, resynchronising");
                self.skip_marker(pos);
                Scan::Resync
            }
        }
    }

    fn skip_marker(&mut self, pos: usize) {
        let skip = pos + SYNC_SIZE;
        self.buffer.advance(skip);
        self.stats.resyncs += 1;
        self.stats.discarded_bytes += skip as u64;
    }

    /// Bytes buffered but not yet consumed
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Reassembly counters
    pub fn stats(&self) -> ReassemblerStats {
        self.stats
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
