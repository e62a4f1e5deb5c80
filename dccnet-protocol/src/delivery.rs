//! Receive-side delivery and duplicate suppression
//!
//! Each logical data frame reaches the application exactly once. A frame is
//! new when its id equals the expected id; a frame carrying the previous id
//! and the checksum of the last delivered frame is a retransmission caused by
//! a lost ACK and is acknowledged again without re-delivering the payload.

use crate::frame::Frame;
use crate::sequence::FrameId;
use bytes::{Bytes, BytesMut};

/// What happened to an inbound data frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// New frame; payload appended. ACK `id`.
    Delivered { id: FrameId, len: usize, is_final: bool },
    /// Retransmission of the last delivered frame. ACK `id` again.
    Duplicate { id: FrameId },
    /// Outside the alternation; dropped without an ACK
    Discarded { id: FrameId },
}

impl Delivery {
    /// Id to acknowledge, if any
    pub fn ack_id(&self) -> Option<FrameId> {
        match *self {
            Delivery::Delivered { id, .. } | Delivery::Duplicate { id } => Some(id),
            Delivery::Discarded { .. } => None,
        }
    }
}

/// Receive-side state for one connection
#[derive(Debug)]
pub struct DeliveryEngine {
    expected_id: FrameId,
    last_delivered: Option<(FrameId, u16)>,
    delivered: BytesMut,
    final_received: bool,
}

impl Default for DeliveryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DeliveryEngine {
    /// Create an engine expecting id 0
    pub fn new() -> Self {
        DeliveryEngine {
            expected_id: FrameId::ZERO,
            last_delivered: None,
            delivered: BytesMut::new(),
            final_received: false,
        }
    }

    /// Process a validated data frame (neither ACK nor RESET)
    pub fn on_data(&mut self, frame: &Frame) -> Delivery {
        if frame.id == self.expected_id {
            self.delivered.extend_from_slice(&frame.payload);
            self.expected_id.toggle();
            self.last_delivered = Some((frame.id, frame.checksum));
            if frame.is_final() {
                self.final_received = true;
            }
            return Delivery::Delivered {
                id: frame.id,
                len: frame.payload.len(),
                is_final: frame.is_final(),
            };
        }

        if self.last_delivered == Some((frame.id, frame.checksum)) {
            return Delivery::Duplicate { id: frame.id };
        }

        Delivery::Discarded { id: frame.id }
    }

    /// Drain up to `max` delivered bytes (all of them when `None`), FIFO.
    ///
    /// Never blocks; the result may be empty.
    pub fn read(&mut self, max: Option<usize>) -> Bytes {
        let n = match max {
            Some(max) => max.min(self.delivered.len()),
            None => self.delivered.len(),
        };
        self.delivered.split_to(n).freeze()
    }

    /// Delivered bytes not yet read
    pub fn available(&self) -> usize {
        self.delivered.len()
    }

    /// Whether a FINAL data frame has been delivered
    pub fn is_final_received(&self) -> bool {
        self.final_received
    }

    /// Id the next new frame must carry
    pub fn expected_id(&self) -> FrameId {
        self.expected_id
    }
}
