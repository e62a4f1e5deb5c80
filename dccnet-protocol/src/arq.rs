//! Stop-and-wait send state
//!
//! [`ArqSender`] tracks the next id to use and the single frame in flight. It
//! does not touch the stream or the clock; the transport calls these methods
//! under its lock and owns the actual timer.
//!
//! - At most one frame is in flight at any moment.
//! - A new frame may only be started once the slot is empty.
//! - On a matching ACK: toggle `next_id` and clear the slot.
//! - On timeout: resend the identical wire bytes, or give up once the
//!   retry ceiling is reached.

use crate::frame::{Flags, FrameCodec, FrameError};
use crate::sequence::FrameId;
use bytes::Bytes;

/// A frame that has been sent but not yet acknowledged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InFlight {
    /// Id the ACK must carry
    pub id: FrameId,
    /// Exact bytes put on the wire
    pub wire: Bytes,
    /// Resends so far (0 right after the first send)
    pub retries: u32,
}

/// What to do when the retransmission timer fires
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeoutAction {
    /// Put these bytes on the wire again and re-arm the timer
    Retransmit { wire: Bytes, attempt: u32 },
    /// The retry ceiling was reached; reset the connection
    GiveUp { id: FrameId, retries: u32 },
    /// Nothing in flight (the ACK won the race)
    Idle,
}

/// Stop-and-wait send-side state for one connection
#[derive(Debug)]
pub struct ArqSender {
    next_id: FrameId,
    in_flight: Option<InFlight>,
    max_retries: u32,
}

impl ArqSender {
    /// Create an idle sender starting at id 0
    pub fn new(max_retries: u32) -> Self {
        ArqSender {
            next_id: FrameId::ZERO,
            in_flight: None,
            max_retries,
        }
    }

    /// Build the next data frame and place it in the in-flight slot.
    ///
    /// Returns the wire bytes to send. The caller must not start a new frame
    /// while one is in flight.
    pub fn start(
        &mut self,
        codec: &FrameCodec,
        payload: &[u8],
        flags: Flags,
    ) -> Result<Bytes, FrameError> {
        debug_assert!(
            self.in_flight.is_none(),
            "start called while a frame is already in flight"
        );

        let id = self.next_id;
        let wire = codec.encode(payload, id, flags)?;
        self.in_flight = Some(InFlight {
            id,
            wire: wire.clone(),
            retries: 0,
        });
        Ok(wire)
    }

    /// Process an inbound ACK.
    ///
    /// Returns `true` if it acknowledges the in-flight frame. ACKs for any
    /// other id are stale or duplicated and leave the state untouched.
    pub fn on_ack(&mut self, id: FrameId) -> bool {
        match self.in_flight {
            Some(ref entry) if entry.id == id => {
                self.in_flight = None;
                self.next_id.toggle();
                true
            }
            _ => false,
        }
    }

    /// Handle a retransmission timeout
    pub fn on_timeout(&mut self) -> TimeoutAction {
        let max_retries = self.max_retries;
        let entry = match self.in_flight.as_mut() {
            Some(entry) => entry,
            None => return TimeoutAction::Idle,
        };

        if entry.retries >= max_retries {
            return TimeoutAction::GiveUp {
                id: entry.id,
                retries: entry.retries,
            };
        }

        entry.retries += 1;
        TimeoutAction::Retransmit {
            wire: entry.wire.clone(),
            attempt: entry.retries,
        }
    }

    /// Drop the in-flight frame without acknowledging it (connection abort)
    pub fn abandon(&mut self) -> Option<InFlight> {
        self.in_flight.take()
    }

    /// Id the next new frame will carry
    pub fn next_id(&self) -> FrameId {
        self.next_id
    }

    /// The frame awaiting acknowledgement, if any
    pub fn in_flight(&self) -> Option<&InFlight> {
        self.in_flight.as_ref()
    }

    /// `true` when a frame is waiting for an ACK
    pub fn is_awaiting_ack(&self) -> bool {
        self.in_flight.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> FrameCodec {
        FrameCodec::default()
    }

    #[test]
    fn test_start_uses_next_id() {
        let mut arq = ArqSender::new(16);
        let wire = arq.start(&codec(), b"one", Flags::empty()).unwrap();
        let frame = codec().decode(&wire).unwrap();

        assert_eq!(frame.id, FrameId::ZERO);
        assert!(arq.is_awaiting_ack());
        assert_eq!(arq.in_flight().unwrap().wire, wire);
    }

    #[test]
    fn test_matching_ack_toggles_id() {
        let mut arq = ArqSender::new(16);
        arq.start(&codec(), b"one", Flags::empty()).unwrap();

        assert!(arq.on_ack(FrameId::ZERO));
        assert!(!arq.is_awaiting_ack());
        assert_eq!(arq.next_id(), FrameId::ONE);

        let wire = arq.start(&codec(), b"two", Flags::FINAL).unwrap();
        assert_eq!(codec().decode(&wire).unwrap().id, FrameId::ONE);
    }

    #[test]
    fn test_stale_ack_is_ignored() {
        let mut arq = ArqSender::new(16);
        arq.start(&codec(), b"one", Flags::empty()).unwrap();

        assert!(!arq.on_ack(FrameId::ONE));
        assert!(!arq.on_ack(FrameId::RESET));
        assert!(arq.is_awaiting_ack());
        assert_eq!(arq.next_id(), FrameId::ZERO);

        assert!(arq.on_ack(FrameId::ZERO));
        // A duplicate of the same ACK arriving later must not toggle again.
        assert!(!arq.on_ack(FrameId::ZERO));
        assert_eq!(arq.next_id(), FrameId::ONE);
    }

    #[test]
    fn test_timeout_resends_identical_bytes() {
        let mut arq = ArqSender::new(16);
        let wire = arq.start(&codec(), b"again", Flags::empty()).unwrap();

        match arq.on_timeout() {
            TimeoutAction::Retransmit { wire: resent, attempt } => {
                assert_eq!(resent, wire);
                assert_eq!(attempt, 1);
            }
            other => panic!("expected retransmit, got {:?}", other),
        }
    }

    #[test]
    fn test_gives_up_after_max_retries() {
        let mut arq = ArqSender::new(16);
        arq.start(&codec(), b"lost", Flags::empty()).unwrap();

        for attempt in 1..=16 {
            assert!(matches!(
                arq.on_timeout(),
                TimeoutAction::Retransmit { attempt: a, .. } if a == attempt
            ));
        }
        assert_eq!(
            arq.on_timeout(),
            TimeoutAction::GiveUp {
                id: FrameId::ZERO,
                retries: 16
            }
        );
    }

    #[test]
    fn test_timeout_when_idle() {
        let mut arq = ArqSender::new(16);
        assert_eq!(arq.on_timeout(), TimeoutAction::Idle);
    }

    #[test]
    fn test_abandon_clears_slot() {
        let mut arq = ArqSender::new(16);
        arq.start(&codec(), b"x", Flags::empty()).unwrap();
        assert!(arq.abandon().is_some());
        assert!(!arq.is_awaiting_ack());
        assert_eq!(arq.next_id(), FrameId::ZERO);
    }
}
