//! DCCNET Connection State Machine
//!
//! Combines the send-side ARQ state, the receive-side delivery state, and the
//! `Open -> Closing -> Closed` lifecycle into one I/O-free object. The
//! transport wraps it in a single lock; every method here assumes the caller
//! holds that lock.

use crate::arq::{ArqSender, TimeoutAction};
use crate::config::{ConfigError, ProtocolConfig};
use crate::delivery::{Delivery, DeliveryEngine};
use crate::frame::{Flags, Frame, FrameCodec, FrameError, FrameKind};
use crate::reassembler::ReassemblerStats;
use crate::sequence::FrameId;
use bytes::Bytes;
use thiserror::Error;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Exchanging frames
    Open,
    /// Shutdown started; the stream and timer are being torn down
    Closing,
    /// Terminal
    Closed,
}

/// Why a connection left the `Open` state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The application called `close`
    Local,
    /// The peer sent a RESET frame
    PeerReset,
    /// A frame went unacknowledged past the retry ceiling
    RetryExhausted,
    /// Reading from or writing to the underlying stream failed
    StreamFailure,
    /// The underlying stream reached end of file
    EndOfStream,
}

/// Connection errors
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Connection is not in the correct state")]
    InvalidState,

    #[error("Connection is closed")]
    Closed,

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Connection statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Data frames sent for the first time
    pub frames_sent: u64,
    /// Valid frames received (any kind)
    pub frames_received: u64,
    /// Data frames sent again after a timeout
    pub retransmissions: u64,
    /// Data frames confirmed by the peer
    pub frames_acked: u64,
    /// ACK frames sent
    pub acks_sent: u64,
    /// Duplicate data frames suppressed
    pub duplicates: u64,
    /// Data frames dropped as outside the alternation
    pub frames_discarded: u64,
    /// ACKs that matched nothing in flight
    pub stale_acks: u64,
    /// Sync matches rejected by the reassembler
    pub resyncs: u64,
    /// Payload bytes accepted from the application
    pub bytes_enqueued: u64,
    /// Payload bytes delivered to the application
    pub bytes_delivered: u64,
}

/// Effect of one inbound frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// New data appended to the delivered queue
    Delivered { id: FrameId, len: usize, is_final: bool },
    /// Retransmitted data frame, acknowledged again
    Duplicate { id: FrameId },
    /// Data frame outside the alternation, dropped
    Discarded { id: FrameId },
    /// The in-flight frame was acknowledged
    Acked { id: FrameId },
    /// ACK that matched nothing in flight
    StaleAck { id: FrameId },
    /// Peer reset the connection
    PeerReset,
    /// Frame arrived after the connection left `Open`
    Ignored,
}

/// Result of [`Connection::dispatch`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub event: Event,
    /// Bytes to write back to the peer (an ACK), if any
    pub reply: Option<Bytes>,
}

/// Result of [`Connection::on_timeout`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Timeout {
    /// Resend these bytes and re-arm the timer
    Retransmit { wire: Bytes, attempt: u32 },
    /// Send this RESET frame; the connection is now closing
    Reset { wire: Bytes },
    /// Nothing in flight
    Idle,
}

/// DCCNET Connection
///
/// Owns everything mutable about one transport connection.
pub struct Connection {
    config: ProtocolConfig,
    codec: FrameCodec,
    state: ConnectionState,
    close_reason: Option<CloseReason>,
    sender: ArqSender,
    receiver: DeliveryEngine,
    stats: ConnectionStats,
}

impl Connection {
    /// Create an open connection
    pub fn new(config: ProtocolConfig) -> Result<Self, ConnectionError> {
        config.validate()?;
        Ok(Connection {
            codec: FrameCodec::new(&config),
            state: ConnectionState::Open,
            close_reason: None,
            sender: ArqSender::new(config.max_retries),
            receiver: DeliveryEngine::new(),
            stats: ConnectionStats::default(),
            config,
        })
    }

    /// Protocol configuration in effect
    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Codec bound to this connection's sync marker and ceiling
    pub fn codec(&self) -> &FrameCodec {
        &self.codec
    }

    /// Get current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Why the connection stopped being open, if it has
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason
    }

    /// Check if frames may still be exchanged
    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// Check if connection is closed
    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    /// Split an application payload into frame-sized chunks.
    ///
    /// Only the last chunk carries FINAL. An empty payload yields one empty
    /// chunk so a bare FINAL can still be signalled.
    pub fn segment(&self, payload: Bytes, is_final: bool) -> Vec<(Bytes, Flags)> {
        let max = self.codec.max_payload_size();
        let mut chunks = Vec::with_capacity(payload.len() / max + 1);
        let mut rest = payload;

        loop {
            let chunk = rest.split_to(rest.len().min(max));
            let last = rest.is_empty();
            let flags = if last && is_final {
                Flags::FINAL
            } else {
                Flags::empty()
            };
            chunks.push((chunk, flags));
            if last {
                break;
            }
        }
        chunks
    }

    /// Count payload bytes handed over by the application
    pub fn record_enqueued(&mut self, len: usize) {
        self.stats.bytes_enqueued += len as u64;
    }

    /// Build the next data frame and mark it in flight
    pub fn start_send(&mut self, payload: &[u8], flags: Flags) -> Result<Bytes, ConnectionError> {
        if !self.is_open() {
            return Err(ConnectionError::Closed);
        }
        if self.sender.is_awaiting_ack() {
            return Err(ConnectionError::InvalidState);
        }

        let wire = self.sender.start(&self.codec, payload, flags)?;
        self.stats.frames_sent += 1;
        tracing::debug!(
            id = %self.sender.next_id(),
            len = payload.len(),
            flags = ?flags,
            "sending data frame"
        );
        Ok(wire)
    }

    /// Handle a retransmission timeout.
    ///
    /// On exhaustion the connection moves to `Closing` and the caller must put
    /// the returned RESET on the wire before tearing the stream down.
    pub fn on_timeout(&mut self) -> Result<Timeout, ConnectionError> {
        if !self.is_open() {
            return Ok(Timeout::Idle);
        }

        match self.sender.on_timeout() {
            TimeoutAction::Idle => Ok(Timeout::Idle),
            TimeoutAction::Retransmit { wire, attempt } => {
                self.stats.retransmissions += 1;
                tracing::warn!(attempt, max = self.config.max_retries, "ack timeout, retransmitting");
                Ok(Timeout::Retransmit { wire, attempt })
            }
            TimeoutAction::GiveUp { id, retries } => {
                tracing::warn!(%id, retries, "retries exhausted, resetting connection");
                self.sender.abandon();
                self.begin_close(CloseReason::RetryExhausted);
                let wire = self.codec.encode_frame(&Frame::reset())?;
                Ok(Timeout::Reset { wire })
            }
        }
    }

    /// Route a validated inbound frame to the ARQ or delivery logic
    pub fn dispatch(&mut self, frame: &Frame) -> Result<Dispatch, ConnectionError> {
        if !self.is_open() {
            return Ok(Dispatch {
                event: Event::Ignored,
                reply: None,
            });
        }
        self.stats.frames_received += 1;

        let event = match frame.kind() {
            FrameKind::Reset => {
                tracing::warn!("peer reset the connection");
                self.begin_close(CloseReason::PeerReset);
                Event::PeerReset
            }
            FrameKind::Ack => {
                if self.sender.on_ack(frame.id) {
                    self.stats.frames_acked += 1;
                    tracing::debug!(id = %frame.id, "frame acknowledged");
                    Event::Acked { id: frame.id }
                } else {
                    self.stats.stale_acks += 1;
                    tracing::debug!(id = %frame.id, "ignoring stale ack");
                    Event::StaleAck { id: frame.id }
                }
            }
            FrameKind::Data => match self.receiver.on_data(frame) {
                Delivery::Delivered { id, len, is_final } => {
                    self.stats.bytes_delivered += len as u64;
                    tracing::debug!(%id, len, is_final, "delivered data frame");
                    Event::Delivered { id, len, is_final }
                }
                Delivery::Duplicate { id } => {
                    self.stats.duplicates += 1;
                    tracing::debug!(%id, "duplicate data frame, re-acknowledging");
                    Event::Duplicate { id }
                }
                Delivery::Discarded { id } => {
                    self.stats.frames_discarded += 1;
                    tracing::debug!(
                        %id,
                        expected = %self.receiver.expected_id(),
                        "discarding data frame outside the alternation"
                    );
                    Event::Discarded { id }
                }
            },
        };

        let reply = match event {
            Event::Delivered { id, .. } | Event::Duplicate { id } => {
                self.stats.acks_sent += 1;
                Some(self.codec.encode_frame(&Frame::ack(id))?)
            }
            _ => None,
        };

        Ok(Dispatch { event, reply })
    }

    /// Drain delivered bytes, FIFO, non-blocking
    pub fn read(&mut self, max: Option<usize>) -> Bytes {
        self.receiver.read(max)
    }

    /// Delivered bytes not yet read
    pub fn available(&self) -> usize {
        self.receiver.available()
    }

    /// Whether a FINAL data frame has been delivered
    pub fn is_final_received(&self) -> bool {
        self.receiver.is_final_received()
    }

    /// `true` while a data frame waits for its ACK
    pub fn is_awaiting_ack(&self) -> bool {
        self.sender.is_awaiting_ack()
    }

    /// Id the next new outgoing frame will carry
    pub fn send_next_id(&self) -> FrameId {
        self.sender.next_id()
    }

    /// Id the next new inbound frame must carry
    pub fn expected_recv_id(&self) -> FrameId {
        self.receiver.expected_id()
    }

    /// Move `Open -> Closing`.
    ///
    /// Returns `false` if shutdown had already started, so callers can make
    /// teardown idempotent.
    pub fn begin_close(&mut self, reason: CloseReason) -> bool {
        if self.state != ConnectionState::Open {
            return false;
        }
        tracing::info!(?reason, "connection closing");
        self.state = ConnectionState::Closing;
        self.close_reason = Some(reason);
        self.sender.abandon();
        true
    }

    /// Move `Closing -> Closed` once the stream and timer are torn down
    pub fn finish_close(&mut self) {
        if self.state == ConnectionState::Closing {
            self.state = ConnectionState::Closed;
        }
    }

    /// Mirror the reassembler's counters into the connection statistics
    pub fn record_reassembly(&mut self, stats: ReassemblerStats) {
        self.stats.resyncs = stats.resyncs;
    }

    /// Get connection statistics
    pub fn stats(&self) -> ConnectionStats {
        self.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> Connection {
        Connection::new(ProtocolConfig::default()).unwrap()
    }

    fn decode(conn: &Connection, wire: &Bytes) -> Frame {
        conn.codec().decode(wire).unwrap()
    }

    #[test]
    fn test_connection_lifecycle() {
        let mut conn = open();
        assert_eq!(conn.state(), ConnectionState::Open);

        assert!(conn.begin_close(CloseReason::Local));
        assert_eq!(conn.state(), ConnectionState::Closing);
        assert!(!conn.begin_close(CloseReason::PeerReset));
        assert_eq!(conn.close_reason(), Some(CloseReason::Local));

        conn.finish_close();
        assert!(conn.is_closed());
        assert!(matches!(
            conn.start_send(b"late", Flags::empty()),
            Err(ConnectionError::Closed)
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ProtocolConfig::default().with_max_payload_size(0);
        assert!(matches!(
            Connection::new(config),
            Err(ConnectionError::Config(_))
        ));
    }

    #[test]
    fn test_data_frame_is_delivered_and_acked() {
        let mut sender = open();
        let mut receiver = open();

        let wire = sender.start_send(b"hello", Flags::FINAL).unwrap();
        let frame = decode(&receiver, &wire);
        let dispatch = receiver.dispatch(&frame).unwrap();

        assert_eq!(
            dispatch.event,
            Event::Delivered {
                id: FrameId::ZERO,
                len: 5,
                is_final: true
            }
        );
        let ack = decode(&sender, dispatch.reply.as_ref().unwrap());
        assert_eq!(ack.kind(), FrameKind::Ack);
        assert_eq!(ack.id, FrameId::ZERO);

        let acked = sender.dispatch(&ack).unwrap();
        assert_eq!(acked.event, Event::Acked { id: FrameId::ZERO });
        assert!(acked.reply.is_none());
        assert_eq!(sender.send_next_id(), FrameId::ONE);

        assert!(receiver.is_final_received());
        assert_eq!(&receiver.read(None)[..], b"hello");
    }

    #[test]
    fn test_duplicate_data_frame_reacked() {
        let mut sender = open();
        let mut receiver = open();

        let wire = sender.start_send(b"dup", Flags::empty()).unwrap();
        let frame = decode(&receiver, &wire);
        receiver.dispatch(&frame).unwrap();
        let again = receiver.dispatch(&frame).unwrap();

        assert_eq!(again.event, Event::Duplicate { id: FrameId::ZERO });
        assert!(again.reply.is_some());
        assert_eq!(&receiver.read(None)[..], b"dup");
        assert_eq!(receiver.stats().duplicates, 1);
        assert_eq!(receiver.stats().acks_sent, 2);
    }

    #[test]
    fn test_start_send_refuses_second_frame_in_flight() {
        let mut conn = open();
        conn.start_send(b"one", Flags::empty()).unwrap();
        assert!(matches!(
            conn.start_send(b"two", Flags::empty()),
            Err(ConnectionError::InvalidState)
        ));
    }

    #[test]
    fn test_stale_ack_ignored() {
        let mut conn = open();
        conn.start_send(b"one", Flags::empty()).unwrap();

        let dispatch = conn.dispatch(&Frame::ack(FrameId::ONE)).unwrap();
        assert_eq!(dispatch.event, Event::StaleAck { id: FrameId::ONE });
        assert!(conn.is_awaiting_ack());
        assert_eq!(conn.stats().stale_acks, 1);
    }

    #[test]
    fn test_peer_reset_closes() {
        let mut conn = open();
        let dispatch = conn.dispatch(&Frame::reset()).unwrap();
        assert_eq!(dispatch.event, Event::PeerReset);
        assert_eq!(conn.state(), ConnectionState::Closing);
        assert_eq!(conn.close_reason(), Some(CloseReason::PeerReset));

        // Frames after the reset are not processed.
        let late = conn.dispatch(&Frame::data(FrameId::ZERO, Bytes::new(), false)).unwrap();
        assert_eq!(late.event, Event::Ignored);
    }

    #[test]
    fn test_retry_exhaustion_emits_reset() {
        let config = ProtocolConfig::default().with_max_retries(3);
        let mut conn = Connection::new(config).unwrap();
        let wire = conn.start_send(b"lost", Flags::empty()).unwrap();

        for attempt in 1..=3 {
            assert_eq!(
                conn.on_timeout().unwrap(),
                Timeout::Retransmit {
                    wire: wire.clone(),
                    attempt
                }
            );
        }

        let reset = match conn.on_timeout().unwrap() {
            Timeout::Reset { wire } => wire,
            other => panic!("expected reset, got {:?}", other),
        };
        assert_eq!(decode(&conn, &reset).kind(), FrameKind::Reset);
        assert_eq!(conn.close_reason(), Some(CloseReason::RetryExhausted));
        assert!(!conn.is_awaiting_ack());
        assert_eq!(conn.stats().retransmissions, 3);
        assert_eq!(conn.on_timeout().unwrap(), Timeout::Idle);
    }

    #[test]
    fn test_segment_splits_large_payloads() {
        let config = ProtocolConfig::default().with_max_payload_size(4);
        let conn = Connection::new(config).unwrap();

        let chunks = conn.segment(Bytes::from_static(b"abcdefghij"), true);
        let parts: Vec<(&[u8], Flags)> = chunks.iter().map(|(b, f)| (&b[..], *f)).collect();
        assert_eq!(
            parts,
            vec![
                (&b"abcd"[..], Flags::empty()),
                (&b"efgh"[..], Flags::empty()),
                (&b"ij"[..], Flags::FINAL),
            ]
        );

        let exact = conn.segment(Bytes::from_static(b"abcd"), false);
        assert_eq!(exact.len(), 1);

        let empty = conn.segment(Bytes::new(), true);
        assert_eq!(empty, vec![(Bytes::new(), Flags::FINAL)]);
    }
}
