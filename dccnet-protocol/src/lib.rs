//! DCCNET Protocol Core Implementation
//!
//! This crate implements the I/O-free core of DCCNET, a stop-and-wait ARQ
//! transport layered over a byte stream: the Internet checksum, frame
//! encoding and decoding, the resynchronising stream reassembler, the
//! alternating-bit send and delivery state, and the connection state machine.

pub mod arq;
pub mod checksum;
pub mod config;
pub mod connection;
pub mod delivery;
pub mod frame;
pub mod reassembler;
pub mod sequence;

pub use arq::{ArqSender, InFlight, TimeoutAction};
pub use checksum::checksum;
pub use config::{ConfigError, ProtocolConfig};
pub use connection::{
    CloseReason, Connection, ConnectionError, ConnectionState, ConnectionStats, Dispatch, Event,
    Timeout,
};
pub use delivery::{Delivery, DeliveryEngine};
pub use frame::{Flags, Frame, FrameCodec, FrameError, FrameKind, HEADER_SIZE, SYNC_SIZE};
pub use reassembler::{ReassemblerStats, StreamReassembler};
pub use sequence::FrameId;
