//! DCCNET - stop-and-wait reliable transport
//!
//! High-level Rust API for DCCNET: a [`Transport`] drives the protocol core
//! over any [`ByteStream`](io::ByteStream) with one receive thread, one send
//! thread, and a retransmission timer.

pub use dccnet_io as io;
pub use dccnet_protocol as protocol;

pub mod transport;

pub use transport::{Transport, TransportError};

// Re-export commonly used types
pub use protocol::{
    CloseReason, ConnectionState, ConnectionStats, Flags, Frame, FrameCodec, FrameId,
    ProtocolConfig,
};
