//! DCCNET I/O and Platform Abstraction
//!
//! This crate provides the plumbing under the transport: the byte-stream
//! abstraction, TCP socket setup, an in-memory duplex pipe and a
//! fault-injecting wrapper for tests, and the retransmission timer.

pub mod fault;
pub mod pipe;
pub mod socket;
pub mod stream;
pub mod time;

pub use fault::{FaultConfig, FaultStats, FaultyStream};
pub use pipe::{duplex, PipeStream};
pub use socket::{accept_one, connect, connect_host, listen, SocketError};
pub use stream::ByteStream;
pub use time::{RetransmitTimer, TimerDriver};
