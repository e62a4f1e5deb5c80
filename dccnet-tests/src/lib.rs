//! Shared helpers for the DCCNET integration tests

use dccnet::io::ByteStream;
use dccnet::protocol::HEADER_SIZE;
use dccnet::{Flags, ProtocolConfig, Transport};
use std::io::{self, Read, Write};
use std::thread;
use std::time::{Duration, Instant};

/// Upper bound for any single wait in the tests
pub const WAIT: Duration = Duration::from_secs(10);

/// Default parameters with a short retransmission interval
pub fn fast_config() -> ProtocolConfig {
    ProtocolConfig::default().with_retransmit_interval(Duration::from_millis(30))
}

/// Collect delivered bytes until FINAL (or closure)
pub fn read_to_final<S: ByteStream>(transport: &Transport<S>) -> Vec<u8> {
    let deadline = Instant::now() + WAIT;
    let mut out = Vec::new();
    loop {
        transport.wait_readable(Duration::from_millis(100));
        out.extend_from_slice(&transport.read(None));
        if transport.is_final_received() || transport.is_closed() {
            out.extend_from_slice(&transport.read(None));
            return out;
        }
        assert!(Instant::now() < deadline, "timed out waiting for FINAL");
    }
}

/// Poll until the transport reports `Closed`
pub fn wait_closed<S: ByteStream>(transport: &Transport<S>) {
    let deadline = Instant::now() + WAIT;
    while !transport.is_closed() {
        assert!(Instant::now() < deadline, "timed out waiting for close");
        thread::sleep(Duration::from_millis(5));
    }
}

/// Write filter matching ACK frames
pub fn is_ack(buf: &[u8]) -> bool {
    buf.len() >= HEADER_SIZE && buf[14] & Flags::ACK.bits() != 0
}

/// Wrapper whose reads or writes fail with `ConnectionReset`
pub struct BrokenStream<S> {
    inner: S,
    fail_reads: bool,
    fail_writes: bool,
}

impl<S: ByteStream> BrokenStream<S> {
    /// Every read fails; writes pass through
    pub fn failing_reads(inner: S) -> Self {
        BrokenStream {
            inner,
            fail_reads: true,
            fail_writes: false,
        }
    }

    /// Every write fails; reads pass through
    pub fn failing_writes(inner: S) -> Self {
        BrokenStream {
            inner,
            fail_reads: false,
            fail_writes: true,
        }
    }
}

fn reset_error() -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionReset, "injected failure")
}

impl<S: ByteStream> Read for BrokenStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.fail_reads {
            return Err(reset_error());
        }
        self.inner.read(buf)
    }
}

impl<S: ByteStream> Write for BrokenStream<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.fail_writes {
            return Err(reset_error());
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<S: ByteStream> ByteStream for BrokenStream<S> {
    fn try_clone(&self) -> io::Result<Self> {
        Ok(BrokenStream {
            inner: self.inner.try_clone()?,
            fail_reads: self.fail_reads,
            fail_writes: self.fail_writes,
        })
    }

    fn shutdown(&self) -> io::Result<()> {
        self.inner.shutdown()
    }
}
