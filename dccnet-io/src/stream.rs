//! Underlying stream abstraction
//!
//! DCCNET runs over an already-established, ordered byte stream. The
//! transport needs one handle for its receive loop, one for writing, and a way
//! to tear the connection down from any thread so a blocked read returns.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};

/// A bidirectional byte stream that can be cloned into independent handles
pub trait ByteStream: Read + Write + Send + Sized + 'static {
    /// Create another handle to the same underlying connection
    fn try_clone(&self) -> io::Result<Self>;

    /// Close both directions. Blocked reads on any handle must return.
    fn shutdown(&self) -> io::Result<()>;
}

impl ByteStream for TcpStream {
    fn try_clone(&self) -> io::Result<Self> {
        TcpStream::try_clone(self)
    }

    fn shutdown(&self) -> io::Result<()> {
        match TcpStream::shutdown(self, Shutdown::Both) {
            // The peer may have torn the connection down first.
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}
