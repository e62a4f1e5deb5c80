//! In-memory duplex pipe
//!
//! Two connected [`PipeStream`] ends behave like a loopback TCP connection:
//! bytes written on one end are read, in order, on the other; reads block
//! until data arrives; shutting down either end makes both ends see end of
//! file once buffered bytes are drained, and later writes fail with
//! `BrokenPipe`.

use crate::stream::ByteStream;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::Arc;

#[derive(Default)]
struct ChannelState {
    data: VecDeque<u8>,
    closed: bool,
}

/// One direction of the pipe
#[derive(Default)]
struct Channel {
    state: Mutex<ChannelState>,
    readable: Condvar,
}

impl Channel {
    fn close(&self) {
        self.state.lock().closed = true;
        self.readable.notify_all();
    }
}

/// One end of an in-memory duplex pipe
#[derive(Clone)]
pub struct PipeStream {
    incoming: Arc<Channel>,
    outgoing: Arc<Channel>,
}

/// Create a connected pair of pipe ends
pub fn duplex() -> (PipeStream, PipeStream) {
    let a_to_b = Arc::new(Channel::default());
    let b_to_a = Arc::new(Channel::default());

    let a = PipeStream {
        incoming: b_to_a.clone(),
        outgoing: a_to_b.clone(),
    };
    let b = PipeStream {
        incoming: a_to_b,
        outgoing: b_to_a,
    };
    (a, b)
}

impl PipeStream {
    /// Bytes written by the peer and not yet read on this end
    pub fn pending(&self) -> usize {
        self.incoming.state.lock().data.len()
    }

    /// Whether the pipe has been shut down
    pub fn is_closed(&self) -> bool {
        self.outgoing.state.lock().closed
    }
}

impl Read for PipeStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut state = self.incoming.state.lock();
        while state.data.is_empty() && !state.closed {
            self.incoming.readable.wait(&mut state);
        }

        let n = buf.len().min(state.data.len());
        for (dst, src) in buf.iter_mut().zip(state.data.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }
}

impl Write for PipeStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.outgoing.state.lock();
        if state.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"));
        }
        state.data.extend(buf);
        drop(state);
        self.outgoing.readable.notify_all();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ByteStream for PipeStream {
    fn try_clone(&self) -> io::Result<Self> {
        Ok(self.clone())
    }

    fn shutdown(&self) -> io::Result<()> {
        self.incoming.close();
        self.outgoing.close();
        Ok(())
    }
}
