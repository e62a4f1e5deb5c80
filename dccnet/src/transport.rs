//! Threaded DCCNET transport
//!
//! A [`Transport`] owns one byte stream and three threads:
//!
//! - the receive loop reads the stream, reassembles frames and dispatches them;
//! - the send loop takes queued payloads one at a time and waits for each ACK;
//! - the timer driver fires retransmissions.
//!
//! All protocol state lives in a single [`Connection`] behind one mutex. The
//! stream writer sits behind the same mutex so frames are never interleaved on
//! the wire. The retransmission timer is cancelled by clearing the recorded
//! epoch under that mutex, so a timer callback that lost the race with an ACK
//! does nothing.

use bytes::Bytes;
use crossbeam::channel::{self, Receiver, Sender};
use dccnet_io::{ByteStream, RetransmitTimer, TimerDriver};
use dccnet_protocol::{
    CloseReason, Connection, ConnectionError, ConnectionState, ConnectionStats, Event, Frame,
    ProtocolConfig, StreamReassembler, Timeout,
};
use parking_lot::{Condvar, Mutex};
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Bytes requested from the stream per read
const READ_CHUNK: usize = 4096;

/// Transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Transport is closed")]
    Closed,

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

enum SendJob {
    Frame { payload: Bytes, flags: dccnet_protocol::Flags },
    Stop,
}

struct Inner<S> {
    conn: Connection,
    writer: S,
    /// Epoch of the armed retransmission timer, `None` when disarmed
    timer_epoch: Option<u64>,
    /// Jobs handed to the send loop and not yet started
    queued: usize,
}

struct Shared<S> {
    inner: Mutex<Inner<S>>,
    /// Signalled on ACK and on close; the send loop and `wait_idle` wait here
    progress: Condvar,
    /// Signalled on delivery and on close; `wait_readable` waits here
    readable: Condvar,
    timer: RetransmitTimer,
    jobs: Sender<SendJob>,
    retransmit_interval: Duration,
}

impl<S: ByteStream> Shared<S> {
    /// Write a whole frame. On failure the connection is torn down.
    fn write_locked(&self, inner: &mut Inner<S>, wire: &[u8]) -> bool {
        let result = inner
            .writer
            .write_all(wire)
            .and_then(|_| inner.writer.flush());
        match result {
            Ok(()) => true,
            Err(e) => {
                if inner.conn.is_open() {
                    tracing::error!(error = %e, "stream write failed");
                }
                self.close_locked(inner, CloseReason::StreamFailure);
                false
            }
        }
    }

    fn arm_locked(&self, inner: &mut Inner<S>) {
        inner.timer_epoch = Some(self.timer.arm(self.retransmit_interval));
    }

    fn disarm_locked(&self, inner: &mut Inner<S>) {
        inner.timer_epoch = None;
        self.timer.cancel();
    }

    /// Start shutdown for `reason` (no-op if already started) and tear down
    fn close_locked(&self, inner: &mut Inner<S>, reason: CloseReason) {
        inner.conn.begin_close(reason);
        self.teardown_locked(inner);
    }

    /// Release the stream, timer and loops of a `Closing` connection
    fn teardown_locked(&self, inner: &mut Inner<S>) {
        if inner.conn.state() != ConnectionState::Closing {
            return;
        }

        self.disarm_locked(inner);
        self.timer.shutdown();
        if let Err(e) = inner.writer.shutdown() {
            tracing::debug!(error = %e, "stream shutdown failed");
        }
        // The channel is unbounded, so this never blocks; a dropped receiver
        // means the send loop is already gone.
        let _ = self.jobs.send(SendJob::Stop);
        inner.queued = 0;
        inner.conn.finish_close();

        self.progress.notify_all();
        self.readable.notify_all();
        tracing::info!(reason = ?inner.conn.close_reason(), "connection closed");
    }

    fn handle_frame(&self, inner: &mut Inner<S>, frame: &Frame) {
        let dispatch = match inner.conn.dispatch(frame) {
            Ok(dispatch) => dispatch,
            Err(e) => {
                tracing::warn!(error = %e, "failed to handle frame");
                return;
            }
        };

        if let Some(reply) = dispatch.reply {
            if !self.write_locked(inner, &reply) {
                return;
            }
        }

        match dispatch.event {
            Event::Acked { .. } => {
                self.disarm_locked(inner);
                self.progress.notify_all();
            }
            Event::Delivered { .. } => {
                self.readable.notify_all();
            }
            Event::PeerReset => self.teardown_locked(inner),
            _ => {}
        }
    }

    fn on_timer(&self, epoch: u64) {
        let mut inner = self.inner.lock();
        if inner.timer_epoch != Some(epoch) {
            tracing::trace!(epoch, "ignoring stale timer");
            return;
        }
        inner.timer_epoch = None;

        match inner.conn.on_timeout() {
            Ok(Timeout::Retransmit { wire, .. }) => {
                if self.write_locked(&mut inner, &wire) {
                    self.arm_locked(&mut inner);
                }
            }
            Ok(Timeout::Reset { wire }) => {
                if let Err(e) = inner.writer.write_all(&wire) {
                    tracing::debug!(error = %e, "failed to send reset");
                }
                self.teardown_locked(&mut inner);
            }
            Ok(Timeout::Idle) => {}
            Err(e) => {
                tracing::error!(error = %e, "failed to build reset frame");
                self.close_locked(&mut inner, CloseReason::StreamFailure);
            }
        }
    }
}

fn receive_loop<S: ByteStream>(shared: Arc<Shared<S>>, mut reader: S) {
    let codec = shared.inner.lock().conn.codec().clone();
    let mut reassembler = StreamReassembler::new(codec);
    let mut buf = vec![0u8; READ_CHUNK];

    let reason = loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break CloseReason::EndOfStream,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                if shared.inner.lock().conn.is_open() {
                    tracing::error!(error = %e, "stream read failed");
                }
                break CloseReason::StreamFailure;
            }
        };

        let frames = reassembler.push(&buf[..n]);
        let mut inner = shared.inner.lock();
        inner.conn.record_reassembly(reassembler.stats());
        for frame in &frames {
            if !inner.conn.is_open() {
                break;
            }
            shared.handle_frame(&mut inner, frame);
        }
        if !inner.conn.is_open() {
            shared.teardown_locked(&mut inner);
            tracing::debug!("receive loop exiting");
            return;
        }
    };

    let mut inner = shared.inner.lock();
    if inner.conn.is_open() {
        tracing::info!(?reason, "stream ended");
    }
    shared.close_locked(&mut inner, reason);
    tracing::debug!("receive loop exiting");
}

fn send_loop<S: ByteStream>(shared: Arc<Shared<S>>, jobs: Receiver<SendJob>) {
    while let Ok(job) = jobs.recv() {
        let (payload, flags) = match job {
            SendJob::Frame { payload, flags } => (payload, flags),
            SendJob::Stop => break,
        };

        let mut inner = shared.inner.lock();
        inner.queued = inner.queued.saturating_sub(1);
        if !inner.conn.is_open() {
            break;
        }

        let wire = match inner.conn.start_send(&payload, flags) {
            Ok(wire) => wire,
            Err(e) => {
                tracing::error!(error = %e, "dropping payload");
                shared.progress.notify_all();
                continue;
            }
        };
        if !shared.write_locked(&mut inner, &wire) {
            break;
        }
        shared.arm_locked(&mut inner);

        while inner.conn.is_awaiting_ack() && inner.conn.is_open() {
            shared.progress.wait(&mut inner);
        }
        if !inner.conn.is_open() {
            break;
        }
    }
    tracing::debug!("send loop exiting");
}

fn spawn<F>(name: &str, f: F) -> io::Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new().name(name.to_string()).spawn(f)
}

/// DCCNET transport over a byte stream
///
/// Every method takes `&self`; share it between threads behind an `Arc`.
pub struct Transport<S: ByteStream> {
    shared: Arc<Shared<S>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl<S: ByteStream> Transport<S> {
    /// Start a transport with the default protocol parameters
    pub fn new(stream: S) -> Result<Self, TransportError> {
        Self::with_config(stream, ProtocolConfig::default())
    }

    /// Start a transport, spawning its receive, send, and timer threads
    pub fn with_config(stream: S, config: ProtocolConfig) -> Result<Self, TransportError> {
        let retransmit_interval = config.retransmit_interval;
        let conn = Connection::new(config)?;
        let reader = stream.try_clone()?;
        let (jobs_tx, jobs_rx) = channel::unbounded();
        let (timer, driver) = RetransmitTimer::new();

        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                conn,
                writer: stream,
                timer_epoch: None,
                queued: 0,
            }),
            progress: Condvar::new(),
            readable: Condvar::new(),
            timer,
            jobs: jobs_tx,
            retransmit_interval,
        });

        let transport = Transport {
            shared: shared.clone(),
            threads: Mutex::new(Vec::with_capacity(3)),
        };
        // On a spawn failure, dropping `transport` closes whatever started.
        transport.start_threads(reader, jobs_rx, driver)?;

        tracing::debug!("transport started");
        Ok(transport)
    }

    fn start_threads(
        &self,
        reader: S,
        jobs: Receiver<SendJob>,
        driver: TimerDriver,
    ) -> io::Result<()> {
        let mut threads = self.threads.lock();

        let shared = self.shared.clone();
        threads.push(spawn("dccnet-timer", move || {
            driver.run(|epoch| shared.on_timer(epoch))
        })?);

        let shared = self.shared.clone();
        threads.push(spawn("dccnet-recv", move || receive_loop(shared, reader))?);

        let shared = self.shared.clone();
        threads.push(spawn("dccnet-send", move || send_loop(shared, jobs))?);

        Ok(())
    }

    /// Queue `payload` for reliable delivery.
    ///
    /// Payloads larger than the frame ceiling are split; only the last piece
    /// carries FINAL. Returns immediately. Fails once the transport is closed.
    pub fn enqueue(&self, payload: impl Into<Bytes>, is_final: bool) -> Result<(), TransportError> {
        let payload = payload.into();
        let mut inner = self.shared.inner.lock();
        if !inner.conn.is_open() {
            return Err(TransportError::Closed);
        }

        let len = payload.len();
        let chunks = inner.conn.segment(payload, is_final);
        inner.conn.record_enqueued(len);
        inner.queued += chunks.len();
        for (payload, flags) in chunks {
            self.shared
                .jobs
                .send(SendJob::Frame { payload, flags })
                .map_err(|_| TransportError::Closed)?;
        }
        Ok(())
    }

    /// Take up to `max` delivered bytes (all of them when `None`).
    ///
    /// Never blocks. Bytes delivered before a close can still be read after it.
    pub fn read(&self, max: Option<usize>) -> Bytes {
        self.shared.inner.lock().conn.read(max)
    }

    /// Whether the peer's FINAL frame has been delivered
    pub fn is_final_received(&self) -> bool {
        self.shared.inner.lock().conn.is_final_received()
    }

    /// Block until there are bytes to read, FINAL was received, or the
    /// transport closed. Returns `false` on timeout.
    pub fn wait_readable(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.shared.inner.lock();
        loop {
            if inner.conn.available() > 0
                || inner.conn.is_final_received()
                || !inner.conn.is_open()
            {
                return true;
            }
            if self
                .shared
                .readable
                .wait_until(&mut inner, deadline)
                .timed_out()
            {
                return false;
            }
        }
    }

    /// Block until every queued payload has been acknowledged, or the
    /// transport closed. Returns `false` on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.shared.inner.lock();
        loop {
            if (inner.queued == 0 && !inner.conn.is_awaiting_ack()) || !inner.conn.is_open() {
                return true;
            }
            if self
                .shared
                .progress
                .wait_until(&mut inner, deadline)
                .timed_out()
            {
                return false;
            }
        }
    }

    /// Close the transport and wait for its threads to stop.
    ///
    /// Idempotent. Frames still queued or in flight are abandoned.
    pub fn close(&self) {
        {
            let mut inner = self.shared.inner.lock();
            self.shared.close_locked(&mut inner, CloseReason::Local);
        }

        let threads = std::mem::take(&mut *self.threads.lock());
        for handle in threads {
            if handle.join().is_err() {
                tracing::error!("transport thread panicked");
            }
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        self.shared.inner.lock().conn.state()
    }

    /// Check if the transport is closed
    pub fn is_closed(&self) -> bool {
        self.shared.inner.lock().conn.is_closed()
    }

    /// Why the transport closed, if it has
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.shared.inner.lock().conn.close_reason()
    }

    /// Snapshot of the connection counters
    pub fn stats(&self) -> ConnectionStats {
        self.shared.inner.lock().conn.stats()
    }
}

impl<S: ByteStream> Drop for Transport<S> {
    fn drop(&mut self) {
        self.close();
    }
}
