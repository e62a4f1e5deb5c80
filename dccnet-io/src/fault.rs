//! Fault-injecting stream wrapper for testing
//!
//! The underlying stream is reliable, so exercising retransmission and
//! resynchronisation needs an adversary. [`FaultyStream`] intercepts whole
//! `write` calls (the transport writes each frame with one call) and applies
//! a configurable fault model:
//!
//! | Fault      | Description                                        |
//! |------------|----------------------------------------------------|
//! | Loss       | Swallow the write with probability `drop_rate`.    |
//! | Corruption | Flip one random bit with probability `corrupt_rate`. |
//!
//! An optional predicate limits faults to matching writes (for example, only
//! ACK frames). The RNG is seeded so failures are reproducible.

use crate::stream::ByteStream;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Which writes a fault applies to
pub type FaultFilter = Arc<dyn Fn(&[u8]) -> bool + Send + Sync>;

/// Configuration for the fault-injection model.
///
/// Probabilities are in the range `[0.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct FaultConfig {
    /// Probability that a write is silently dropped
    pub drop_rate: f64,
    /// Probability that a write has one bit flipped
    pub corrupt_rate: f64,
    /// RNG seed
    pub seed: u64,
}

impl Default for FaultConfig {
    fn default() -> Self {
        // No faults by default; the wrapper is a transparent pass-through.
        FaultConfig {
            drop_rate: 0.0,
            corrupt_rate: 0.0,
            seed: 0,
        }
    }
}

/// Counters shared by every clone of a [`FaultyStream`]
#[derive(Debug, Default)]
pub struct FaultStats {
    pub dropped: AtomicU64,
    pub corrupted: AtomicU64,
    pub passed: AtomicU64,
}

/// A stream that loses or corrupts some of what is written to it
pub struct FaultyStream<S> {
    inner: S,
    config: FaultConfig,
    filter: Option<FaultFilter>,
    rng: Arc<Mutex<StdRng>>,
    stats: Arc<FaultStats>,
}

impl<S> fmt::Debug for FaultyStream<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FaultyStream")
            .field("config", &self.config)
            .field("filtered", &self.filter.is_some())
            .field("stats", &self.stats)
            .finish()
    }
}

impl<S: ByteStream> FaultyStream<S> {
    /// Wrap `inner`, applying faults to every write
    pub fn new(inner: S, config: FaultConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        FaultyStream {
            inner,
            config,
            filter: None,
            rng: Arc::new(Mutex::new(rng)),
            stats: Arc::new(FaultStats::default()),
        }
    }

    /// Only apply faults to writes for which `filter` returns `true`
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&[u8]) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Fault counters
    pub fn stats(&self) -> Arc<FaultStats> {
        self.stats.clone()
    }

    fn targeted(&self, buf: &[u8]) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(buf))
    }
}

impl<S: ByteStream> Read for FaultyStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<S: ByteStream> Write for FaultyStream<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() || !self.targeted(buf) {
            self.inner.write_all(buf)?;
            return Ok(buf.len());
        }

        let (drop, corrupt_bit) = {
            let mut rng = self.rng.lock();
            let drop = rng.gen_bool(self.config.drop_rate);
            let corrupt = !drop && rng.gen_bool(self.config.corrupt_rate);
            let bit = corrupt.then(|| rng.gen_range(0..buf.len() * 8));
            (drop, bit)
        };

        if drop {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(len = buf.len(), "fault: dropping write");
            return Ok(buf.len());
        }

        if let Some(bit) = corrupt_bit {
            self.stats.corrupted.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(len = buf.len(), bit, "fault: flipping bit");
            let mut damaged = buf.to_vec();
            damaged[bit / 8] ^= 1 << (bit % 8);
            self.inner.write_all(&damaged)?;
            return Ok(buf.len());
        }

        self.stats.passed.fetch_add(1, Ordering::Relaxed);
        self.inner.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<S: ByteStream> ByteStream for FaultyStream<S> {
    fn try_clone(&self) -> io::Result<Self> {
        Ok(FaultyStream {
            inner: self.inner.try_clone()?,
            config: self.config.clone(),
            filter: self.filter.clone(),
            rng: self.rng.clone(),
            stats: self.stats.clone(),
        })
    }

    fn shutdown(&self) -> io::Result<()> {
        self.inner.shutdown()
    }
}
