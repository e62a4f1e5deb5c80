//! Cancellable retransmission timer
//!
//! [`RetransmitTimer::new`] returns a handle and a [`TimerDriver`]. The driver
//! runs on a thread of the owner's choosing, sleeps until the armed deadline
//! and then invokes a callback. Every `arm` returns a fresh epoch and
//! the callback receives the epoch it fired for; the owner records the current
//! epoch under its own lock and ignores callbacks for any other epoch. That
//! makes cancellation synchronous from the owner's point of view: once
//! `cancel` (or a newer `arm`) has run under the owner's lock, a late callback
//! can no longer act.

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct Slot {
    deadline: Option<(Instant, u64)>,
    epoch: u64,
    shutdown: bool,
}

#[derive(Default)]
struct TimerShared {
    slot: Mutex<Slot>,
    wake: Condvar,
}

/// Handle used to arm, cancel, and stop the timer
pub struct RetransmitTimer {
    shared: Arc<TimerShared>,
}

/// The sleeping half of a [`RetransmitTimer`]; run it on its own thread
pub struct TimerDriver {
    shared: Arc<TimerShared>,
}

impl RetransmitTimer {
    /// Create a timer handle and the driver that must be run to make it fire
    pub fn new() -> (RetransmitTimer, TimerDriver) {
        let shared = Arc::new(TimerShared::default());
        (
            RetransmitTimer {
                shared: shared.clone(),
            },
            TimerDriver { shared },
        )
    }

    /// Fire once after `after`, replacing any pending deadline.
    ///
    /// Returns the epoch the callback will be invoked with.
    pub fn arm(&self, after: Duration) -> u64 {
        let mut slot = self.shared.slot.lock();
        slot.epoch += 1;
        let epoch = slot.epoch;
        slot.deadline = Some((Instant::now() + after, epoch));
        drop(slot);
        self.shared.wake.notify_one();
        epoch
    }

    /// Drop the pending deadline, if any
    pub fn cancel(&self) {
        let mut slot = self.shared.slot.lock();
        slot.epoch += 1;
        slot.deadline = None;
        drop(slot);
        self.shared.wake.notify_one();
    }

    /// Whether a deadline is pending
    pub fn is_armed(&self) -> bool {
        self.shared.slot.lock().deadline.is_some()
    }

    /// Make the driver return. Pending deadlines are dropped.
    pub fn shutdown(&self) {
        let mut slot = self.shared.slot.lock();
        slot.shutdown = true;
        slot.deadline = None;
        drop(slot);
        self.shared.wake.notify_one();
    }
}

impl TimerDriver {
    /// Sleep until each armed deadline and call `on_fire(epoch)`, until
    /// [`RetransmitTimer::shutdown`]. The callback runs without any timer lock
    /// held, so it may arm or cancel the timer itself.
    pub fn run<F: FnMut(u64)>(self, mut on_fire: F) {
        let shared = self.shared;
        let mut slot = shared.slot.lock();
        loop {
            if slot.shutdown {
                break;
            }
            match slot.deadline {
                None => shared.wake.wait(&mut slot),
                Some((deadline, epoch)) => {
                    if Instant::now() >= deadline {
                        slot.deadline = None;
                        MutexGuard::unlocked(&mut slot, || on_fire(epoch));
                    } else {
                        let _ = shared.wake.wait_until(&mut slot, deadline);
                    }
                }
            }
        }
        tracing::trace!("timer driver exiting");
    }
}
