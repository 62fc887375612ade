//! Counting latch for pool startup/completion tracking and error signaling.
//!
//! A one-way primitive: the count only moves toward zero. Decrementing an
//! already-drained latch is a no-op, which tolerates duplicate failure
//! reports from the controller and a worker racing to account for the same
//! termination.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// A counting latch that can only be decremented and awaited to zero.
#[derive(Debug)]
pub struct CountDownLatch {
    count: Mutex<usize>,
    zeroed: Condvar,
}

impl CountDownLatch {
    /// Create a latch with the given initial count.
    ///
    /// A count of zero is legal: the latch is born drained and every
    /// `wait` returns immediately.
    #[must_use]
    pub fn new(count: usize) -> Self {
        Self {
            count: Mutex::new(count),
            zeroed: Condvar::new(),
        }
    }

    /// Current count.
    #[must_use]
    pub fn count(&self) -> usize {
        *self.count.lock()
    }

    /// Decrement the count, flooring at zero.
    ///
    /// Wakes all waiters when the count reaches zero.
    pub fn count_down(&self) {
        let mut count = self.count.lock();
        if *count == 0 {
            return;
        }
        *count -= 1;
        if *count == 0 {
            self.zeroed.notify_all();
        }
    }

    /// Block the calling thread until the count reaches zero.
    pub fn wait(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.zeroed.wait(&mut count);
        }
    }

    /// Block until the count reaches zero or the timeout elapses.
    ///
    /// Returns `true` if the latch drained, `false` on timeout.
    #[must_use]
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.count.lock();
        while *count > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let result = self.zeroed.wait_for(&mut count, deadline - now);
            if result.timed_out() && *count > 0 {
                return false;
            }
        }
        true
    }
}
