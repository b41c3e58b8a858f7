//! # Slot Waiting
//!
//! Blocking primitive used by the channel pool while every slot is taken.
//!
//! The waiter keeps an epoch that every slot release bumps. An acquirer
//! samples the epoch while it still holds the pool lock, drops the lock and
//! then waits for the epoch to move. A release that happens between the
//! sample and the wait is therefore never lost.

use core::time::Duration;

/// Outcome of a wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// The epoch moved
    Woken,
    /// The timeout elapsed first
    TimedOut,
}

/// Wakeup channel between slot releases and blocked acquirers
pub trait SlotWaiter: Send + Sync {
    /// Monotonic time since an arbitrary origin
    fn now(&self) -> Duration;

    /// Current epoch
    fn epoch(&self) -> u64;

    /// Bump the epoch and wake every waiter
    fn notify(&self);

    /// Block until the epoch differs from `seen` or `timeout` elapses
    ///
    /// `None` waits forever.
    fn wait(&self, seen: u64, timeout: Option<Duration>) -> WaitStatus;
}

// =============================================================================
// CONDVAR WAITER
// =============================================================================

#[cfg(feature = "std")]
pub use condvar::CondvarWaiter;

#[cfg(feature = "std")]
mod condvar {
    use std::sync::{Condvar, Mutex, PoisonError};
    use std::time::{Duration, Instant};

    use super::{SlotWaiter, WaitStatus};

    /// `SlotWaiter` backed by a std condition variable
    #[derive(Debug)]
    pub struct CondvarWaiter {
        origin: Instant,
        epoch: Mutex<u64>,
        cond: Condvar,
    }

    impl CondvarWaiter {
        /// Create a waiter at epoch 0
        pub fn new() -> Self {
            Self {
                origin: Instant::now(),
                epoch: Mutex::new(0),
                cond: Condvar::new(),
            }
        }
    }

    impl Default for CondvarWaiter {
        fn default() -> Self {
            Self::new()
        }
    }

    impl SlotWaiter for CondvarWaiter {
        fn now(&self) -> Duration {
            self.origin.elapsed()
        }

        fn epoch(&self) -> u64 {
            *self.epoch.lock().unwrap_or_else(PoisonError::into_inner)
        }

        fn notify(&self) {
            let mut epoch = self.epoch.lock().unwrap_or_else(PoisonError::into_inner);
            *epoch = epoch.wrapping_add(1);
            self.cond.notify_all();
        }

        fn wait(&self, seen: u64, timeout: Option<Duration>) -> WaitStatus {
            let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
            let mut epoch = self.epoch.lock().unwrap_or_else(PoisonError::into_inner);

            while *epoch == seen {
                match deadline {
                    None => {
                        epoch = self.cond.wait(epoch).unwrap_or_else(PoisonError::into_inner);
                    },
                    Some(deadline) => {
                        let now = Instant::now();
                        if now >= deadline {
                            return WaitStatus::TimedOut;
                        }
                        epoch = self
                            .cond
                            .wait_timeout(epoch, deadline - now)
                            .unwrap_or_else(PoisonError::into_inner)
                            .0;
                    },
                }
            }

            WaitStatus::Woken
        }
    }
}
