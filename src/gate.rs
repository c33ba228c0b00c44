// Copyright 2020 Graydon Hoare <graydon@pobox.com>
// Licensed under the MIT and Apache-2.0 licenses.

use parking_lot::{Condvar, MutexGuard};
use std::time::{Duration, Instant};

/// Lets the issuing thread sleep until receiver threads have filled in
/// enough of the ledger.
///
/// The gate owns no state of its own: it waits on the guard of the mutex
/// that protects the ledger and re-checks the caller's predicate every time
/// it wakes, so a wakeup is never taken as proof of anything.
#[derive(Debug, Default)]
pub struct SynchronizationGate {
    arrived: Condvar,
}

impl SynchronizationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wakes any waiter. Call with the ledger lock held, right after the
    /// mutation that made the predicate true.
    pub fn open(&self) {
        self.arrived.notify_all();
    }

    /// Blocks until `ready` holds or `timeout` elapses, whichever is first.
    /// The guard is released while asleep and held again on return. Returns
    /// whether the wait timed out.
    pub fn wait<T, F>(&self, guard: &mut MutexGuard<'_, T>, timeout: Duration, mut ready: F) -> bool
    where
        F: FnMut(&T) -> bool,
    {
        self.arrived
            .wait_while_for(guard, |state| !ready(&*state), timeout)
            .timed_out()
    }
}

/// A fixed point on the monotonic clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn after(start: Instant, limit: Duration) -> Self {
        Deadline { at: start + limit }
    }

    pub fn at(&self) -> Instant {
        self.at
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }
}
