// Copyright 2020 Graydon Hoare <graydon@pobox.com>
// Licensed under the MIT and Apache-2.0 licenses.

use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Replication counters, shared between every manager on a node.
///
/// Purely observational: nothing in reconciliation reads them back.
#[derive(Debug, Default)]
pub struct ReplicationMetrics {
    responses_received: AtomicU64,
    unexpected_node_responses: AtomicU64,
    duplicate_responses: AtomicU64,
    response_time_micros: AtomicU64,
    synch_wait_timeouts: AtomicU64,
    split_brains: AtomicU64,
    conflicts_fixed: AtomicU64,
    fix_dispatch_failures: AtomicU64,
    quorum_failures: AtomicU64,
}

/// Point-in-time copy of [`ReplicationMetrics`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub responses_received: u64,
    pub unexpected_node_responses: u64,
    pub duplicate_responses: u64,
    pub response_time_micros: u64,
    pub synch_wait_timeouts: u64,
    pub split_brains: u64,
    pub conflicts_fixed: u64,
    pub fix_dispatch_failures: u64,
    pub quorum_failures: u64,
}

impl ReplicationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_response(&self, elapsed: Duration) {
        self.responses_received.fetch_add(1, Ordering::Relaxed);
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.response_time_micros.fetch_add(micros, Ordering::Relaxed);
    }

    pub(crate) fn record_unexpected_node(&self) {
        self.unexpected_node_responses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_duplicate(&self) {
        self.duplicate_responses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_synch_wait_timeout(&self) {
        self.synch_wait_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_split_brain(&self) {
        self.split_brains.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_conflicts_fixed(&self, fixed: usize) {
        self.conflicts_fixed.fetch_add(fixed as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_fix_dispatch_failure(&self) {
        self.fix_dispatch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_quorum_failure(&self) {
        self.quorum_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Mean latency of recorded responses, or zero before the first one.
    pub fn mean_response_time(&self) -> Duration {
        let n = self.responses_received.load(Ordering::Relaxed);
        if n == 0 {
            return Duration::from_micros(0);
        }
        Duration::from_micros(self.response_time_micros.load(Ordering::Relaxed) / n)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            responses_received: self.responses_received.load(Ordering::Relaxed),
            unexpected_node_responses: self.unexpected_node_responses.load(Ordering::Relaxed),
            duplicate_responses: self.duplicate_responses.load(Ordering::Relaxed),
            response_time_micros: self.response_time_micros.load(Ordering::Relaxed),
            synch_wait_timeouts: self.synch_wait_timeouts.load(Ordering::Relaxed),
            split_brains: self.split_brains.load(Ordering::Relaxed),
            conflicts_fixed: self.conflicts_fixed.load(Ordering::Relaxed),
            fix_dispatch_failures: self.fix_dispatch_failures.load(Ordering::Relaxed),
            quorum_failures: self.quorum_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_response_time_averages() {
        let m = ReplicationMetrics::new();
        assert_eq!(m.mean_response_time(), Duration::from_micros(0));
        m.record_response(Duration::from_millis(10));
        m.record_response(Duration::from_millis(30));
        assert_eq!(m.mean_response_time(), Duration::from_millis(20));
        assert_eq!(m.snapshot().responses_received, 2);
    }
}
