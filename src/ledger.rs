// Copyright 2020 Graydon Hoare <graydon@pobox.com>
// Licensed under the MIT and Apache-2.0 licenses.

use crate::{
    quorum, DistributedResponse, NodeName, ReconcileError, ResponseEntry, ResponseGroup,
    ResponseManagerConfig, Result,
};
use im::{OrdMap, OrdSet, Vector};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::trace;

// A request moves through these phases in order, though it may skip some:
// a request whose every node answers goes straight from Waiting to
// AllReceived, and one whose caller gives up goes to TimedOut. Once in
// TimedOut, late responses are still recorded but no longer move the phase.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Phase {
    Waiting,       // Collecting responses; nothing decided.
    QuorumReached, // Synchronous responses are in and quorum holds.
    AllReceived,   // Every expected node answered.
    TimedOut,      // Caller forced resolution with nodes still pending.
    Resolved,      // A final response was selected.
    Failed,        // Resolution raised an error.
}

/// What recording one response did to the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Recorded {
    /// Every expected node has now answered.
    pub completed: bool,
    /// The issuing thread may stop waiting.
    pub synchronous_ready: bool,
}

/// All per-request reconciliation state.
///
/// The ledger itself does no locking; the manager keeps it behind a single
/// mutex so the entry map, the groups and the counters always change
/// together. Collections are persistent (`im`) so cloning a ledger for a
/// snapshot is O(1) and shares structure with the live one.
#[derive(Clone, Debug)]
pub struct ResponseLedger {
    request_id: u64,

    // Key set is fixed at construction.
    entries: OrdMap<NodeName, ResponseEntry>,
    // Creation order is the tie-break order.
    groups: Vector<ResponseGroup>,
    received: usize,
    local_received: bool,
    latencies: OrdMap<NodeName, Duration>,
    repaired: OrdSet<NodeName>,
    phase: Phase,

    expected_synchronous_responses: usize,
    quorum: usize,
    wait_for_local_node: bool,
}

impl ResponseLedger {
    pub fn new<I>(request_id: u64, expected_nodes: I, config: &ResponseManagerConfig) -> Self
    where
        I: IntoIterator<Item = NodeName>,
    {
        let entries = expected_nodes
            .into_iter()
            .map(|node| (node, ResponseEntry::Pending))
            .collect();
        ResponseLedger {
            request_id,
            entries,
            groups: Vector::new(),
            received: 0,
            local_received: false,
            latencies: OrdMap::new(),
            repaired: OrdSet::new(),
            phase: Phase::Waiting,
            expected_synchronous_responses: config.expected_synchronous_responses,
            quorum: config.quorum,
            wait_for_local_node: config.wait_for_local_node,
        }
    }

    /// Records `response`, taking `elapsed` as its latency since broadcast.
    ///
    /// Fails, leaving the ledger untouched, if the executor isn't an
    /// expected node or has already answered.
    pub fn record(&mut self, response: DistributedResponse, elapsed: Duration) -> Result<Recorded> {
        let node = response.executor_node.clone();
        match self.entries.get(&node) {
            None => {
                return Err(ReconcileError::UnexpectedNode {
                    request_id: self.request_id,
                    node,
                })
            }
            Some(ResponseEntry::Received(_)) => {
                return Err(ReconcileError::DuplicateResponse {
                    request_id: self.request_id,
                    node,
                })
            }
            Some(ResponseEntry::Pending) => (),
        }

        self.received += 1;
        if response.executed_on_local_node {
            self.local_received = true;
        }
        self.latencies.insert(node.clone(), elapsed);
        self.insert_into_group(response.clone());
        self.entries.insert(node, ResponseEntry::Received(response));

        let completed = self.is_completed();
        let synchronous_ready =
            self.synchronous_responses_arrived() && (completed || self.is_minimum_quorum_reached());
        if let Phase::Waiting | Phase::QuorumReached = self.phase {
            if completed {
                self.phase = Phase::AllReceived;
            } else if synchronous_ready {
                self.phase = Phase::QuorumReached;
            }
        }
        trace!(
            request = self.request_id,
            received = self.received,
            groups = self.groups.len(),
            local_received = self.local_received,
            "recorded response"
        );
        Ok(Recorded {
            completed,
            synchronous_ready,
        })
    }

    // First group, in creation order, whose canonical payload matches;
    // otherwise a new group at the end.
    fn insert_into_group(&mut self, response: DistributedResponse) {
        for group in self.groups.iter_mut() {
            if group.accepts(&response.payload) {
                group.push(response);
                return;
            }
        }
        self.groups.push_back(ResponseGroup::new(response));
    }

    /// Enough responses are in (and the local one, if we wait for it) that
    /// the issuing thread's wait is satisfied.
    pub fn synchronous_responses_arrived(&self) -> bool {
        self.received >= self.expected_synchronous_responses
            && (!self.wait_for_local_node || self.local_received)
    }

    /// The condition the gate opens on: synchronous responses have arrived
    /// and either everyone answered or a quorum agrees.
    pub fn synchronous_ready(&self) -> bool {
        self.synchronous_responses_arrived()
            && (self.is_completed() || self.is_minimum_quorum_reached())
    }

    pub(crate) fn mark_timed_out(&mut self) {
        if let Phase::Waiting | Phase::QuorumReached = self.phase {
            self.phase = Phase::TimedOut;
        }
    }

    pub(crate) fn mark_resolved(&mut self, succeeded: bool) {
        self.phase = if succeeded {
            Phase::Resolved
        } else {
            Phase::Failed
        };
    }

    pub(crate) fn mark_repaired<I: IntoIterator<Item = NodeName>>(&mut self, nodes: I) {
        for node in nodes {
            self.repaired.insert(node);
        }
    }

    // Quorum rules, applied to this ledger's groups.

    pub fn is_minimum_quorum_reached(&self) -> bool {
        quorum::is_minimum_quorum_reached(&self.groups, self.quorum)
    }

    pub fn best_group_index(&self) -> Option<usize> {
        quorum::best_group_index(&self.groups)
    }

    pub fn best_group(&self) -> Option<&ResponseGroup> {
        self.best_group_index().map(|i| &self.groups[i])
    }

    pub fn tied_group_indices(&self) -> Vec<usize> {
        quorum::tied_group_indices(&self.groups)
    }

    pub fn conflicting_responses(&self) -> Vec<DistributedResponse> {
        quorum::conflicting_responses(&self.groups)
    }

    // Read-only projections.

    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn quorum(&self) -> usize {
        self.quorum
    }

    pub fn expected_synchronous_responses(&self) -> usize {
        self.expected_synchronous_responses
    }

    pub fn is_wait_for_local_node(&self) -> bool {
        self.wait_for_local_node
    }

    pub fn is_local_received(&self) -> bool {
        self.local_received
    }

    pub fn groups(&self) -> &Vector<ResponseGroup> {
        &self.groups
    }

    pub fn entry(&self, node: &str) -> Option<&ResponseEntry> {
        self.entries.get(node)
    }

    pub fn expected_count(&self) -> usize {
        self.entries.len()
    }

    pub fn received_count(&self) -> usize {
        self.received
    }

    pub fn missing_count(&self) -> usize {
        self.expected_count() - self.received
    }

    pub fn is_completed(&self) -> bool {
        self.received == self.expected_count()
    }

    pub fn expected_nodes(&self) -> Vec<NodeName> {
        self.entries.keys().cloned().collect()
    }

    pub fn responding_nodes(&self) -> Vec<NodeName> {
        self.entries
            .iter()
            .filter(|(_, e)| !e.is_pending())
            .map(|(n, _)| n.clone())
            .collect()
    }

    pub fn missing_nodes(&self) -> Vec<NodeName> {
        self.entries
            .iter()
            .filter(|(_, e)| e.is_pending())
            .map(|(n, _)| n.clone())
            .collect()
    }

    /// Received responses in node-name order.
    pub fn received_responses(&self) -> Vec<DistributedResponse> {
        self.entries
            .values()
            .filter_map(|e| e.response().cloned())
            .collect()
    }

    pub fn latency(&self, node: &str) -> Option<Duration> {
        self.latencies.get(node).copied()
    }

    pub fn is_repaired(&self, node: &str) -> bool {
        self.repaired.contains(node)
    }

    pub fn repaired_nodes(&self) -> Vec<NodeName> {
        self.repaired.iter().cloned().collect()
    }
}
