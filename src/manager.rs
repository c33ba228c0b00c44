// Copyright 2020 Graydon Hoare <graydon@pobox.com>
// Licensed under the MIT and Apache-2.0 licenses.

use crate::{
    conflict, select, ConflictOutcome, Deadline, DistributedRequest, DistributedResponse,
    NodeName, Phase, ReconcileError, ReplicatedTask, ReplicationMetrics, ResponseLedger,
    ResponseManagerConfig, Result, ResultStrategy, SynchronizationGate, Transport,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// `ResponseManager` collects the replies to one distributed request and
/// turns them into a single answer.
///
/// It is created when the request is broadcast, shared (usually behind an
/// `Arc`) with whatever threads receive replies from the network, and
/// dropped once the issuing thread has its answer. Receiver threads only
/// ever call `add_response`. The issuing thread calls, in order:
///
///   1. `wait_for_synchronous_responses`, to block until enough replies are
///      in or the wait bound passes;
///   2. `timeout`, if it gives up before every node answered;
///   3. `get_response`, to pick the winner or learn why there is none.
///
/// Divergent nodes are repaired as a side effect of 2 and 3 when a quorum
/// agrees. Replies arriving after the issuing thread has moved on are still
/// recorded, they just aren't waited for.
pub struct ResponseManager<T: ReplicatedTask> {
    request: DistributedRequest<T>,
    config: ResponseManagerConfig,
    sent_on: Instant,
    ledger: Mutex<ResponseLedger>,
    gate: SynchronizationGate,
    transport: Arc<dyn Transport<T::Fix>>,
    metrics: Arc<ReplicationMetrics>,
}

impl<T: ReplicatedTask> ResponseManager<T> {
    pub fn new<I, N>(
        request: DistributedRequest<T>,
        expected_nodes: I,
        config: ResponseManagerConfig,
        transport: Arc<dyn Transport<T::Fix>>,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = N>,
        N: Into<NodeName>,
    {
        let ledger = ResponseLedger::new(
            request.id(),
            expected_nodes.into_iter().map(Into::into),
            &config,
        );
        config.validate(ledger.expected_count())?;
        debug!(
            request = request.id(),
            expected = ledger.expected_count(),
            quorum = config.quorum,
            "awaiting responses for {}",
            request
        );
        Ok(ResponseManager {
            request,
            config,
            sent_on: Instant::now(),
            ledger: Mutex::new(ledger),
            gate: SynchronizationGate::new(),
            transport,
            metrics: Arc::new(ReplicationMetrics::new()),
        })
    }

    /// Shares `metrics` with other managers instead of keeping private
    /// counters.
    pub fn with_metrics(mut self, metrics: Arc<ReplicationMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Records one node's reply. Returns true once every expected node has
    /// answered. Replies from unexpected nodes, or repeat replies, are
    /// logged, counted and otherwise ignored.
    pub fn add_response(&self, response: DistributedResponse) -> bool {
        let elapsed = self.sent_on.elapsed();
        let sender = response.sender_node.clone();
        let mut ledger = self.ledger.lock();
        match ledger.record(response, elapsed) {
            Ok(recorded) => {
                self.metrics.record_response(elapsed);
                if recorded.synchronous_ready {
                    trace!(request = self.request.id(), "synchronous responses arrived");
                    self.gate.open();
                }
                recorded.completed
            }
            Err(ReconcileError::UnexpectedNode { node, .. }) => {
                warn!(
                    request = self.request.id(),
                    node = %node,
                    sender = %sender,
                    "received response for {} from unexpected node; expected are [{}]",
                    self.request,
                    ledger.expected_nodes().join(", ")
                );
                self.metrics.record_unexpected_node();
                false
            }
            Err(e) => {
                warn!(request = self.request.id(), sender = %sender, "discarding response: {}", e);
                if let ReconcileError::DuplicateResponse { .. } = e {
                    self.metrics.record_duplicate();
                }
                ledger.is_completed()
            }
        }
    }

    /// Blocks until the synchronous responses have arrived (and a quorum
    /// agrees, or everyone answered), or until the wait bound passes.
    ///
    /// The bound is the smaller of the synchronous timeout and whatever is
    /// left of the total timeout since broadcast; there is no internal retry.
    /// Returns whether the synchronous responses had arrived on return.
    pub fn wait_for_synchronous_responses(&self) -> bool {
        let begin = Instant::now();
        let bound = self.config.synch_timeout().min(self.deadline().remaining());
        let mut ledger = self.ledger.lock();
        let timed_out = self
            .gate
            .wait(&mut ledger, bound, ResponseLedger::synchronous_ready);
        let arrived = ledger.synchronous_responses_arrived();
        drop(ledger);

        if !arrived {
            self.metrics.record_synch_wait_timeout();
        }
        debug!(
            request = self.request.id(),
            arrived,
            timed_out,
            waited_ms = begin.elapsed().as_millis() as u64,
            "finished waiting for synchronous responses"
        );
        arrived
    }

    /// Forces resolution against whatever has arrived so far, repairing
    /// divergent nodes if a quorum agrees.
    pub fn timeout(&self) -> ConflictOutcome {
        self.ledger.lock().mark_timed_out();
        debug!(request = self.request.id(), "timed out, managing conflicts with what arrived");
        self.manage_conflicts()
    }

    /// Runs conflict management on a snapshot of the ledger, so fix tasks
    /// are dispatched without holding the lock, then records which nodes
    /// were sent a fix.
    pub fn manage_conflicts(&self) -> ConflictOutcome {
        self.manage_conflicts_on(&self.snapshot())
    }

    // Replies recorded while fixes go out are not in `snapshot`; they are
    // picked up by the next pass.
    fn manage_conflicts_on(&self, snapshot: &ResponseLedger) -> ConflictOutcome {
        let outcome = conflict::manage_conflicts(
            snapshot,
            &self.request,
            self.transport.as_ref(),
            &self.metrics,
        );
        if let ConflictOutcome::Repaired { fixed, .. } = &outcome {
            self.ledger.lock().mark_repaired(fixed.iter().cloned());
        }
        outcome
    }

    /// Produces the final response under `strategy`.
    ///
    /// The decision is made on one snapshot taken on entry; replies arriving
    /// after that are recorded but left to a later pass.
    ///
    /// Fails with `NoResponse` if nobody answered, `QuorumNotReached` if no
    /// group is big enough, and `SplitBrain` if the largest groups tie. The
    /// last two undo the request first.
    pub fn get_response(&self, strategy: ResultStrategy) -> Result<DistributedResponse> {
        // Conflicts and selection must judge the same responses.
        let snapshot = self.snapshot();
        let outcome = self.manage_conflicts_on(&snapshot);
        let result = select::select(&snapshot, &outcome, strategy);

        match &result {
            Ok(r) => debug!(
                request = self.request.id(),
                executor = %r.executor_node,
                "resolved {:?} response",
                strategy
            ),
            Err(ReconcileError::QuorumNotReached { .. }) => {
                self.metrics.record_quorum_failure();
                self.request.undo();
            }
            Err(ReconcileError::SplitBrain { .. }) => {
                self.metrics.record_split_brain();
                self.request.undo();
            }
            Err(_) => (),
        }
        self.ledger.lock().mark_resolved(result.is_ok());
        result
    }

    /// Every received payload merged into one set, on a copy of the winning
    /// group's first response. `None` before the first response.
    pub fn merged_response(&self) -> Option<DistributedResponse> {
        select::merged(&self.ledger.lock())
    }

    /// A consistent point-in-time copy of the ledger. Cheap: the copy shares
    /// structure with the live ledger.
    pub fn snapshot(&self) -> ResponseLedger {
        self.ledger.lock().clone()
    }

    pub fn request(&self) -> &DistributedRequest<T> {
        &self.request
    }

    pub fn request_id(&self) -> u64 {
        self.request.id()
    }

    pub fn database(&self) -> &str {
        self.request.database()
    }

    pub fn sent_on(&self) -> Instant {
        self.sent_on
    }

    pub fn config(&self) -> &ResponseManagerConfig {
        &self.config
    }

    pub fn total_timeout(&self) -> Duration {
        self.config.total_timeout()
    }

    /// When the total timeout, measured from broadcast, runs out.
    pub fn deadline(&self) -> Deadline {
        Deadline::after(self.sent_on, self.config.total_timeout())
    }

    pub fn metrics(&self) -> &Arc<ReplicationMetrics> {
        &self.metrics
    }

    pub fn phase(&self) -> Phase {
        self.ledger.lock().phase()
    }

    pub fn quorum(&self) -> usize {
        self.config.quorum
    }

    pub fn expected_synchronous_responses(&self) -> usize {
        self.config.expected_synchronous_responses
    }

    pub fn is_wait_for_local_node(&self) -> bool {
        self.config.wait_for_local_node
    }

    pub fn is_local_received(&self) -> bool {
        self.ledger.lock().is_local_received()
    }

    pub fn is_minimum_quorum_reached(&self) -> bool {
        self.ledger.lock().is_minimum_quorum_reached()
    }

    pub fn expected_count(&self) -> usize {
        self.ledger.lock().expected_count()
    }

    pub fn received_count(&self) -> usize {
        self.ledger.lock().received_count()
    }

    pub fn missing_count(&self) -> usize {
        self.ledger.lock().missing_count()
    }

    pub fn expected_nodes(&self) -> Vec<NodeName> {
        self.ledger.lock().expected_nodes()
    }

    pub fn responding_nodes(&self) -> Vec<NodeName> {
        self.ledger.lock().responding_nodes()
    }

    pub fn missing_nodes(&self) -> Vec<NodeName> {
        self.ledger.lock().missing_nodes()
    }

    pub fn received_responses(&self) -> Vec<DistributedResponse> {
        self.ledger.lock().received_responses()
    }
}
