// Copyright 2020 Graydon Hoare <graydon@pobox.com>
// Licensed under the MIT and Apache-2.0 licenses.

use crate::{
    DistributedRequest, DistributedResponse, ExecutionMode, NodeName, ReplicatedTask,
    ReplicationMetrics, ResponseLedger, Transport,
};
use itertools::Itertools;
use tracing::{debug, error, warn};

/// How a round of conflict management ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConflictOutcome {
    /// Quorum is disabled, so disagreement is tolerated as-is.
    QuorumDisabled,
    /// Everyone who answered agrees.
    NoConflict,
    /// Two or more groups share the largest size. Nothing was repaired.
    SplitBrain { groups: Vec<Vec<NodeName>> },
    /// A quorum agreed; fixes went to every divergent node in `fixed` that
    /// had not already been sent one.
    Repaired {
        winner: NodeName,
        fixed: Vec<NodeName>,
        conflicts: usize,
    },
    /// The best group is smaller than the quorum. Nothing was repaired.
    QuorumNotReached { agreement: usize, conflicts: usize },
}

/// The decision half of conflict management, computed without side effects.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Assessment {
    /// Nothing to send.
    Settled(ConflictOutcome),
    /// Send a fix built from `winner` to each of `targets`.
    Repair {
        winner: DistributedResponse,
        targets: Vec<DistributedResponse>,
        conflicts: usize,
    },
}

/// Decides what, if anything, must be repaired given the ledger as it
/// stands. Nodes already sent a fix are not targeted again.
pub fn assess(ledger: &ResponseLedger) -> Assessment {
    let quorum = ledger.quorum();
    if quorum == 0 {
        return Assessment::Settled(ConflictOutcome::QuorumDisabled);
    }
    let groups = ledger.groups();
    if groups.len() <= 1 {
        return Assessment::Settled(ConflictOutcome::NoConflict);
    }

    let tied = ledger.tied_group_indices();
    let best = match tied.first() {
        Some(i) => &groups[*i],
        None => return Assessment::Settled(ConflictOutcome::NoConflict),
    };
    let agreement = best.len();
    let conflicts = ledger.received_count() - agreement;

    if tied.len() > 1 {
        let groups = tied.iter().map(|i| groups[*i].nodes()).collect();
        return Assessment::Settled(ConflictOutcome::SplitBrain { groups });
    }

    if agreement >= quorum {
        let targets = ledger
            .conflicting_responses()
            .into_iter()
            .filter(|r| !ledger.is_repaired(&r.executor_node))
            .collect();
        Assessment::Repair {
            winner: best.canonical().clone(),
            targets,
            conflicts,
        }
    } else {
        Assessment::Settled(ConflictOutcome::QuorumNotReached {
            agreement,
            conflicts,
        })
    }
}

/// Assesses `ledger` and carries out any repair: one fire-and-forget fix per
/// divergent node. Transport failures are logged and counted, not retried.
pub fn manage_conflicts<T: ReplicatedTask>(
    ledger: &ResponseLedger,
    request: &DistributedRequest<T>,
    transport: &dyn Transport<T::Fix>,
    metrics: &ReplicationMetrics,
) -> ConflictOutcome {
    let (winner, targets, conflicts) = match assess(ledger) {
        Assessment::Settled(outcome) => {
            report(&outcome, ledger, request);
            return outcome;
        }
        Assessment::Repair {
            winner,
            targets,
            conflicts,
        } => (winner, targets, conflicts),
    };

    if !targets.is_empty() {
        warn!(
            request = request.id(),
            quorum = ledger.quorum(),
            "detected {} conflicts, but the quorum has been reached; fixing {} remote nodes for request {}",
            conflicts,
            targets.len(),
            request
        );
    }

    let mut fixed = Vec::with_capacity(targets.len());
    for conflicting in targets {
        let node = conflicting.executor_node.clone();
        warn!(
            request = request.id(),
            node = %node,
            "fixing response {} to be: {}",
            conflicting.payload,
            winner.payload
        );
        let fix = request.fix_task(&conflicting, &winner);
        if let Err(e) = transport.send(request.database(), &node, fix, ExecutionMode::NoResponse) {
            warn!(request = request.id(), node = %node, error = %e, "could not dispatch fix");
            metrics.record_fix_dispatch_failure();
        }
        fixed.push(node);
    }
    metrics.record_conflicts_fixed(fixed.len());

    ConflictOutcome::Repaired {
        winner: winner.executor_node,
        fixed,
        conflicts,
    }
}

fn report<T: ReplicatedTask>(
    outcome: &ConflictOutcome,
    ledger: &ResponseLedger,
    request: &DistributedRequest<T>,
) {
    match outcome {
        ConflictOutcome::QuorumDisabled | ConflictOutcome::NoConflict => {
            debug!(request = request.id(), "no conflicts to manage");
        }
        ConflictOutcome::SplitBrain { groups } => {
            error!(
                request = request.id(),
                quorum = ledger.quorum(),
                "detected possible split brain: groups {} have different contents and no winner can be chosen for request {}",
                groups.iter().map(|g| format!("[{}]", g.join(", "))).join(" vs "),
                request
            );
        }
        ConflictOutcome::QuorumNotReached {
            agreement,
            conflicts,
        } => {
            error!(
                request = request.id(),
                quorum = ledger.quorum(),
                agreement = *agreement,
                "detected {} conflicts and quorum was not reached; cannot guarantee coherency of request {}",
                conflicts,
                request
            );
        }
        ConflictOutcome::Repaired { .. } => (),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ledger_with, RecordingTransport, TestTask};
    use crate::ResponseManagerConfig;

    fn cfg(quorum: usize) -> ResponseManagerConfig {
        ResponseManagerConfig {
            quorum,
            ..Default::default()
        }
    }

    #[test]
    fn quorum_zero_is_a_no_op() {
        let l = ledger_with(&cfg(0), &[("a", "x"), ("b", "y")], &["a", "b"]);
        assert_eq!(assess(&l), Assessment::Settled(ConflictOutcome::QuorumDisabled));
    }

    #[test]
    fn single_group_is_no_conflict() {
        let l = ledger_with(&cfg(2), &[("a", "x"), ("b", "x")], &["a", "b", "c"]);
        assert_eq!(assess(&l), Assessment::Settled(ConflictOutcome::NoConflict));
    }

    #[test]
    fn tie_at_the_top_is_split_brain() {
        let l = ledger_with(
            &cfg(2),
            &[("a", "x"), ("b", "y"), ("c", "x"), ("d", "y")],
            &["a", "b", "c", "d"],
        );
        match assess(&l) {
            Assessment::Settled(ConflictOutcome::SplitBrain { groups }) => {
                assert_eq!(
                    groups,
                    vec![
                        vec!["a".to_string(), "c".to_string()],
                        vec!["b".to_string(), "d".to_string()]
                    ]
                );
            }
            other => panic!("expected split brain, got {:?}", other),
        }
    }

    #[test]
    fn small_best_group_misses_quorum() {
        let l = ledger_with(
            &cfg(3),
            &[("a", "x"), ("b", "x"), ("c", "y")],
            &["a", "b", "c", "d"],
        );
        assert_eq!(
            assess(&l),
            Assessment::Settled(ConflictOutcome::QuorumNotReached {
                agreement: 2,
                conflicts: 1
            })
        );
    }

    #[test]
    fn repairs_each_divergent_node_once() {
        let mut l = ledger_with(
            &cfg(2),
            &[("a", "OK"), ("b", "OK"), ("c", "ERROR")],
            &["a", "b", "c"],
        );
        let request = DistributedRequest::new(1, "db", TestTask::default());
        let transport = RecordingTransport::default();
        let metrics = ReplicationMetrics::new();

        let outcome = manage_conflicts(&l, &request, &transport, &metrics);
        assert_eq!(
            outcome,
            ConflictOutcome::Repaired {
                winner: "a".to_string(),
                fixed: vec!["c".to_string()],
                conflicts: 1
            }
        );
        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].database, "db");
        assert_eq!(sent[0].node, "c");
        assert_eq!(sent[0].mode, ExecutionMode::NoResponse);
        assert_eq!(sent[0].fix.conflicting_node, "c");
        assert_eq!(sent[0].fix.winning_node, "a");
        assert_eq!(metrics.snapshot().conflicts_fixed, 1);

        l.mark_repaired(vec!["c".to_string()]);
        let again = manage_conflicts(&l, &request, &transport, &metrics);
        assert_eq!(
            again,
            ConflictOutcome::Repaired {
                winner: "a".to_string(),
                fixed: vec![],
                conflicts: 1
            }
        );
        assert_eq!(transport.sent().len(), 1);
    }

    #[test]
    fn failed_dispatch_is_counted_not_retried() {
        let l = ledger_with(
            &cfg(2),
            &[("a", "OK"), ("b", "OK"), ("c", "ERROR")],
            &["a", "b", "c"],
        );
        let request = DistributedRequest::new(1, "db", TestTask::default());
        let transport = RecordingTransport::failing();
        let metrics = ReplicationMetrics::new();

        let outcome = manage_conflicts(&l, &request, &transport, &metrics);
        assert!(matches!(outcome, ConflictOutcome::Repaired { .. }));
        assert_eq!(transport.sent().len(), 1);
        assert_eq!(metrics.snapshot().fix_dispatch_failures, 1);
    }
}
