// Copyright 2020 Graydon Hoare <graydon@pobox.com>
// Licensed under the MIT and Apache-2.0 licenses.

use crate::{
    Conflict, ConflictOutcome, DistributedResponse, Payload, ReconcileError, ResponseLedger,
    Result,
};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// How the final answer is built from the winning group.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStrategy {
    /// Any member of the winning group; in practice its first.
    Any,
    /// Reserved for per-payload merging; behaves like `Any` for now.
    Merge,
    /// Every responding node's payload, keyed by node.
    Union,
}

impl Default for ResultStrategy {
    fn default() -> Self {
        ResultStrategy::Any
    }
}

/// Picks the final response from `ledger`, or explains why there is none.
///
/// `outcome` is the result of the conflict management pass that ran just
/// before; a split brain there fails the request even when the tied groups
/// are each big enough for quorum, since neither can be preferred.
pub fn select(
    ledger: &ResponseLedger,
    outcome: &ConflictOutcome,
    strategy: ResultStrategy,
) -> Result<DistributedResponse> {
    let best = match ledger.best_group() {
        Some(best) if ledger.received_count() > 0 => best,
        _ => {
            return Err(ReconcileError::NoResponse {
                request_id: ledger.request_id(),
                expected: ledger.expected_nodes(),
            })
        }
    };

    if !ledger.is_minimum_quorum_reached() {
        let conflicts = ledger
            .conflicting_responses()
            .into_iter()
            .map(|r| Conflict {
                node: r.executor_node,
                payload: r.payload,
            })
            .collect();
        return Err(ReconcileError::QuorumNotReached {
            request_id: ledger.request_id(),
            quorum: ledger.quorum(),
            agreement: best.len(),
            conflicts,
            missing: ledger.missing_nodes(),
        });
    }

    if let ConflictOutcome::SplitBrain { groups } = outcome {
        return Err(ReconcileError::SplitBrain {
            request_id: ledger.request_id(),
            quorum: ledger.quorum(),
            groups: groups.clone(),
        });
    }

    match strategy {
        ResultStrategy::Any | ResultStrategy::Merge => Ok(best.canonical().clone()),
        ResultStrategy::Union => {
            let received = ledger.received_responses();
            let mut union = best.canonical().clone();
            union.executor_node = received.iter().map(|r| &r.executor_node).join(",");
            union.payload = Payload::Map(
                received
                    .into_iter()
                    .map(|r| (r.executor_node, r.payload))
                    .collect(),
            );
            Ok(union)
        }
    }
}

/// Merges every received payload into one set, carried on a copy of the
/// winning group's first response whose executor lists every responding
/// node. `None` if nothing was received.
pub fn merged(ledger: &ResponseLedger) -> Option<DistributedResponse> {
    let best = ledger.best_group()?;
    let received = ledger.received_responses();
    let mut merged = best.canonical().clone();
    merged.executor_node = received.iter().map(|r| &r.executor_node).join(",");
    merged.payload = Payload::merge_all(received.iter().map(|r| &r.payload));
    Some(merged)
}
