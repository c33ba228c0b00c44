// Copyright 2020 Graydon Hoare <graydon@pobox.com>
// Licensed under the MIT and Apache-2.0 licenses.

use crate::{NodeName, Payload};
use itertools::Itertools;
use thiserror::Error;

/// A node whose answer disagreed with the winning group, with what it said.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Conflict {
    pub node: NodeName,
    pub payload: Payload,
}

/// Everything that can go wrong while reconciling one request.
///
/// Only `NoResponse`, `QuorumNotReached` and `SplitBrain` ever reach the
/// issuing thread from `get_response`; the rest are raised and absorbed
/// internally (unexpected or duplicate replies) or at construction time.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A reply arrived from a node we never sent the request to.
    #[error("response for request {request_id} from unexpected node {node}")]
    UnexpectedNode { request_id: u64, node: NodeName },

    /// A node answered twice.
    #[error("duplicate response for request {request_id} from node {node}")]
    DuplicateResponse { request_id: u64, node: NodeName },

    /// Nobody answered at all.
    #[error("no response received from any of nodes [{}] for request {request_id}", join_nodes(.expected))]
    NoResponse {
        request_id: u64,
        expected: Vec<NodeName>,
    },

    /// No group of agreeing responses is as big as the quorum.
    #[error(
        "quorum {quorum} not reached for request {request_id} (best agreement {agreement}); {}{}",
        describe_conflicts(.conflicts),
        describe_missing(.missing)
    )]
    QuorumNotReached {
        request_id: u64,
        quorum: usize,
        agreement: usize,
        conflicts: Vec<Conflict>,
        missing: Vec<NodeName>,
    },

    /// Two or more groups are tied for largest, so there is no winner.
    #[error(
        "split brain for request {request_id}: groups {} disagree and none wins (quorum {quorum})",
        describe_groups(.groups)
    )]
    SplitBrain {
        request_id: u64,
        quorum: usize,
        groups: Vec<Vec<NodeName>>,
    },

    #[error("invalid response manager configuration: {reason}")]
    InvalidConfiguration { reason: String },

    #[error("failed to send to node {node}: {reason}")]
    Transport { node: NodeName, reason: String },
}

pub type Result<T> = std::result::Result<T, ReconcileError>;

fn describe_conflicts(conflicts: &[Conflict]) -> String {
    if conflicts.is_empty() {
        return "no server in conflict".to_string();
    }
    format!(
        "servers in conflict: {}",
        conflicts
            .iter()
            .map(|c| format!("{}: {}", c.node, c.payload))
            .join("; ")
    )
}

fn describe_missing(missing: &[NodeName]) -> String {
    if missing.is_empty() {
        String::new()
    } else {
        format!("; no answer from [{}]", join_nodes(missing))
    }
}

fn join_nodes(nodes: &[NodeName]) -> String {
    nodes.join(", ")
}

fn describe_groups(groups: &[Vec<NodeName>]) -> String {
    groups
        .iter()
        .map(|g| format!("[{}]", join_nodes(g)))
        .join(" vs ")
}
