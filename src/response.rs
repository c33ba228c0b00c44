// Copyright 2020 Graydon Hoare <graydon@pobox.com>
// Licensed under the MIT and Apache-2.0 licenses.

use crate::Payload;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Nodes are identified by name throughout; names are what the transport
/// routes on and what operators read in logs.
pub type NodeName = String;

/// One node's answer to a distributed request.
///
/// The executor is the node that actually ran the task; the sender is the
/// node that relayed the reply to us (usually the same node, but not when a
/// reply is forwarded).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DistributedResponse {
    pub executor_node: NodeName,
    pub sender_node: NodeName,
    pub payload: Payload,
    pub executed_on_local_node: bool,
}

impl DistributedResponse {
    pub fn new<N, S, P>(executor_node: N, sender_node: S, payload: P) -> Self
    where
        N: Into<NodeName>,
        S: Into<NodeName>,
        P: Into<Payload>,
    {
        DistributedResponse {
            executor_node: executor_node.into(),
            sender_node: sender_node.into(),
            payload: payload.into(),
            executed_on_local_node: false,
        }
    }

    /// Marks the response as having been executed on the node that issued
    /// the request.
    pub fn executed_locally(mut self) -> Self {
        self.executed_on_local_node = true;
        self
    }
}

impl fmt::Display for DistributedResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.executor_node, self.payload)
    }
}

/// Per-node slot in the ledger. Every expected node starts `Pending` and
/// moves to `Received` at most once.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ResponseEntry {
    Pending,
    Received(DistributedResponse),
}

impl ResponseEntry {
    pub fn is_pending(&self) -> bool {
        matches!(self, ResponseEntry::Pending)
    }

    pub fn response(&self) -> Option<&DistributedResponse> {
        match self {
            ResponseEntry::Pending => None,
            ResponseEntry::Received(r) => Some(r),
        }
    }
}
