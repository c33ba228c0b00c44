// Copyright 2020 Graydon Hoare <graydon@pobox.com>
// Licensed under the MIT and Apache-2.0 licenses.

use crate::{DistributedResponse, NodeName, Payload};
use im::Vector;

/// A bucket of responses whose payloads are all equal.
///
/// The first member is canonical: later responses join the group iff their
/// payload equals its payload. Groups are never empty.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResponseGroup {
    members: Vector<DistributedResponse>,
}

impl ResponseGroup {
    pub(crate) fn new(first: DistributedResponse) -> Self {
        ResponseGroup {
            members: Vector::unit(first),
        }
    }

    pub fn canonical(&self) -> &DistributedResponse {
        // Index 0 always exists, see `new`.
        &self.members[0]
    }

    pub fn accepts(&self, payload: &Payload) -> bool {
        self.canonical().payload == *payload
    }

    pub(crate) fn push(&mut self, response: DistributedResponse) {
        self.members.push_back(response);
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn members(&self) -> impl Iterator<Item = &DistributedResponse> {
        self.members.iter()
    }

    /// Executor nodes of the members, in arrival order.
    pub fn nodes(&self) -> Vec<NodeName> {
        self.members.iter().map(|r| r.executor_node.clone()).collect()
    }
}
