// Copyright 2020 Graydon Hoare <graydon@pobox.com>
// Licensed under the MIT and Apache-2.0 licenses.

//! The two collaborators reconciliation leans on but does not implement:
//! the task that was broadcast (which knows how to build its own repair and
//! how to undo itself) and the transport that carries repairs to nodes.

use crate::{DistributedRequest, DistributedResponse, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Whether the sender of a task expects an answer back.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionMode {
    Response,   // The node replies and the reply is awaited.
    NoResponse, // Fire and forget; used for repairs.
}

/// A task that was broadcast to a replica set.
///
/// When replicas disagree but a quorum of them agree, the manager asks the
/// task for a `Fix` to send to each divergent node; what a fix actually does
/// (rewrite a record, delete it, re-run a command) is entirely up to the task.
/// When no quorum is reached the manager calls `undo` instead.
pub trait ReplicatedTask: Debug + Send + Sync + Sized {
    type Fix: Debug + Send + 'static;

    fn name(&self) -> &str;

    fn fix_task(
        &self,
        request: &DistributedRequest<Self>,
        conflicting: &DistributedResponse,
        winning: &DistributedResponse,
    ) -> Self::Fix;

    /// Compensates for a request that could not be reconciled.
    fn undo(&self, _request: &DistributedRequest<Self>) {}
}

/// Outbound side of the cluster network.
///
/// Repairs are sent with `ExecutionMode::NoResponse` and never retried from
/// here: delivery guarantees belong to the implementation of this trait.
pub trait Transport<F>: Send + Sync {
    fn send(&self, database: &str, node: &str, task: F, mode: ExecutionMode) -> Result<()>;
}
