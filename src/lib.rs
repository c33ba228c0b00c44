// Copyright 2020 Graydon Hoare <graydon@pobox.com>
// Licensed under the MIT and Apache-2.0 licenses.

/*!
 * This crate reconciles the responses a replicated database gets back when
 * it broadcasts one request to several replica nodes. Each node executes the
 * request independently and answers with a payload; usually they agree, but
 * nodes can lag, fail, or diverge, and someone has to decide what the
 * request's answer actually is.
 *
 * The reconciliation rules are small:
 *
 *   - Responses are partitioned into groups of equal payloads, in arrival
 *     order. The largest group is the candidate answer; among equal sizes
 *     the earliest-created group wins, unless two groups tie for the top,
 *     which is treated as a split brain and fails the request.
 *
 *   - A positive quorum is the minimum size the largest group must reach.
 *     When it is reached, every node outside the winning group is sent a
 *     fix task (built by the request's own task) to bring it in line. When
 *     it isn't, the request is undone and fails with a description of who
 *     disagreed and who never answered.
 *
 *   - The issuing thread blocks only for a configured number of
 *     "synchronous" responses (optionally including the local node's own),
 *     bounded by a per-wait and an overall timeout. Responses arriving
 *     after that are still recorded and repaired.
 *
 * The crate does no networking. Callers supply a [`Transport`] that can
 * deliver fix tasks, and a [`ReplicatedTask`] that knows how to build and
 * undo them. Everything else, including the locking between the receiver
 * threads and the issuing thread, lives in [`ResponseManager`].
 *
 * ## Name
 *
 * Wiktionary:
 *
 * > quorate (adjective): having or constituting a quorum; having a
 * > sufficient number of members present for business to be transacted.
 */

mod config;
mod conflict;
mod error;
mod gate;
mod group;
mod ledger;
mod manager;
mod metrics;
mod payload;
pub mod quorum;
mod request;
mod response;
mod select;
mod task;

pub use config::ResponseManagerConfig;
pub use conflict::{assess, Assessment, ConflictOutcome};
pub use error::{Conflict, ReconcileError, Result};
pub use gate::{Deadline, SynchronizationGate};
pub use group::ResponseGroup;
pub use ledger::{Phase, Recorded, ResponseLedger};
pub use manager::ResponseManager;
pub use metrics::{MetricsSnapshot, ReplicationMetrics};
pub use payload::{Payload, PayloadSetLD, PayloadSetLE};
pub use request::DistributedRequest;
pub use response::{DistributedResponse, NodeName, ResponseEntry};
pub use select::{merged, select, ResultStrategy};
pub use task::{ExecutionMode, ReplicatedTask, Transport};

#[cfg(test)]
mod testing;
