// Copyright 2020 Graydon Hoare <graydon@pobox.com>
// Licensed under the MIT and Apache-2.0 licenses.

// Scripted collaborators shared by the unit and scenario tests.

use crate::*;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

/// Builds a ledger over `nodes` and feeds it `(node, payload)` responses
/// in order.
pub fn ledger_with(
    config: &ResponseManagerConfig,
    responses: &[(&str, &str)],
    nodes: &[&str],
) -> ResponseLedger {
    let mut ledger = ResponseLedger::new(1, nodes.iter().map(|n| n.to_string()), config);
    for (node, payload) in responses {
        ledger
            .record(DistributedResponse::new(*node, *node, *payload), Duration::from_millis(1))
            .unwrap();
    }
    ledger
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestFix {
    pub request_id: u64,
    pub conflicting_node: NodeName,
    pub conflicting_payload: Payload,
    pub winning_node: NodeName,
    pub winning_payload: Payload,
}

#[derive(Debug, Default)]
pub struct TestTask {
    undos: AtomicUsize,
}

impl TestTask {
    pub fn undos(&self) -> usize {
        self.undos.load(Ordering::SeqCst)
    }
}

impl ReplicatedTask for TestTask {
    type Fix = TestFix;

    fn name(&self) -> &str {
        "test-write"
    }

    fn fix_task(
        &self,
        request: &DistributedRequest<Self>,
        conflicting: &DistributedResponse,
        winning: &DistributedResponse,
    ) -> TestFix {
        TestFix {
            request_id: request.id(),
            conflicting_node: conflicting.executor_node.clone(),
            conflicting_payload: conflicting.payload.clone(),
            winning_node: winning.executor_node.clone(),
            winning_payload: winning.payload.clone(),
        }
    }

    fn undo(&self, _request: &DistributedRequest<Self>) {
        self.undos.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sent {
    pub database: String,
    pub node: NodeName,
    pub fix: TestFix,
    pub mode: ExecutionMode,
}

#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
    fail: bool,
}

impl RecordingTransport {
    pub fn failing() -> Self {
        RecordingTransport {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }
}

impl Transport<TestFix> for RecordingTransport {
    fn send(&self, database: &str, node: &str, task: TestFix, mode: ExecutionMode) -> Result<()> {
        self.sent.lock().push(Sent {
            database: database.to_string(),
            node: node.to_string(),
            fix: task,
            mode,
        });
        if self.fail {
            return Err(ReconcileError::Transport {
                node: node.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(())
    }
}
