// Copyright 2020 Graydon Hoare <graydon@pobox.com>
// Licensed under the MIT and Apache-2.0 licenses.

use crate::{ReconcileError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-request reconciliation parameters.
///
/// Usually derived from the database's replication settings at broadcast
/// time; every field has a serde default so partial configs deserialize.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseManagerConfig {
    /// Responses the issuing thread blocks for before it may resolve
    /// (default: 1)
    #[serde(default = "default_expected_synchronous_responses")]
    pub expected_synchronous_responses: usize,

    /// Minimum size of an agreeing group; 0 disables quorum checks
    /// entirely (default: 0)
    #[serde(default)]
    pub quorum: usize,

    /// Block until the issuing node's own response arrives (default: false)
    #[serde(default)]
    pub wait_for_local_node: bool,

    /// Bound on a single synchronous wait, in milliseconds (default: 5000)
    #[serde(default = "default_synch_timeout_ms")]
    pub synch_timeout_ms: u64,

    /// Overall deadline measured from broadcast, in milliseconds
    /// (default: 10000)
    #[serde(default = "default_total_timeout_ms")]
    pub total_timeout_ms: u64,
}

fn default_expected_synchronous_responses() -> usize {
    1
}

fn default_synch_timeout_ms() -> u64 {
    5_000
}

fn default_total_timeout_ms() -> u64 {
    10_000
}

impl Default for ResponseManagerConfig {
    fn default() -> Self {
        Self {
            expected_synchronous_responses: default_expected_synchronous_responses(),
            quorum: 0,
            wait_for_local_node: false,
            synch_timeout_ms: default_synch_timeout_ms(),
            total_timeout_ms: default_total_timeout_ms(),
        }
    }
}

impl ResponseManagerConfig {
    /// Majority write quorum (N/2 + 1) over `nodes` replicas, blocking for
    /// exactly that many responses.
    pub fn majority(nodes: usize) -> Self {
        let quorum = (nodes / 2) + 1;
        Self {
            expected_synchronous_responses: quorum,
            quorum,
            ..Self::default()
        }
    }

    pub fn synch_timeout(&self) -> Duration {
        Duration::from_millis(self.synch_timeout_ms)
    }

    pub fn total_timeout(&self) -> Duration {
        Duration::from_millis(self.total_timeout_ms)
    }

    /// Checks the parameters make sense for `expected_nodes` replicas.
    pub fn validate(&self, expected_nodes: usize) -> Result<()> {
        if expected_nodes == 0 {
            return Err(invalid("no expected nodes".to_string()));
        }
        if self.quorum > expected_nodes {
            return Err(invalid(format!(
                "quorum {} exceeds the {} expected nodes",
                self.quorum, expected_nodes
            )));
        }
        if self.expected_synchronous_responses > expected_nodes {
            return Err(invalid(format!(
                "{} synchronous responses expected from only {} nodes",
                self.expected_synchronous_responses, expected_nodes
            )));
        }
        Ok(())
    }
}

fn invalid(reason: String) -> ReconcileError {
    ReconcileError::InvalidConfiguration { reason }
}
