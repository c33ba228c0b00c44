// Copyright 2020 Graydon Hoare <graydon@pobox.com>
// Licensed under the MIT and Apache-2.0 licenses.

use crate::{DistributedResponse, ReplicatedTask};
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

/// The operation broadcast to the cluster. Immutable once built.
#[derive(Debug)]
pub struct DistributedRequest<T> {
    id: u64,
    database: String,
    task: Arc<T>,
    sent_on: SystemTime,
}

// Manually implement Clone since #[derive(Clone)] would demand T: Clone,
// and the task is shared, not copied.
impl<T> std::clone::Clone for DistributedRequest<T> {
    fn clone(&self) -> Self {
        DistributedRequest {
            id: self.id,
            database: self.database.clone(),
            task: Arc::clone(&self.task),
            sent_on: self.sent_on,
        }
    }
}

impl<T: ReplicatedTask> DistributedRequest<T> {
    pub fn new<D: Into<String>>(id: u64, database: D, task: T) -> Self {
        DistributedRequest {
            id,
            database: database.into(),
            task: Arc::new(task),
            sent_on: SystemTime::now(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn task(&self) -> &T {
        &self.task
    }

    pub fn sent_on(&self) -> SystemTime {
        self.sent_on
    }

    /// Asks the originating task how to bring `conflicting` in line with
    /// `winning`.
    pub fn fix_task(
        &self,
        conflicting: &DistributedResponse,
        winning: &DistributedResponse,
    ) -> T::Fix {
        self.task.fix_task(self, conflicting, winning)
    }

    pub fn undo(&self) {
        self.task.undo(self)
    }
}

impl<T: ReplicatedTask> fmt::Display for DistributedRequest<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} on {}", self.id, self.task.name(), self.database)
    }
}
