// Copyright 2020 Graydon Hoare <graydon@pobox.com>
// Licensed under the MIT and Apache-2.0 licenses.

//! Stateless quorum rules over an ordered sequence of response groups.
//!
//! Group order is creation order, and it matters: whenever two groups are
//! the same size the earlier one wins. Everything here is a pure function of
//! the groups so it can run on a ledger snapshot without holding any lock.

use crate::{DistributedResponse, ResponseGroup};
use im::Vector;
use itertools::Itertools;

/// True if quorum is disabled (0) or some group has at least `quorum`
/// members.
pub fn is_minimum_quorum_reached(groups: &Vector<ResponseGroup>, quorum: usize) -> bool {
    quorum == 0 || groups.iter().any(|g| g.len() >= quorum)
}

/// Index of the largest group, earliest on ties; `None` if there are no
/// groups at all.
pub fn best_group_index(groups: &Vector<ResponseGroup>) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for (i, g) in groups.iter().enumerate() {
        match best {
            // Strictly greater: the first group to reach a size keeps it.
            Some((_, size)) if g.len() <= size => (),
            _ => best = Some((i, g.len())),
        }
    }
    best.map(|(i, _)| i)
}

/// Indices of every group whose size equals the best group's, best first.
/// More than one entry means there is no unique winner.
pub fn tied_group_indices(groups: &Vector<ResponseGroup>) -> Vec<usize> {
    match best_group_index(groups) {
        None => Vec::new(),
        Some(best) => {
            let size = groups[best].len();
            groups.iter().positions(|g| g.len() == size).collect()
        }
    }
}

/// Every response outside the best group, in group order.
pub fn conflicting_responses(groups: &Vector<ResponseGroup>) -> Vec<DistributedResponse> {
    let best = best_group_index(groups);
    groups
        .iter()
        .enumerate()
        .filter(|(i, _)| Some(*i) != best)
        .flat_map(|(_, g)| g.members().cloned())
        .collect()
}
