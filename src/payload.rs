// Copyright 2020 Graydon Hoare <graydon@pobox.com>
// Licensed under the MIT and Apache-2.0 licenses.

use itertools::Itertools;
use im::OrdSet as ArcOrdSet;
use pergola::{ArcOrdSetWithUnion, LatticeElt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// `Payload` is whatever a node produced by executing the distributed task.
///
/// Reconciliation treats it as opaque: two payloads either compare equal or
/// they don't, and that is all grouping ever asks. The variants exist so that
/// results can be combined (a `Map` for union results, a `Set` for merged
/// results), shipped over serde, and printed in error messages.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Payload {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    Bytes(Vec<u8>),
    List(Vec<Payload>),
    Set(BTreeSet<Payload>),
    Map(BTreeMap<String, Payload>),
}

// The lattice element types want a Default; Null is the natural bottom.
impl Default for Payload {
    fn default() -> Self {
        Payload::Null
    }
}

/// Sets of payloads under union form a (join semi-)lattice; merging every
/// node's result is just the join of their singleton-or-element sets.
pub type PayloadSetLD = ArcOrdSetWithUnion<Payload>;
pub type PayloadSetLE = LatticeElt<PayloadSetLD>;

impl Payload {
    pub fn is_null(&self) -> bool {
        matches!(self, Payload::Null)
    }

    // Collections contribute their elements, scalars contribute themselves.
    fn as_lattice_elt(&self) -> PayloadSetLE {
        let elts: ArcOrdSet<Payload> = match self {
            Payload::List(items) => items.iter().cloned().collect(),
            Payload::Set(items) => items.iter().cloned().collect(),
            other => ArcOrdSet::unit(other.clone()),
        };
        PayloadSetLE::new_from(elts)
    }

    /// Joins any number of payloads into a single `Payload::Set`. `Null`
    /// payloads contribute nothing.
    pub fn merge_all<'a, I>(payloads: I) -> Payload
    where
        I: IntoIterator<Item = &'a Payload>,
    {
        let mut merged = PayloadSetLE::new_from(ArcOrdSet::new());
        for p in payloads.into_iter().filter(|p| !p.is_null()) {
            merged = &merged + &p.as_lattice_elt();
        }
        Payload::Set(merged.value.iter().cloned().collect())
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Null => write!(f, "null"),
            Payload::Bool(b) => write!(f, "{}", b),
            Payload::Int(i) => write!(f, "{}", i),
            Payload::Text(s) => write!(f, "{:?}", s),
            Payload::Bytes(bytes) => {
                write!(f, "0x")?;
                for b in bytes {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
            Payload::List(items) => write!(f, "[{}]", items.iter().join(", ")),
            Payload::Set(items) => write!(f, "{{{}}}", items.iter().join(", ")),
            Payload::Map(entries) => write!(
                f,
                "{{{}}}",
                entries
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, v))
                    .join(", ")
            ),
        }
    }
}

impl From<bool> for Payload {
    fn from(b: bool) -> Self {
        Payload::Bool(b)
    }
}

impl From<i64> for Payload {
    fn from(i: i64) -> Self {
        Payload::Int(i)
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::Text(s.to_string())
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::Text(s)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(bytes)
    }
}
