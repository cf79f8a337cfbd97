//! In-memory copy of one network being agglomerated.
//!
//! A multigraph: every stored edge gets its own key, parallel edges with
//! different weights coexist, and an incidence map answers "edges touching
//! this taxon" without a scan.

use crate::{EdgeRecord, MasqError, TaxonId};
use std::collections::{BTreeMap, BTreeSet};

/// One edge of the working network, in stored orientation.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct WorkEdge {
    pub(crate) source: TaxonId,
    pub(crate) target: TaxonId,
    pub(crate) weight: Option<f64>,
}

impl WorkEdge {
    /// The endpoint opposite `node`. For a self-loop this is `node` itself.
    pub(crate) fn partner(&self, node: &TaxonId) -> &TaxonId {
        if &self.source == node {
            &self.target
        } else {
            &self.source
        }
    }
}

/// Which way round a stored edge matches a claimed `(a, x)` orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Orientation {
    Stored,
    Reversed,
}

#[derive(Debug, Default)]
pub(crate) struct WorkingNetwork {
    network: String,
    edges: BTreeMap<u64, WorkEdge>,
    incidence: BTreeMap<TaxonId, BTreeSet<u64>>,
    next_key: u64,
}

impl WorkingNetwork {
    pub(crate) fn from_records(network: &str, records: &[EdgeRecord]) -> Self {
        let mut working = Self {
            network: network.to_string(),
            ..Self::default()
        };
        for record in records {
            working.insert(record.source.clone(), record.target.clone(), record.weight);
        }
        working
    }

    pub(crate) fn insert(&mut self, source: TaxonId, target: TaxonId, weight: Option<f64>) -> u64 {
        let key = self.next_key;
        self.next_key = self.next_key.saturating_add(1);
        self.incidence.entry(source.clone()).or_default().insert(key);
        self.incidence.entry(target.clone()).or_default().insert(key);
        self.edges.insert(
            key,
            WorkEdge {
                source,
                target,
                weight,
            },
        );
        key
    }

    pub(crate) fn remove(&mut self, key: u64) -> Option<WorkEdge> {
        let edge = self.edges.remove(&key)?;
        for node in [&edge.source, &edge.target] {
            if let Some(keys) = self.incidence.get_mut(node) {
                keys.remove(&key);
                if keys.is_empty() {
                    self.incidence.remove(node);
                }
            }
        }
        Some(edge)
    }

    pub(crate) fn get(&self, key: u64) -> Option<&WorkEdge> {
        self.edges.get(&key)
    }

    /// Keys of every edge touching `node`, ascending.
    pub(crate) fn incident(&self, node: &TaxonId) -> Vec<u64> {
        self.incidence
            .get(node)
            .map(|keys| keys.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Whether an edge between `a` and `b` (either orientation) satisfies `accept`.
    pub(crate) fn has_edge_between(
        &self,
        a: &TaxonId,
        b: &TaxonId,
        accept: impl Fn(&WorkEdge) -> bool,
    ) -> bool {
        self.incidence.get(a).is_some_and(|keys| {
            keys.iter()
                .filter_map(|key| self.edges.get(key))
                .any(|edge| edge.partner(a) == b && accept(edge))
        })
    }

    /// Match the claimed orientation `(a, x)` against the stored edge `key`.
    pub(crate) fn orientation(
        &self,
        key: u64,
        a: &TaxonId,
        x: &TaxonId,
    ) -> Result<Orientation, MasqError> {
        let inconsistent = || MasqError::InconsistentPair {
            network: self.network.clone(),
            near: a.clone(),
            far: x.clone(),
        };
        let edge = self.edges.get(&key).ok_or_else(inconsistent)?;
        if &edge.source == a && &edge.target == x {
            Ok(Orientation::Stored)
        } else if &edge.source == x && &edge.target == a {
            Ok(Orientation::Reversed)
        } else {
            Err(inconsistent())
        }
    }

    /// Taxa with at least one incident edge, in id order.
    pub(crate) fn present_taxa(&self) -> impl Iterator<Item = &TaxonId> {
        self.incidence.keys()
    }

    pub(crate) fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub(crate) fn keys(&self) -> Vec<u64> {
        self.edges.keys().copied().collect()
    }

    /// Flatten into records of `network`, oldest edge first.
    pub(crate) fn into_records(self, network: &str) -> Vec<EdgeRecord> {
        self.edges
            .into_values()
            .map(|edge| EdgeRecord::new(network, edge.source, edge.target, edge.weight))
            .collect()
    }
}
