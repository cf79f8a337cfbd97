//! # Set Algebra Engine
//!
//! Intersection, union and difference of edges across networks.
//!
//! Edges are grouped by canonical endpoint pair, so `(x, y)` in one network
//! and `(y, x)` in another land in the same group. With weight sensitivity
//! the sign of the weight joins the key: `(x, y, +)` and `(x, y, -)` are
//! different groups. A group's count is the number of distinct networks that
//! contributed to it.
//!
//! The result is a `Graph` holding one weight per edge. When several records
//! fold into one edge the weight of the last contributing record is kept
//! (weight-sensitive results keep the group's sign instead). Every
//! contributing network and weight is listed in the edge metadata.

use crate::graph::Graph;
use crate::primitives::MAX_SET_NETWORKS;
use crate::storage::{NetworkStore, rows_or_empty};
use crate::{EdgeRecord, MasqError, UnorderedPair, WeightSign};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// PARAMETERS
// =============================================================================

/// The three supported operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SetOperation {
    Intersection,
    Union,
    Difference,
}

impl SetOperation {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            SetOperation::Intersection => "intersection",
            SetOperation::Union => "union",
            SetOperation::Difference => "difference",
        }
    }
}

impl fmt::Display for SetOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SetOperation {
    type Err = MasqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "intersection" => Ok(SetOperation::Intersection),
            "union" => Ok(SetOperation::Union),
            "difference" => Ok(SetOperation::Difference),
            other => Err(MasqError::InvalidRecord(format!(
                "unknown set operation: {other}"
            ))),
        }
    }
}

/// Minimum number of networks an intersection group must appear in.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum MinCount {
    /// Every network must agree.
    #[default]
    All,
    /// An absolute number of networks.
    Count(usize),
    /// A fraction of the network count, truncated toward zero.
    Fraction(f64),
}

impl MinCount {
    /// The absolute threshold for `networks` networks.
    #[must_use]
    #[allow(clippy::float_arithmetic)]
    pub fn resolve(self, networks: usize) -> usize {
        match self {
            MinCount::All => networks,
            MinCount::Count(count) => count,
            MinCount::Fraction(fraction) => (networks as f64 * fraction) as usize,
        }
    }
}

// =============================================================================
// GROUPING
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct GroupKey {
    pair: UnorderedPair,
    sign: Option<WeightSign>,
}

#[derive(Debug, Clone)]
struct Group {
    members: BTreeSet<String>,
    networks: Vec<String>,
    weights: Vec<Option<f64>>,
    last: EdgeRecord,
}

// =============================================================================
// ENGINE
// =============================================================================

/// Read-only set algebra over a store.
pub struct SetAlgebra<'s, S: NetworkStore + ?Sized> {
    store: &'s S,
}

impl<'s, S: NetworkStore + ?Sized> SetAlgebra<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    /// Run `operation`. `min_count` only affects intersections; union never
    /// groups by sign.
    pub fn run(
        &self,
        operation: SetOperation,
        networks: Option<&[String]>,
        min_count: MinCount,
        weight_sensitive: bool,
    ) -> Result<Graph, MasqError> {
        match operation {
            SetOperation::Intersection => self.intersection(networks, min_count, weight_sensitive),
            SetOperation::Union => self.union(networks),
            SetOperation::Difference => self.difference(networks, weight_sensitive),
        }
    }

    /// Edges present in at least `min_count` of the networks.
    ///
    /// A threshold above the number of networks yields an empty graph.
    pub fn intersection(
        &self,
        networks: Option<&[String]>,
        min_count: MinCount,
        weight_sensitive: bool,
    ) -> Result<Graph, MasqError> {
        let networks = self.resolve_networks(networks)?;
        let threshold = min_count.resolve(networks.len());
        if threshold > networks.len() {
            tracing::error!(
                threshold,
                networks = networks.len(),
                "intersection size exceeds number of networks"
            );
            return Ok(Graph::new());
        }
        let groups = self.group_edges(&networks, weight_sensitive);
        let graph = build(groups, |group| group.members.len() >= threshold, weight_sensitive);
        tracing::info!(
            networks = networks.len(),
            threshold,
            edges = graph.edge_count(),
            "extracted intersection"
        );
        Ok(graph)
    }

    /// Edges present in exactly one network.
    pub fn difference(
        &self,
        networks: Option<&[String]>,
        weight_sensitive: bool,
    ) -> Result<Graph, MasqError> {
        let networks = self.resolve_networks(networks)?;
        let groups = self.group_edges(&networks, weight_sensitive);
        let graph = build(groups, |group| group.members.len() == 1, weight_sensitive);
        tracing::info!(
            networks = networks.len(),
            edges = graph.edge_count(),
            "extracted difference"
        );
        Ok(graph)
    }

    /// Every edge of every network.
    pub fn union(&self, networks: Option<&[String]>) -> Result<Graph, MasqError> {
        let networks = self.resolve_networks(networks)?;
        let groups = self.group_edges(&networks, false);
        let graph = build(groups, |_| true, false);
        tracing::info!(networks = networks.len(), edges = graph.edge_count(), "extracted union");
        Ok(graph)
    }

    fn resolve_networks(&self, networks: Option<&[String]>) -> Result<Vec<String>, MasqError> {
        let resolved = match networks {
            Some(list) if !list.is_empty() => {
                let mut seen = BTreeSet::new();
                let mut unique = Vec::with_capacity(list.len());
                for network in list {
                    if seen.insert(network.as_str()) {
                        if self.store.get_network(network)?.is_none() {
                            return Err(MasqError::NetworkNotFound(network.clone()));
                        }
                        unique.push(network.clone());
                    }
                }
                unique
            }
            _ => self.store.list_networks()?,
        };
        if resolved.len() > MAX_SET_NETWORKS {
            return Err(MasqError::InvalidRecord(format!(
                "{} networks exceed the limit of {}",
                resolved.len(),
                MAX_SET_NETWORKS
            )));
        }
        Ok(resolved)
    }

    fn group_edges(
        &self,
        networks: &[String],
        weight_sensitive: bool,
    ) -> BTreeMap<GroupKey, Group> {
        let mut groups: BTreeMap<GroupKey, Group> = BTreeMap::new();
        for network in networks {
            let edges = rows_or_empty(self.store.get_edges(network), "set algebra edges");
            for edge in edges {
                let key = GroupKey {
                    pair: edge.pair(),
                    sign: weight_sensitive.then(|| edge.sign()),
                };
                match groups.get_mut(&key) {
                    Some(group) => {
                        group.members.insert(network.clone());
                        group.networks.push(network.clone());
                        group.weights.push(edge.weight);
                        group.last = edge;
                    }
                    None => {
                        let group = Group {
                            members: BTreeSet::from([network.clone()]),
                            networks: vec![network.clone()],
                            weights: vec![edge.weight],
                            last: edge,
                        };
                        groups.insert(key, group);
                    }
                }
            }
        }
        groups
    }
}

/// Turn the kept groups into a graph, one edge per group.
fn build(
    groups: BTreeMap<GroupKey, Group>,
    keep: impl Fn(&Group) -> bool,
    weight_sensitive: bool,
) -> Graph {
    let mut graph = Graph::new();
    for (key, group) in groups {
        if !keep(&group) {
            continue;
        }
        let weight = match key.sign {
            Some(sign) if weight_sensitive => sign.as_weight(),
            _ => group.last.weight,
        };
        let attributes = graph.add_edge(group.last.source, group.last.target, weight);
        attributes.networks.extend(group.networks);
        attributes.weights.extend(group.weights);
    }
    graph
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::{NetworkRecord, TaxonId};

    fn store(networks: &[(&str, &[(&str, &str, Option<f64>)])]) -> MemoryStore {
        let mut store = MemoryStore::new();
        for (id, edges) in networks {
            store
                .insert_network(NetworkRecord::new(*id, "study", 0, edges.len() as u64))
                .expect("network");
            let records: Vec<EdgeRecord> = edges
                .iter()
                .map(|(s, t, w)| EdgeRecord::new(*id, *s, *t, *w))
                .collect();
            store.insert_edges(&records).expect("edges");
        }
        store
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn fraction_truncates() {
        assert_eq!(MinCount::Fraction(0.5).resolve(3), 1);
        assert_eq!(MinCount::Fraction(1.0).resolve(3), 3);
        assert_eq!(MinCount::All.resolve(4), 4);
        assert_eq!(MinCount::Count(2).resolve(4), 2);
    }

    #[test]
    fn operation_parses() {
        assert_eq!("Union".parse::<SetOperation>().expect("parse"), SetOperation::Union);
        assert!("xor".parse::<SetOperation>().is_err());
    }

    #[test]
    fn reversed_edges_intersect() {
        let store = store(&[("A", &[("x", "y", Some(1.0))]), ("B", &[("y", "x", Some(1.0))])]);
        let graph = SetAlgebra::new(&store)
            .intersection(Some(&names(&["A", "B"])), MinCount::Count(2), true)
            .expect("intersection");
        assert_eq!(graph.edge_count(), 1);
        let edge = graph
            .edge(&TaxonId::new("x"), &TaxonId::new("y"))
            .expect("edge");
        assert_eq!(edge.weight, Some(1.0));
        assert_eq!(edge.networks, names(&["A", "B"]));
    }

    #[test]
    fn weight_sign_controls_intersection() {
        let store = store(&[("A", &[("x", "y", Some(0.3))]), ("B", &[("x", "y", Some(-0.7))])]);
        let algebra = SetAlgebra::new(&store);
        let sensitive = algebra.intersection(None, MinCount::All, true).expect("sensitive");
        assert_eq!(sensitive.edge_count(), 0);
        let insensitive = algebra.intersection(None, MinCount::All, false).expect("insensitive");
        assert_eq!(insensitive.edge_count(), 1);
        // Last contribution wins.
        assert_eq!(insensitive.edges().next().expect("edge").weight, Some(-0.7));
    }

    #[test]
    fn oversized_threshold_yields_empty_graph() {
        let store = store(&[("A", &[("x", "y", None)]), ("B", &[("x", "y", None)])]);
        let graph = SetAlgebra::new(&store)
            .intersection(None, MinCount::Count(3), false)
            .expect("no error");
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn duplicate_rows_count_once_per_network() {
        let store = store(&[
            ("A", &[("x", "y", None), ("y", "x", None)]),
            ("B", &[("p", "q", None)]),
        ]);
        let graph = SetAlgebra::new(&store)
            .difference(None, false)
            .expect("difference");
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn difference_keeps_unique_edges() {
        let store = store(&[
            ("A", &[("x", "y", None), ("p", "q", None)]),
            ("B", &[("y", "x", None)]),
        ]);
        let graph = SetAlgebra::new(&store)
            .difference(None, false)
            .expect("difference");
        assert_eq!(graph.edge_count(), 1);
        assert!(graph.edge(&TaxonId::new("p"), &TaxonId::new("q")).is_some());
    }

    #[test]
    fn union_ignores_signs() {
        let store = store(&[("A", &[("x", "y", Some(1.0))]), ("B", &[("y", "x", Some(-1.0))])]);
        let graph = SetAlgebra::new(&store).union(None).expect("union");
        assert_eq!(graph.edge_count(), 1);
        let edge = graph.edges().next().expect("edge");
        assert_eq!(edge.weights, vec![Some(1.0), Some(-1.0)]);
    }

    #[test]
    fn unknown_network_is_rejected() {
        let store = store(&[("A", &[])]);
        let result = SetAlgebra::new(&store).union(Some(&names(&["A", "nope"])));
        assert!(matches!(result, Err(MasqError::NetworkNotFound(_))));
    }
}
