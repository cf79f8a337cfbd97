//! # Network Graph Adapter
//!
//! Converts between flat `EdgeRecord` lists and an in-memory undirected,
//! weighted graph used for output and for counting.
//!
//! Edges are keyed by `UnorderedPair`, so `(a, b)` and `(b, a)` are the same
//! edge. A graph holds one weight per edge: inserting a pair again overwrites
//! the previous weight (last write wins). All maps are `BTreeMap`/`BTreeSet`
//! for deterministic ordering.

use crate::{EdgeRecord, TaxonId, UnorderedPair};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// EDGE ATTRIBUTES
// =============================================================================

/// Attributes carried by one graph edge.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeAttributes {
    /// Endpoint written as `source` on output (the last observed orientation).
    pub source: TaxonId,
    /// The other endpoint.
    pub target: TaxonId,
    /// The single retained weight. `None` for unweighted edges.
    pub weight: Option<f64>,
    /// Networks that contributed this edge (set algebra output only).
    pub networks: Vec<String>,
    /// Every contributing weight, in contribution order (set algebra output only).
    pub weights: Vec<Option<f64>>,
}

// =============================================================================
// GRAPH
// =============================================================================

/// Undirected weighted graph over taxon ids.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Graph {
    /// Every node, including isolated ones.
    nodes: BTreeSet<TaxonId>,

    /// Edges keyed by canonical endpoint pair.
    edges: BTreeMap<UnorderedPair, EdgeAttributes>,
}

impl Graph {
    /// Create a new empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node without edges. Existing nodes are left untouched.
    pub fn add_node(&mut self, id: TaxonId) {
        self.nodes.insert(id);
    }

    /// Insert an edge, overwriting the weight and orientation of an existing
    /// edge between the same endpoints. Returns the stored attributes so the
    /// caller can attach metadata.
    pub fn add_edge(
        &mut self,
        source: TaxonId,
        target: TaxonId,
        weight: Option<f64>,
    ) -> &mut EdgeAttributes {
        self.nodes.insert(source.clone());
        self.nodes.insert(target.clone());
        let key = UnorderedPair::new(source.clone(), target.clone());
        let attributes = self.edges.entry(key).or_insert_with(|| EdgeAttributes {
            source: source.clone(),
            target: target.clone(),
            weight,
            networks: Vec::new(),
            weights: Vec::new(),
        });
        attributes.source = source;
        attributes.target = target;
        attributes.weight = weight;
        attributes
    }

    /// Attributes of the edge between `a` and `b`, in either orientation.
    #[must_use]
    pub fn edge(&self, a: &TaxonId, b: &TaxonId) -> Option<&EdgeAttributes> {
        self.edges.get(&UnorderedPair::new(a.clone(), b.clone()))
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Iterate nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &TaxonId> {
        self.nodes.iter()
    }

    /// Iterate edges in canonical pair order.
    pub fn edges(&self) -> impl Iterator<Item = &EdgeAttributes> {
        self.edges.values()
    }
}

// =============================================================================
// CONVERSIONS
// =============================================================================

/// Build a graph from stored edge records.
///
/// A pair stored twice (in either orientation) yields one edge carrying the
/// weight of the later record.
#[must_use]
pub fn to_graph(records: &[EdgeRecord]) -> Graph {
    let mut graph = Graph::new();
    for record in records {
        graph.add_edge(record.source.clone(), record.target.clone(), record.weight);
    }
    graph
}

/// Flatten a graph to `(source, target, weight)` triples, one per edge.
///
/// A missing weight stays `None`; it is never coerced to zero.
#[must_use]
pub fn from_graph(graph: &Graph) -> Vec<(TaxonId, TaxonId, Option<f64>)> {
    graph
        .edges()
        .map(|edge| (edge.source.clone(), edge.target.clone(), edge.weight))
        .collect()
}

/// Flatten a graph to edge records of `network`.
#[must_use]
pub fn to_edge_records(graph: &Graph, network: &str) -> Vec<EdgeRecord> {
    from_graph(graph)
        .into_iter()
        .map(|(source, target, weight)| EdgeRecord::new(network, source, target, weight))
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reversed_duplicate_overwrites_weight() {
        let graph = to_graph(&[
            EdgeRecord::new("n", "x", "y", Some(0.5)),
            EdgeRecord::new("n", "y", "x", Some(-0.3)),
        ]);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.node_count(), 2);
        let edge = graph
            .edge(&TaxonId::new("x"), &TaxonId::new("y"))
            .expect("edge");
        assert_eq!(edge.weight, Some(-0.3));
        assert_eq!(edge.source.as_str(), "y");
    }

    #[test]
    fn missing_weight_stays_missing() {
        let graph = to_graph(&[EdgeRecord::new("n", "a", "b", None)]);
        let triples = from_graph(&graph);
        assert_eq!(triples, vec![(TaxonId::new("a"), TaxonId::new("b"), None)]);
    }

    #[test]
    fn self_loop_counts_one_node() {
        let graph = to_graph(&[EdgeRecord::new("n", "a", "a", Some(1.0))]);
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn isolated_nodes_are_kept() {
        let mut graph = Graph::new();
        graph.add_node(TaxonId::new("lonely"));
        assert!(graph.nodes().any(|node| node.as_str() == "lonely"));
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn edge_records_carry_network() {
        let graph = to_graph(&[EdgeRecord::new("src", "a", "b", Some(2.0))]);
        let records = to_edge_records(&graph, "out");
        assert_eq!(records, vec![EdgeRecord::new("out", "a", "b", Some(2.0))]);
    }
}
