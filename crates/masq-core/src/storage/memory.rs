//! # In-memory Store
//!
//! `MemoryStore` keeps every record in `BTreeMap`s for deterministic
//! iteration. It backs the test suites and the `file` backend of the CLI,
//! where it is persisted as a snapshot (see `formats::persistence`).

use super::{NetworkStore, validate_network, validate_taxon};
use crate::{EdgeRecord, MasqError, NetworkRecord, TaxonId, TaxonRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An in-memory `NetworkStore`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStore {
    /// Network summaries: networkID -> record
    networks: BTreeMap<String, NetworkRecord>,

    /// Edge lists: networkID -> edges in insertion order
    edges: BTreeMap<String, Vec<EdgeRecord>>,

    /// Taxonomy: taxonID -> record
    taxa: BTreeMap<TaxonId, TaxonRecord>,
}

impl MemoryStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored taxa.
    #[must_use]
    pub fn taxon_count(&self) -> usize {
        self.taxa.len()
    }

    /// Iterate all taxa in id order.
    pub fn taxa(&self) -> impl Iterator<Item = &TaxonRecord> {
        self.taxa.values()
    }
}

impl NetworkStore for MemoryStore {
    fn get_network(&self, id: &str) -> Result<Option<NetworkRecord>, MasqError> {
        Ok(self.networks.get(id).cloned())
    }

    fn list_networks(&self) -> Result<Vec<String>, MasqError> {
        Ok(self.networks.keys().cloned().collect())
    }

    fn insert_network(&mut self, record: NetworkRecord) -> Result<(), MasqError> {
        validate_network(&record)?;
        if self.networks.contains_key(&record.id) {
            return Err(MasqError::InvalidRecord(format!(
                "network {} already exists",
                record.id
            )));
        }
        self.networks.insert(record.id.clone(), record);
        Ok(())
    }

    fn get_edges(&self, network: &str) -> Result<Vec<EdgeRecord>, MasqError> {
        Ok(self.edges.get(network).cloned().unwrap_or_default())
    }

    fn insert_edges(&mut self, records: &[EdgeRecord]) -> Result<(), MasqError> {
        // Validate the whole batch before touching any list.
        if let Some(orphan) = records
            .iter()
            .find(|edge| !self.networks.contains_key(&edge.network))
        {
            return Err(MasqError::NetworkNotFound(orphan.network.clone()));
        }
        for edge in records {
            self.edges
                .entry(edge.network.clone())
                .or_default()
                .push(edge.clone());
        }
        Ok(())
    }

    fn delete_edges(
        &mut self,
        predicate: &dyn Fn(&EdgeRecord) -> bool,
    ) -> Result<usize, MasqError> {
        let mut removed = 0usize;
        for edges in self.edges.values_mut() {
            let before = edges.len();
            edges.retain(|edge| !predicate(edge));
            removed = removed.saturating_add(before - edges.len());
        }
        self.edges.retain(|_, edges| !edges.is_empty());
        Ok(removed)
    }

    fn get_taxon(&self, id: &TaxonId) -> Result<Option<TaxonRecord>, MasqError> {
        Ok(self.taxa.get(id).cloned())
    }

    fn insert_taxon(&mut self, record: TaxonRecord) -> Result<(), MasqError> {
        validate_taxon(&record)?;
        if self.taxa.contains_key(&record.id) {
            return Err(MasqError::InvalidRecord(format!(
                "taxon {} already exists",
                record.id
            )));
        }
        self.taxa.insert(record.id.clone(), record);
        Ok(())
    }

    fn taxon_ids_with_prefix(&self, prefix: &str) -> Result<Vec<TaxonId>, MasqError> {
        Ok(self
            .taxa
            .range(TaxonId::new(prefix)..)
            .map(|(id, _)| id)
            .take_while(|id| id.as_str().starts_with(prefix))
            .cloned()
            .collect())
    }

    fn copy_network_summary(&mut self, source: &str, new_id: &str) -> Result<(), MasqError> {
        let summary = self
            .networks
            .get(source)
            .ok_or_else(|| MasqError::NetworkNotFound(source.to_string()))?;
        let copy = NetworkRecord {
            id: new_id.to_string(),
            ..summary.clone()
        };
        self.insert_network(copy)
    }
}

// =============================================================================
// TESTS
// =============================================================================
