//! # Storage Interface
//!
//! The engines never talk to a database directly. They run against the
//! `NetworkStore` trait, which exposes point queries, batched inserts and
//! edge deletion over three record kinds: networks, edges and taxa.
//!
//! Two backends are provided:
//! - `MemoryStore`: ordered in-memory maps, snapshot-serializable
//! - `RedbStore`: redb embedded database (ACID, persistent)
//!
//! Every call is synchronous and is its own unit of work. No lock is held
//! across calls; concurrent writers to the same network must be serialized
//! by the caller.

mod memory;
mod redb_store;

pub use memory::MemoryStore;
pub use redb_store::RedbStore;

use crate::{EdgeRecord, MasqError, NetworkRecord, TaxonId, TaxonRecord};

// =============================================================================
// NETWORKSTORE TRAIT
// =============================================================================

/// The NetworkStore trait defines the storage operations the engines consume.
///
/// All fallible operations return `Result<T, MasqError>`; backend driver
/// failures surface as `MasqError::QueryFailed`.
pub trait NetworkStore {
    /// Get a network summary by id.
    fn get_network(&self, id: &str) -> Result<Option<NetworkRecord>, MasqError>;

    /// List all network ids in ascending order.
    fn list_networks(&self) -> Result<Vec<String>, MasqError>;

    /// Insert a network summary. Fails if the id is taken.
    fn insert_network(&mut self, record: NetworkRecord) -> Result<(), MasqError>;

    /// Get all edges of a network in insertion order.
    fn get_edges(&self, network: &str) -> Result<Vec<EdgeRecord>, MasqError>;

    /// Insert a batch of edges. Every referenced network must exist.
    fn insert_edges(&mut self, records: &[EdgeRecord]) -> Result<(), MasqError>;

    /// Delete every edge matching the predicate. Returns the number removed.
    fn delete_edges(&mut self, predicate: &dyn Fn(&EdgeRecord) -> bool)
    -> Result<usize, MasqError>;

    /// Get a taxon by id.
    fn get_taxon(&self, id: &TaxonId) -> Result<Option<TaxonRecord>, MasqError>;

    /// Insert a taxon. Taxa are immutable: an existing id is rejected.
    fn insert_taxon(&mut self, record: TaxonRecord) -> Result<(), MasqError>;

    /// Ids of every taxon whose id starts with `prefix`, in id order.
    fn taxon_ids_with_prefix(&self, prefix: &str) -> Result<Vec<TaxonId>, MasqError>;

    /// Copy the summary row of `source` (study and cached counts) under `new_id`.
    fn copy_network_summary(&mut self, source: &str, new_id: &str) -> Result<(), MasqError>;

    /// Write a derived network: its summary (copied from `summary_source`),
    /// the synthetic taxa it references, and its edges.
    ///
    /// Backends with transactions override this to commit all three at once.
    fn materialize(
        &mut self,
        summary_source: &str,
        network: &str,
        taxa: Vec<TaxonRecord>,
        edges: &[EdgeRecord],
    ) -> Result<(), MasqError> {
        self.copy_network_summary(summary_source, network)?;
        for taxon in taxa {
            self.insert_taxon(taxon)?;
        }
        self.insert_edges(edges)
    }

    /// Import taxa and networks with their edges.
    ///
    /// Taxa already present with an identical record are skipped so that
    /// datasets sharing observations can be imported one after another.
    fn ingest_dataset(
        &mut self,
        taxa: Vec<TaxonRecord>,
        networks: Vec<(NetworkRecord, Vec<EdgeRecord>)>,
    ) -> Result<(), MasqError> {
        for taxon in taxa {
            if let Some(existing) = self.get_taxon(&taxon.id)? {
                if existing == taxon {
                    continue;
                }
            }
            self.insert_taxon(taxon)?;
        }
        for (network, edges) in networks {
            self.insert_network(network)?;
            self.insert_edges(&edges)?;
        }
        Ok(())
    }
}

// =============================================================================
// VALIDATION
// =============================================================================

/// Validate a taxon before it is written.
pub(crate) fn validate_taxon(record: &TaxonRecord) -> Result<(), MasqError> {
    if record.id.as_str().is_empty() {
        return Err(MasqError::InvalidRecord("taxon id is empty".to_string()));
    }
    if !record.is_monotonic() {
        return Err(MasqError::InvalidRecord(format!(
            "taxon {} has a label below an unassigned level",
            record.id
        )));
    }
    Ok(())
}

/// Validate a network summary before it is written.
pub(crate) fn validate_network(record: &NetworkRecord) -> Result<(), MasqError> {
    if record.id.is_empty() {
        return Err(MasqError::InvalidRecord("network id is empty".to_string()));
    }
    Ok(())
}

// =============================================================================
// ERROR LOGGING HELPERS
// =============================================================================

/// Log a storage error and fall back to an empty row set.
///
/// Read paths of both engines tolerate a failed query as "no rows"; the
/// failure is logged so it is never silently swallowed.
pub(crate) fn rows_or_empty<T>(result: Result<Vec<T>, MasqError>, context: &str) -> Vec<T> {
    match result {
        Ok(rows) => rows,
        Err(e) => {
            tracing::warn!(context, error = %e, "storage query failed, treating as no rows");
            Vec::new()
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
