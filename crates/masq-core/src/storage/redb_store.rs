//! # redb-backed Store
//!
//! A disk-backed `NetworkStore` using the redb embedded database:
//! - ACID transactions
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//!
//! Edges are keyed by `(networkID, sequence)` so the edges of one network
//! form a contiguous range and come back in insertion order.
//!
//! `materialize` and `ingest_dataset` are overridden to run in a single write
//! transaction: a derived network is either fully present or absent.

use super::{NetworkStore, validate_network, validate_taxon};
use crate::{EdgeRecord, MasqError, NetworkRecord, TaxonId, TaxonRecord};
use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition,
    WriteTransaction,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Table for networks: networkID -> serialized NetworkRecord
const NETWORKS: TableDefinition<&str, &[u8]> = TableDefinition::new("networks");

/// Table for edges: (networkID, sequence) -> serialized StoredEdge
const EDGES: TableDefinition<(&str, u64), &[u8]> = TableDefinition::new("edges");

/// Table for taxa: taxonID -> serialized TaxonRecord
const TAXA: TableDefinition<&str, &[u8]> = TableDefinition::new("taxa");

/// Table for metadata: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

/// Metadata key of the next edge sequence number.
const NEXT_EDGE_SEQ: &str = "next_edge_seq";

/// Edge payload as stored; the network id lives in the key.
#[derive(Debug, Serialize, Deserialize)]
struct StoredEdge {
    source: String,
    target: String,
    weight: Option<f64>,
}

fn query_err(e: impl std::fmt::Display) -> MasqError {
    MasqError::QueryFailed(e.to_string())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, MasqError> {
    postcard::to_allocvec(value).map_err(|e| MasqError::SerializationError(e.to_string()))
}

fn decode<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T, MasqError> {
    postcard::from_bytes(bytes).map_err(|e| MasqError::SerializationError(e.to_string()))
}

/// A disk-backed network store using redb.
pub struct RedbStore {
    /// The redb database handle.
    db: Database,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MasqError> {
        let db = Database::create(path.as_ref()).map_err(|e| MasqError::IoError(e.to_string()))?;

        // Initialize tables if they don't exist
        {
            let write_txn = db.begin_write().map_err(query_err)?;
            let _ = write_txn.open_table(NETWORKS).map_err(query_err)?;
            let _ = write_txn.open_table(EDGES).map_err(query_err)?;
            let _ = write_txn.open_table(TAXA).map_err(query_err)?;
            let _ = write_txn.open_table(METADATA).map_err(query_err)?;
            write_txn.commit().map_err(query_err)?;
        }

        Ok(Self { db })
    }

    /// Compact the database file.
    pub fn compact(&mut self) -> Result<(), MasqError> {
        self.db.compact().map_err(query_err)?;
        Ok(())
    }

    /// Number of stored taxa.
    pub fn taxon_count(&self) -> Result<u64, MasqError> {
        let read_txn = self.db.begin_read().map_err(query_err)?;
        let table = read_txn.open_table(TAXA).map_err(query_err)?;
        table.len().map_err(query_err)
    }

    // -------------------------------------------------------------------------
    // Write helpers: each opens its tables on the caller's transaction and
    // drops them before returning, so several can share one commit.
    // -------------------------------------------------------------------------

    fn write_network(txn: &WriteTransaction, record: &NetworkRecord) -> Result<(), MasqError> {
        validate_network(record)?;
        let mut table = txn.open_table(NETWORKS).map_err(query_err)?;
        if table.get(record.id.as_str()).map_err(query_err)?.is_some() {
            return Err(MasqError::InvalidRecord(format!(
                "network {} already exists",
                record.id
            )));
        }
        let bytes = encode(record)?;
        table
            .insert(record.id.as_str(), bytes.as_slice())
            .map_err(query_err)?;
        Ok(())
    }

    fn write_taxon(txn: &WriteTransaction, record: &TaxonRecord) -> Result<(), MasqError> {
        validate_taxon(record)?;
        let mut table = txn.open_table(TAXA).map_err(query_err)?;
        if table.get(record.id.as_str()).map_err(query_err)?.is_some() {
            return Err(MasqError::InvalidRecord(format!(
                "taxon {} already exists",
                record.id
            )));
        }
        let bytes = encode(record)?;
        table
            .insert(record.id.as_str(), bytes.as_slice())
            .map_err(query_err)?;
        Ok(())
    }

    fn read_network_in(
        txn: &WriteTransaction,
        id: &str,
    ) -> Result<Option<NetworkRecord>, MasqError> {
        let table = txn.open_table(NETWORKS).map_err(query_err)?;
        let record = match table.get(id).map_err(query_err)? {
            Some(bytes) => Some(decode::<NetworkRecord>(bytes.value())?),
            None => None,
        };
        Ok(record)
    }

    fn write_edges(txn: &WriteTransaction, records: &[EdgeRecord]) -> Result<(), MasqError> {
        {
            let networks = txn.open_table(NETWORKS).map_err(query_err)?;
            for edge in records {
                if networks
                    .get(edge.network.as_str())
                    .map_err(query_err)?
                    .is_none()
                {
                    return Err(MasqError::NetworkNotFound(edge.network.clone()));
                }
            }
        }

        let mut meta = txn.open_table(METADATA).map_err(query_err)?;
        let mut next_seq = meta
            .get(NEXT_EDGE_SEQ)
            .map_err(query_err)?
            .map(|v| v.value())
            .unwrap_or(0);

        {
            let mut edges = txn.open_table(EDGES).map_err(query_err)?;
            for edge in records {
                let stored = StoredEdge {
                    source: edge.source.0.clone(),
                    target: edge.target.0.clone(),
                    weight: edge.weight,
                };
                let bytes = encode(&stored)?;
                edges
                    .insert((edge.network.as_str(), next_seq), bytes.as_slice())
                    .map_err(query_err)?;
                next_seq = next_seq.saturating_add(1);
            }
        }

        meta.insert(NEXT_EDGE_SEQ, next_seq).map_err(query_err)?;
        Ok(())
    }
}

// =============================================================================
// NETWORKSTORE TRAIT IMPLEMENTATION
// =============================================================================

impl NetworkStore for RedbStore {
    fn get_network(&self, id: &str) -> Result<Option<NetworkRecord>, MasqError> {
        let read_txn = self.db.begin_read().map_err(query_err)?;
        let table = read_txn.open_table(NETWORKS).map_err(query_err)?;
        let record = match table.get(id).map_err(query_err)? {
            Some(bytes) => Some(decode(bytes.value())?),
            None => None,
        };
        Ok(record)
    }

    fn list_networks(&self) -> Result<Vec<String>, MasqError> {
        let read_txn = self.db.begin_read().map_err(query_err)?;
        let table = read_txn.open_table(NETWORKS).map_err(query_err)?;

        let mut ids = Vec::new();
        for entry in table.iter().map_err(query_err)? {
            let (key, _) = entry.map_err(query_err)?;
            ids.push(key.value().to_string());
        }
        Ok(ids)
    }

    fn insert_network(&mut self, record: NetworkRecord) -> Result<(), MasqError> {
        let write_txn = self.db.begin_write().map_err(query_err)?;
        Self::write_network(&write_txn, &record)?;
        write_txn.commit().map_err(query_err)
    }

    fn get_edges(&self, network: &str) -> Result<Vec<EdgeRecord>, MasqError> {
        let read_txn = self.db.begin_read().map_err(query_err)?;
        let table = read_txn.open_table(EDGES).map_err(query_err)?;

        let mut edges = Vec::new();
        for entry in table
            .range((network, 0u64)..=(network, u64::MAX))
            .map_err(query_err)?
        {
            let (_, value) = entry.map_err(query_err)?;
            let stored: StoredEdge = decode(value.value())?;
            edges.push(EdgeRecord::new(
                network,
                stored.source,
                stored.target,
                stored.weight,
            ));
        }
        Ok(edges)
    }

    fn insert_edges(&mut self, records: &[EdgeRecord]) -> Result<(), MasqError> {
        if records.is_empty() {
            return Ok(());
        }
        let write_txn = self.db.begin_write().map_err(query_err)?;
        Self::write_edges(&write_txn, records)?;
        write_txn.commit().map_err(query_err)
    }

    fn delete_edges(
        &mut self,
        predicate: &dyn Fn(&EdgeRecord) -> bool,
    ) -> Result<usize, MasqError> {
        let write_txn = self.db.begin_write().map_err(query_err)?;
        let removed = {
            let mut table = write_txn.open_table(EDGES).map_err(query_err)?;

            // Collect first: the table cannot be mutated while iterated.
            let mut doomed: Vec<(String, u64)> = Vec::new();
            for entry in table.iter().map_err(query_err)? {
                let (key, value) = entry.map_err(query_err)?;
                let (network, seq) = key.value();
                let stored: StoredEdge = decode(value.value())?;
                let edge = EdgeRecord::new(network, stored.source, stored.target, stored.weight);
                if predicate(&edge) {
                    doomed.push((network.to_string(), seq));
                }
            }

            for (network, seq) in &doomed {
                table.remove((network.as_str(), *seq)).map_err(query_err)?;
            }
            doomed.len()
        };
        write_txn.commit().map_err(query_err)?;
        Ok(removed)
    }

    fn get_taxon(&self, id: &TaxonId) -> Result<Option<TaxonRecord>, MasqError> {
        let read_txn = self.db.begin_read().map_err(query_err)?;
        let table = read_txn.open_table(TAXA).map_err(query_err)?;
        let record = match table.get(id.as_str()).map_err(query_err)? {
            Some(bytes) => Some(decode(bytes.value())?),
            None => None,
        };
        Ok(record)
    }

    fn insert_taxon(&mut self, record: TaxonRecord) -> Result<(), MasqError> {
        let write_txn = self.db.begin_write().map_err(query_err)?;
        Self::write_taxon(&write_txn, &record)?;
        write_txn.commit().map_err(query_err)
    }

    fn taxon_ids_with_prefix(&self, prefix: &str) -> Result<Vec<TaxonId>, MasqError> {
        let read_txn = self.db.begin_read().map_err(query_err)?;
        let table = read_txn.open_table(TAXA).map_err(query_err)?;
        let mut ids = Vec::new();
        for entry in table.range(prefix..).map_err(query_err)? {
            let (key, _) = entry.map_err(query_err)?;
            let id = key.value();
            if !id.starts_with(prefix) {
                break;
            }
            ids.push(TaxonId::new(id));
        }
        Ok(ids)
    }

    fn copy_network_summary(&mut self, source: &str, new_id: &str) -> Result<(), MasqError> {
        let write_txn = self.db.begin_write().map_err(query_err)?;
        let summary = Self::read_network_in(&write_txn, source)?
            .ok_or_else(|| MasqError::NetworkNotFound(source.to_string()))?;
        Self::write_network(
            &write_txn,
            &NetworkRecord {
                id: new_id.to_string(),
                ..summary
            },
        )?;
        write_txn.commit().map_err(query_err)
    }

    fn materialize(
        &mut self,
        summary_source: &str,
        network: &str,
        taxa: Vec<TaxonRecord>,
        edges: &[EdgeRecord],
    ) -> Result<(), MasqError> {
        let write_txn = self.db.begin_write().map_err(query_err)?;

        let summary = Self::read_network_in(&write_txn, summary_source)?
            .ok_or_else(|| MasqError::NetworkNotFound(summary_source.to_string()))?;
        Self::write_network(
            &write_txn,
            &NetworkRecord {
                id: network.to_string(),
                ..summary
            },
        )?;
        for taxon in &taxa {
            Self::write_taxon(&write_txn, taxon)?;
        }
        Self::write_edges(&write_txn, edges)?;

        // Dropping the transaction on any error above aborts every write.
        write_txn.commit().map_err(query_err)
    }

    fn ingest_dataset(
        &mut self,
        taxa: Vec<TaxonRecord>,
        networks: Vec<(NetworkRecord, Vec<EdgeRecord>)>,
    ) -> Result<(), MasqError> {
        let write_txn = self.db.begin_write().map_err(query_err)?;

        for taxon in &taxa {
            let existing = {
                let table = write_txn.open_table(TAXA).map_err(query_err)?;
                match table.get(taxon.id.as_str()).map_err(query_err)? {
                    Some(bytes) => Some(decode::<TaxonRecord>(bytes.value())?),
                    None => None,
                }
            };
            if existing.as_ref() == Some(taxon) {
                continue;
            }
            Self::write_taxon(&write_txn, taxon)?;
        }
        for (network, edges) in &networks {
            Self::write_network(&write_txn, network)?;
            Self::write_edges(&write_txn, edges)?;
        }

        write_txn.commit().map_err(query_err)
    }
}

// =============================================================================
// TESTS
// =============================================================================
