//! # Taxonomy Resolver
//!
//! Resolves taxon ids to lineages and mints synthetic taxa for merged groups.
//!
//! The resolver caches every record it reads. Synthetic taxa are staged in
//! the cache (so the engine can keep resolving their labels) and handed to
//! the store only when the derived network is materialized. A failed network
//! discards its staged taxa; nothing half-built reaches the store.

use crate::primitives::SEQUENCE_ID_PREFIX;
use crate::storage::NetworkStore;
use crate::{Level, MasqError, TaxonId, TaxonRecord};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Upper bound on attempts to find an unused synthetic id.
const MAX_ID_ATTEMPTS: usize = 1024;

// =============================================================================
// ID GENERATION
// =============================================================================

/// Source of fresh synthetic taxon ids.
///
/// Injected per agglomeration run so tests can use a reproducible sequence
/// while production runs use random UUIDs.
pub trait IdGenerator {
    /// Produce the next candidate id. The resolver skips ids already taken.
    fn next_id(&mut self) -> TaxonId;
}

impl<G: IdGenerator + ?Sized> IdGenerator for Box<G> {
    fn next_id(&mut self) -> TaxonId {
        (**self).next_id()
    }
}

/// Random v4 UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIds;

impl IdGenerator for UuidIds {
    fn next_id(&mut self) -> TaxonId {
        TaxonId(Uuid::new_v4().to_string())
    }
}

/// Deterministic ids `agglom-<scope>-<n>`.
#[derive(Debug, Clone)]
pub struct SequenceIds {
    scope: String,
    next: u64,
}

impl SequenceIds {
    /// Create a sequence scoped to one run.
    #[must_use]
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            next: 0,
        }
    }

    /// Continue `scope` after the highest index already stored.
    pub fn resume<S: NetworkStore + ?Sized>(
        scope: impl Into<String>,
        store: &S,
    ) -> Result<Self, MasqError> {
        let scope = scope.into();
        let prefix = format!("{}-{}-", SEQUENCE_ID_PREFIX, scope);
        let next = store
            .taxon_ids_with_prefix(&prefix)?
            .iter()
            .filter_map(|id| id.as_str().strip_prefix(prefix.as_str())?.parse::<u64>().ok())
            .max()
            .map_or(0, |highest| highest.saturating_add(1));
        tracing::debug!(%scope, next, "resumed id sequence");
        Ok(Self { scope, next })
    }
}

impl IdGenerator for SequenceIds {
    fn next_id(&mut self) -> TaxonId {
        let id = format!("{}-{}-{}", SEQUENCE_ID_PREFIX, self.scope, self.next);
        self.next = self.next.saturating_add(1);
        TaxonId(id)
    }
}

// =============================================================================
// RESOLVER
// =============================================================================

/// Cached lineage lookups plus staged synthetic taxa.
#[derive(Debug)]
pub struct TaxonomyResolver<G: IdGenerator> {
    ids: G,
    cache: BTreeMap<TaxonId, TaxonRecord>,
    /// Synthetic ids not yet handed to the store, in creation order.
    pending: Vec<TaxonId>,
}

impl<G: IdGenerator> TaxonomyResolver<G> {
    #[must_use]
    pub fn new(ids: G) -> Self {
        Self {
            ids,
            cache: BTreeMap::new(),
            pending: Vec::new(),
        }
    }

    /// Full record of a taxon.
    ///
    /// Fails with `TaxonNotFound` when neither the cache nor the store knows
    /// the id: a network edge points at a node without taxonomy.
    pub fn lookup<S: NetworkStore + ?Sized>(
        &mut self,
        store: &S,
        id: &TaxonId,
    ) -> Result<&TaxonRecord, MasqError> {
        if !self.cache.contains_key(id) {
            let record = store
                .get_taxon(id)?
                .ok_or_else(|| MasqError::TaxonNotFound(id.clone()))?;
            self.cache.insert(id.clone(), record);
        }
        self.cache
            .get(id)
            .ok_or_else(|| MasqError::TaxonNotFound(id.clone()))
    }

    /// Label of a taxon at `level`, `None` if unassigned at that depth.
    pub fn label_at<S: NetworkStore + ?Sized>(
        &mut self,
        store: &S,
        id: &TaxonId,
        level: Level,
    ) -> Result<Option<String>, MasqError> {
        Ok(self.lookup(store, id)?.label(level).map(str::to_string))
    }

    /// Mint a synthetic taxon that keeps `parent`'s lineage down to `level`
    /// and leaves every deeper label absent.
    pub fn create_synthetic<S: NetworkStore + ?Sized>(
        &mut self,
        store: &S,
        parent: &TaxonId,
        level: Level,
    ) -> Result<TaxonId, MasqError> {
        let parent_record = self.lookup(store, parent)?.clone();

        let mut attempts = 0usize;
        let id = loop {
            let candidate = self.ids.next_id();
            if !self.cache.contains_key(&candidate) && store.get_taxon(&candidate)?.is_none() {
                break candidate;
            }
            attempts = attempts.saturating_add(1);
            if attempts >= MAX_ID_ATTEMPTS {
                return Err(MasqError::InvalidRecord(format!(
                    "no unused synthetic id after {} attempts",
                    MAX_ID_ATTEMPTS
                )));
            }
        };

        let record = parent_record.truncated(id.clone(), level);
        tracing::debug!(taxon = %id, parent = %parent, %level, "created synthetic taxon");
        self.cache.insert(id.clone(), record);
        self.pending.push(id.clone());
        Ok(id)
    }

    /// Number of staged synthetic taxa.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Hand over the staged synthetic taxa for persistence.
    ///
    /// The records stay cached: once written they are ordinary taxa.
    pub fn take_pending(&mut self) -> Vec<TaxonRecord> {
        self.pending
            .drain(..)
            .filter_map(|id| self.cache.get(&id).cloned())
            .collect()
    }

    /// Forget the staged synthetic taxa of a network that failed.
    pub fn discard_pending(&mut self) {
        for id in self.pending.drain(..) {
            self.cache.remove(&id);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn store() -> MemoryStore {
        let mut store = MemoryStore::new();
        store
            .insert_taxon(TaxonRecord::with_lineage(
                "otu1",
                "study",
                [
                    "Bacteria",
                    "Firmicutes",
                    "Bacilli",
                    "Lactobacillales",
                    "Lactobacillaceae",
                    "Lactobacillus",
                    "casei",
                ],
            ))
            .expect("taxon");
        store
    }

    #[test]
    fn sequence_ids_are_reproducible() {
        let mut first = SequenceIds::new("run");
        let mut second = SequenceIds::new("run");
        assert_eq!(first.next_id(), second.next_id());
        assert_eq!(first.next_id().as_str(), "agglom-run-1");
    }

    #[test]
    fn uuid_ids_do_not_repeat() {
        let mut ids = UuidIds;
        assert_ne!(ids.next_id(), ids.next_id());
    }

    #[test]
    fn lookup_missing_taxon_fails() {
        let store = store();
        let mut resolver = TaxonomyResolver::new(SequenceIds::new("t"));
        let result = resolver.lookup(&store, &TaxonId::new("ghost"));
        assert!(matches!(result, Err(MasqError::TaxonNotFound(_))));
    }

    #[test]
    fn label_at_reads_lineage() {
        let store = store();
        let mut resolver = TaxonomyResolver::new(SequenceIds::new("t"));
        let label = resolver
            .label_at(&store, &TaxonId::new("otu1"), Level::Family)
            .expect("label");
        assert_eq!(label.as_deref(), Some("Lactobacillaceae"));
    }

    #[test]
    fn synthetic_taxon_is_truncated_and_staged() {
        let store = store();
        let mut resolver = TaxonomyResolver::new(SequenceIds::new("t"));
        let id = resolver
            .create_synthetic(&store, &TaxonId::new("otu1"), Level::Order)
            .expect("synthetic");

        let record = resolver.lookup(&store, &id).expect("cached").clone();
        assert_eq!(record.label(Level::Order), Some("Lactobacillales"));
        assert_eq!(record.label(Level::Family), None);
        assert_eq!(record.study, "study");

        // Not in the store until materialized.
        assert!(store.get_taxon(&id).expect("get").is_none());
        assert_eq!(resolver.pending_count(), 1);
        let staged = resolver.take_pending();
        assert_eq!(staged, vec![record]);
        assert_eq!(resolver.pending_count(), 0);
    }

    #[test]
    fn synthetic_ids_skip_existing_taxa() {
        let mut store = store();
        store
            .insert_taxon(TaxonRecord::with_lineage("agglom-t-0", "study", ["Bacteria"]))
            .expect("taxon");
        let mut resolver = TaxonomyResolver::new(SequenceIds::new("t"));
        let id = resolver
            .create_synthetic(&store, &TaxonId::new("otu1"), Level::Genus)
            .expect("synthetic");
        assert_eq!(id.as_str(), "agglom-t-1");
    }

    #[test]
    fn resumed_sequence_starts_past_stored_ids() {
        let mut store = store();
        for n in 0..1100 {
            store
                .insert_taxon(TaxonRecord::with_lineage(
                    format!("agglom-genus-{n}"),
                    "study",
                    ["Bacteria"],
                ))
                .expect("taxon");
        }
        let mut resolver =
            TaxonomyResolver::new(SequenceIds::resume("genus", &store).expect("resume"));
        let id = resolver
            .create_synthetic(&store, &TaxonId::new("otu1"), Level::Genus)
            .expect("synthetic");
        assert_eq!(id.as_str(), "agglom-genus-1100");
    }

    #[test]
    fn resumed_sequence_on_empty_scope_starts_at_zero() {
        let store = store();
        let mut ids = SequenceIds::resume("family", &store).expect("resume");
        assert_eq!(ids.next_id().as_str(), "agglom-family-0");
    }

    #[test]
    fn discarded_synthetic_taxa_are_forgotten() {
        let store = store();
        let mut resolver = TaxonomyResolver::new(SequenceIds::new("t"));
        let id = resolver
            .create_synthetic(&store, &TaxonId::new("otu1"), Level::Genus)
            .expect("synthetic");
        resolver.discard_pending();
        assert!(resolver.lookup(&store, &id).is_err());
    }
}
