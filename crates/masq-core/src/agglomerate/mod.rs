//! # Agglomeration Engine
//!
//! Contracts a network level by level up the taxonomic hierarchy, producing
//! one derived network per level (`Genus_x`, `Family_x`, ...).
//!
//! For one network at one level the engine:
//! 1. resolves the nearest materialized ancestor to read from,
//! 2. loads its edges into an in-memory working network,
//! 3. contracts edge pairs until none remain (pair fixpoint),
//! 4. merges taxa sharing a label until none remain (taxon-merge fixpoint),
//! 5. materializes the result, or records `None` if nothing changed.
//!
//! Nothing is written until both fixpoints have converged, so a network that
//! fails halfway leaves no trace in the store.
//!
//! ## Failure Semantics
//!
//! Errors for one network (missing taxon, broken chain, divergence) are logged
//! and recorded as `None`. Sibling networks in the same batch carry on.

mod pairs;
mod working;

use crate::primitives::MAX_FIXPOINT_ITERATIONS;
use crate::storage::{NetworkStore, rows_or_empty};
use crate::taxonomy::{IdGenerator, TaxonomyResolver};
use crate::{Level, MasqError, TaxonId, WeightSign, same_weight, strip_level_prefix};
use pairs::PairIndex;
use std::collections::{BTreeMap, BTreeSet};
use working::{Orientation, WorkingNetwork};

/// Derived network name -> input network name, `None` where nothing was
/// materialized (no structure, or failure).
pub type AgglomerationMap = BTreeMap<String, Option<String>>;

// =============================================================================
// OPTIONS & OUTCOMES
// =============================================================================

/// Per-run settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgglomerationOptions {
    /// Pairs only qualify when both edges carry the same weight sign.
    pub weight_sensitive: bool,
    /// Cap on iterations of each fixpoint loop.
    pub max_iterations: usize,
}

impl Default for AgglomerationOptions {
    fn default() -> Self {
        Self {
            weight_sensitive: true,
            max_iterations: MAX_FIXPOINT_ITERATIONS,
        }
    }
}

/// What happened to one network at one level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LevelOutcome {
    /// A new network was written, read from `source`.
    Materialized { source: String },
    /// The derived network existed before this run and was left untouched.
    AlreadyPresent,
    /// No pair and no taxon group: nothing copied.
    Unchanged,
    /// Aborted with an error (already logged).
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelEntry {
    pub derived: String,
    pub input: String,
    pub outcome: LevelOutcome,
}

impl LevelEntry {
    /// The mapping value for this entry.
    #[must_use]
    pub fn mapped(&self) -> Option<String> {
        match self.outcome {
            LevelOutcome::Materialized { .. } | LevelOutcome::AlreadyPresent => {
                Some(self.input.clone())
            }
            LevelOutcome::Unchanged | LevelOutcome::Failed => None,
        }
    }
}

// =============================================================================
// ENGINE
// =============================================================================

/// Agglomeration over one store with one id generator.
pub struct Agglomerator<'s, S: NetworkStore + ?Sized, G: IdGenerator> {
    store: &'s mut S,
    resolver: TaxonomyResolver<G>,
    options: AgglomerationOptions,
}

impl<'s, S: NetworkStore + ?Sized, G: IdGenerator> Agglomerator<'s, S, G> {
    pub fn new(store: &'s mut S, ids: G, options: AgglomerationOptions) -> Self {
        Self {
            store,
            resolver: TaxonomyResolver::new(ids),
            options,
        }
    }

    /// Walk from Species up to `target`, feeding each level's output into the
    /// next. `None` (or an empty list) means every network in the store.
    ///
    /// Networks without a result at some level continue from their nearest
    /// materialized ancestor. Failed networks drop out of the walk.
    pub fn agglomerate(
        &mut self,
        target: Level,
        networks: Option<&[String]>,
    ) -> Result<AgglomerationMap, MasqError> {
        let mut inputs = match networks {
            Some(list) if !list.is_empty() => list.to_vec(),
            _ => self.store.list_networks()?,
        };

        let mut mapping = AgglomerationMap::new();
        for level in target.walk_from_species() {
            tracing::info!(%level, networks = inputs.len(), "checking level");
            let entries = self.agglomerate_level(level, &inputs);
            inputs = Vec::with_capacity(entries.len());
            for entry in entries {
                match entry.outcome {
                    LevelOutcome::Materialized { .. } | LevelOutcome::AlreadyPresent => {
                        inputs.push(entry.derived.clone());
                    }
                    LevelOutcome::Unchanged => inputs.push(entry.input.clone()),
                    LevelOutcome::Failed => {}
                }
                let mapped = entry.mapped();
                mapping.insert(entry.derived, mapped);
            }
        }
        Ok(mapping)
    }

    /// Agglomerate each input to a single `level`.
    pub fn agglomerate_level(&mut self, level: Level, inputs: &[String]) -> Vec<LevelEntry> {
        inputs
            .iter()
            .map(|input| {
                let derived = level.derived_name(input);
                let outcome = match self.agglomerate_network(level, input, &derived) {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        tracing::error!(
                            network = %input,
                            %level,
                            error = %e,
                            "agglomeration failed"
                        );
                        self.resolver.discard_pending();
                        LevelOutcome::Failed
                    }
                };
                LevelEntry {
                    derived,
                    input: input.clone(),
                    outcome,
                }
            })
            .collect()
    }

    fn agglomerate_network(
        &mut self,
        level: Level,
        input: &str,
        derived: &str,
    ) -> Result<LevelOutcome, MasqError> {
        if derived != input && self.store.get_network(derived)?.is_some() {
            tracing::info!(network = %derived, "already materialized, reusing");
            return Ok(LevelOutcome::AlreadyPresent);
        }

        let source = self.resolve_source(level, input)?;
        let edges = rows_or_empty(self.store.get_edges(&source), "agglomeration source edges");
        let mut working = WorkingNetwork::from_records(derived, &edges);

        let contracted = self.contract_pairs(level, derived, &mut working)?;
        let merged = self.merge_taxa(level, derived, &mut working)?;
        if contracted == 0 && merged == 0 {
            tracing::debug!(network = %source, %level, "no pair or taxon group");
            self.resolver.discard_pending();
            return Ok(LevelOutcome::Unchanged);
        }
        if derived == source {
            return Err(MasqError::InvalidRecord(format!(
                "network {derived} already exists and would be overwritten"
            )));
        }

        tracing::info!(
            network = %derived,
            %source,
            contracted,
            merged,
            synthetic = self.resolver.pending_count(),
            "agglomerating"
        );
        let taxa = self.resolver.take_pending();
        let edge_count = working.edge_count();
        let records = working.into_records(derived);
        self.store.materialize(&source, derived, taxa, &records)?;
        tracing::info!(network = %derived, edges = edge_count, "agglomerated network written");

        Ok(LevelOutcome::Materialized { source })
    }

    /// The network to read from: `input` itself, else the nearest finer
    /// derived network with the same base name, else the bare base name.
    fn resolve_source(&self, level: Level, input: &str) -> Result<String, MasqError> {
        if self.store.get_network(input)?.is_some() {
            return Ok(input.to_string());
        }
        let base = strip_level_prefix(input);
        let mut candidates: Vec<String> = Level::ALL
            .into_iter()
            .skip(level.depth().saturating_add(1))
            .map(|finer| finer.derived_name(base))
            .collect();
        candidates.push(base.to_string());

        for candidate in candidates {
            if self.store.get_network(&candidate)?.is_some() {
                tracing::debug!(network = %input, source = %candidate, "resolved ancestor");
                return Ok(candidate);
            }
        }
        Err(MasqError::BrokenChain {
            network: input.to_string(),
            level,
        })
    }

    // =========================================================================
    // PAIR FIXPOINT
    // =========================================================================

    /// Contract edge pairs until none remain. Returns the number contracted.
    fn contract_pairs(
        &mut self,
        level: Level,
        network: &str,
        working: &mut WorkingNetwork,
    ) -> Result<usize, MasqError> {
        let mut index = PairIndex::new();
        for key in working.keys() {
            self.index_edge(level, working, &mut index, key)?;
        }

        // One synthetic taxon per group label, shared by every contraction.
        let mut synthetics: BTreeMap<String, TaxonId> = BTreeMap::new();
        let mut contracted = 0usize;
        let mut iterations = 0usize;

        while let Some(pair) = index.next_pair() {
            iterations = iterations.saturating_add(1);
            if iterations > self.options.max_iterations {
                return Err(MasqError::FixpointDiverged {
                    network: network.to_string(),
                    level,
                    iterations,
                });
            }

            let orientation =
                match working.orientation(pair.first.key, &pair.first.near, &pair.first.far) {
                    Ok(orientation) => orientation,
                    Err(e) => {
                        tracing::warn!(error = %e, "skipping pair");
                        index.remove_entry(&pair.bucket, &pair.first);
                        continue;
                    }
                };
            let second = &pair.second;
            if let Err(e) = working.orientation(second.key, &second.near, &second.far) {
                tracing::warn!(error = %e, "skipping pair");
                index.remove_entry(&pair.bucket, &pair.second);
                continue;
            }

            let near = self.synthetic_for(
                level,
                &mut synthetics,
                &pair.bucket.near_label,
                &pair.first.near,
            )?;
            let far = self.synthetic_for(
                level,
                &mut synthetics,
                &pair.bucket.far_label,
                &pair.first.far,
            )?;
            let weight = if self.options.weight_sensitive {
                pair.bucket.sign.and_then(WeightSign::as_weight)
            } else {
                None
            };

            for key in [pair.first.key, pair.second.key] {
                index.remove_edge(key);
                working.remove(key);
            }
            contracted = contracted.saturating_add(1);
            // Later pairs of the same bucket land on the same synthetic taxa.
            if working.has_edge_between(&near, &far, |existing| {
                same_weight(existing.weight, weight)
            }) {
                continue;
            }
            let (source, target) = match orientation {
                Orientation::Stored => (near, far),
                Orientation::Reversed => (far, near),
            };
            let key = working.insert(source, target, weight);
            self.index_edge(level, working, &mut index, key)?;
        }
        Ok(contracted)
    }

    /// File one edge in the pair index if both endpoints are labelled at `level`.
    fn index_edge(
        &mut self,
        level: Level,
        working: &WorkingNetwork,
        index: &mut PairIndex,
        key: u64,
    ) -> Result<(), MasqError> {
        let Some(edge) = working.get(key) else {
            return Ok(());
        };
        let source_label = self.resolver.label_at(&*self.store, &edge.source, level)?;
        let target_label = self.resolver.label_at(&*self.store, &edge.target, level)?;
        let (Some(source_label), Some(target_label)) = (source_label, target_label) else {
            return Ok(());
        };
        let sign = self
            .options
            .weight_sensitive
            .then(|| WeightSign::of(edge.weight));
        index.insert(
            key,
            (&edge.source, &source_label),
            (&edge.target, &target_label),
            sign,
        );
        Ok(())
    }

    fn synthetic_for(
        &mut self,
        level: Level,
        synthetics: &mut BTreeMap<String, TaxonId>,
        label: &str,
        parent: &TaxonId,
    ) -> Result<TaxonId, MasqError> {
        if let Some(id) = synthetics.get(label) {
            return Ok(id.clone());
        }
        let id = self.resolver.create_synthetic(&*self.store, parent, level)?;
        synthetics.insert(label.to_string(), id.clone());
        Ok(id)
    }

    // =========================================================================
    // TAXON-MERGE FIXPOINT
    // =========================================================================

    /// Merge every group of two or more present taxa sharing a label at
    /// `level` into one fresh representative. Returns the number of groups.
    fn merge_taxa(
        &mut self,
        level: Level,
        network: &str,
        working: &mut WorkingNetwork,
    ) -> Result<usize, MasqError> {
        let present: Vec<TaxonId> = working.present_taxa().cloned().collect();
        let mut groups: BTreeMap<String, BTreeSet<TaxonId>> = BTreeMap::new();
        for taxon in present {
            if let Some(label) = self.resolver.label_at(&*self.store, &taxon, level)? {
                groups.entry(label).or_default().insert(taxon);
            }
        }
        let mut queue: BTreeSet<String> = groups
            .iter()
            .filter(|(_, members)| members.len() >= 2)
            .map(|(label, _)| label.clone())
            .collect();

        let mut merged = 0usize;
        let mut iterations = 0usize;
        while let Some(label) = queue.pop_first() {
            iterations = iterations.saturating_add(1);
            if iterations > self.options.max_iterations {
                return Err(MasqError::FixpointDiverged {
                    network: network.to_string(),
                    level,
                    iterations,
                });
            }

            let members: BTreeSet<TaxonId> = groups
                .remove(&label)
                .unwrap_or_default()
                .into_iter()
                .filter(|member| !working.incident(member).is_empty())
                .collect();
            let Some(first) = members.first().filter(|_| members.len() >= 2) else {
                continue;
            };

            let representative = self.resolver.create_synthetic(&*self.store, first, level)?;
            for member in &members {
                for key in working.incident(member) {
                    // Edges inside the group are met twice; the second visit finds nothing.
                    let Some(edge) = working.remove(key) else {
                        continue;
                    };
                    let partner = edge.partner(member);
                    let partner = if members.contains(partner) {
                        representative.clone()
                    } else {
                        partner.clone()
                    };
                    if !working.has_edge_between(&representative, &partner, |existing| {
                        same_weight(existing.weight, edge.weight)
                    }) {
                        working.insert(representative.clone(), partner, edge.weight);
                    }
                }
            }
            tracing::debug!(
                %label,
                members = members.len(),
                representative = %representative,
                "merged taxa"
            );
            merged = merged.saturating_add(1);
        }
        Ok(merged)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::taxonomy::SequenceIds;
    use crate::{EdgeRecord, NetworkRecord, TaxonRecord};

    fn taxon(id: &str, family: &str, genus: &str) -> TaxonRecord {
        TaxonRecord::with_lineage(
            id,
            "study",
            ["Bacteria", "Firmicutes", "Bacilli", "Lactobacillales", family, genus],
        )
    }

    fn store_with(
        network: &str,
        taxa: Vec<TaxonRecord>,
        edges: &[(&str, &str, Option<f64>)],
    ) -> MemoryStore {
        let mut store = MemoryStore::new();
        let records: Vec<EdgeRecord> = edges
            .iter()
            .map(|(s, t, w)| EdgeRecord::new(network, *s, *t, *w))
            .collect();
        store
            .ingest_dataset(
                taxa,
                vec![(NetworkRecord::new(network, "study", 0, records.len() as u64), records)],
            )
            .expect("ingest");
        store
    }

    fn options(weight_sensitive: bool) -> AgglomerationOptions {
        AgglomerationOptions {
            weight_sensitive,
            ..AgglomerationOptions::default()
        }
    }

    #[test]
    fn pair_contracts_to_one_edge() {
        let mut store = store_with(
            "n",
            vec![
                taxon("a", "FamA", "GenA1"),
                taxon("b", "FamA", "GenA2"),
                taxon("x", "FamX", "GenX1"),
                taxon("y", "FamX", "GenX2"),
            ],
            &[("a", "x", Some(0.4)), ("y", "b", Some(0.9))],
        );
        let mut engine = Agglomerator::new(&mut store, SequenceIds::new("t"), options(true));
        let entries = engine.agglomerate_level(Level::Family, &["n".to_string()]);
        assert_eq!(entries[0].derived, "Family_n");
        assert_eq!(entries[0].outcome, LevelOutcome::Materialized { source: "n".into() });

        let edges = store.get_edges("Family_n").expect("edges");
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].weight, Some(1.0));
        // Source network untouched.
        assert_eq!(store.get_edges("n").expect("edges").len(), 2);
    }

    #[test]
    fn repeated_pairs_collapse_onto_one_edge() {
        let mut store = store_with(
            "n",
            vec![
                taxon("a", "FamA", "GenA1"),
                taxon("b", "FamA", "GenA2"),
                taxon("c", "FamA", "GenA3"),
                taxon("d", "FamA", "GenA4"),
                taxon("x", "FamX", "GenX1"),
                taxon("y", "FamX", "GenX2"),
                taxon("z", "FamX", "GenX3"),
                taxon("w", "FamX", "GenX4"),
            ],
            &[
                ("a", "x", Some(0.5)),
                ("b", "y", Some(0.5)),
                ("c", "z", Some(0.5)),
                ("d", "w", Some(0.5)),
            ],
        );
        let mut engine = Agglomerator::new(&mut store, SequenceIds::new("p"), options(true));
        let entries = engine.agglomerate_level(Level::Family, &["n".to_string()]);
        assert!(matches!(entries[0].outcome, LevelOutcome::Materialized { .. }));

        let edges = store.get_edges("Family_n").expect("edges");
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].weight, Some(1.0));
    }

    #[test]
    fn odd_pair_count_still_collapses() {
        let mut store = store_with(
            "n",
            vec![
                taxon("a", "FamA", "GenA1"),
                taxon("b", "FamA", "GenA2"),
                taxon("c", "FamA", "GenA3"),
                taxon("x", "FamX", "GenX1"),
                taxon("y", "FamX", "GenX2"),
                taxon("z", "FamX", "GenX3"),
            ],
            &[("a", "x", None), ("b", "y", None), ("c", "z", None)],
        );
        let mut engine = Agglomerator::new(&mut store, SequenceIds::new("p"), options(false));
        engine.agglomerate_level(Level::Family, &["n".to_string()]);
        assert_eq!(store.get_edges("Family_n").expect("edges").len(), 1);
    }

    #[test]
    fn opposite_signs_do_not_pair_when_weight_sensitive() {
        let taxa = vec![
            taxon("a", "FamA", "GenA1"),
            taxon("b", "FamA", "GenA2"),
            taxon("x", "FamX", "GenX1"),
            taxon("y", "FamX", "GenX2"),
        ];
        let edges = [("a", "x", Some(0.4)), ("b", "y", Some(-0.9))];

        let mut store = store_with("n", taxa.clone(), &edges);
        let mut engine = Agglomerator::new(&mut store, SequenceIds::new("t"), options(true));
        engine.agglomerate_level(Level::Family, &["n".to_string()]);
        // No pair, but the taxon merge still collapses the groups into two edges.
        assert_eq!(store.get_edges("Family_n").expect("edges").len(), 2);

        let mut store = store_with("n", taxa, &edges);
        let mut engine = Agglomerator::new(&mut store, SequenceIds::new("t"), options(false));
        engine.agglomerate_level(Level::Family, &["n".to_string()]);
        let result = store.get_edges("Family_n").expect("edges");
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].weight, None);
    }

    #[test]
    fn missing_taxon_fails_only_that_network() {
        let mut store = store_with(
            "good",
            vec![taxon("a", "F", "G1"), taxon("b", "F", "G2"), taxon("c", "C", "G3")],
            &[("a", "c", None), ("b", "c", None)],
        );
        store
            .ingest_dataset(
                Vec::new(),
                vec![(
                    NetworkRecord::new("bad", "study", 2, 1),
                    vec![EdgeRecord::new("bad", "a", "ghost", None)],
                )],
            )
            .expect("ingest bad");

        let mut engine = Agglomerator::new(&mut store, SequenceIds::new("t"), options(true));
        let entries =
            engine.agglomerate_level(Level::Family, &["bad".to_string(), "good".to_string()]);
        assert_eq!(entries[0].outcome, LevelOutcome::Failed);
        assert!(matches!(entries[1].outcome, LevelOutcome::Materialized { .. }));
        assert!(store.get_network("Family_bad").expect("get").is_none());
    }

    #[test]
    fn broken_chain_is_reported() {
        let mut store = MemoryStore::new();
        let engine = Agglomerator::new(&mut store, SequenceIds::new("t"), options(true));
        let result = engine.resolve_source(Level::Genus, "Species_missing");
        assert!(matches!(result, Err(MasqError::BrokenChain { .. })));
    }

    #[test]
    fn source_resolution_walks_to_finer_levels() {
        let mut store = store_with("Species_x", vec![], &[]);
        let engine = Agglomerator::new(&mut store, SequenceIds::new("t"), options(true));
        let source = engine.resolve_source(Level::Family, "Genus_x").expect("source");
        assert_eq!(source, "Species_x");
    }

    #[test]
    fn existing_derived_network_is_reused() {
        let mut store = store_with(
            "n",
            vec![taxon("a", "F", "G1"), taxon("b", "F", "G2"), taxon("c", "C", "G3")],
            &[("a", "c", None), ("b", "c", None)],
        );
        store
            .insert_network(NetworkRecord::new("Family_n", "study", 0, 0))
            .expect("pre-existing");
        let mut engine = Agglomerator::new(&mut store, SequenceIds::new("t"), options(true));
        let entries = engine.agglomerate_level(Level::Family, &["n".to_string()]);
        assert_eq!(entries[0].outcome, LevelOutcome::AlreadyPresent);
        assert_eq!(entries[0].mapped(), Some("n".to_string()));
        assert!(store.get_edges("Family_n").expect("edges").is_empty());
    }

    #[test]
    fn iteration_cap_trips() {
        let mut store = store_with(
            "n",
            vec![
                taxon("a", "FamA", "GenA1"),
                taxon("b", "FamA", "GenA2"),
                taxon("x", "FamX", "GenX1"),
                taxon("y", "FamX", "GenX2"),
            ],
            &[("a", "x", None), ("b", "y", None)],
        );
        let capped = AgglomerationOptions {
            weight_sensitive: false,
            max_iterations: 0,
        };
        let mut engine = Agglomerator::new(&mut store, SequenceIds::new("t"), capped);
        let entries = engine.agglomerate_level(Level::Family, &["n".to_string()]);
        assert_eq!(entries[0].outcome, LevelOutcome::Failed);
        assert_eq!(store.taxon_count(), 4);
    }
}
