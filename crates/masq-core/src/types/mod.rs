//! # Core Type Definitions
//!
//! This module contains the record types shared by both engines and by every
//! storage backend:
//! - Identifiers and levels (`TaxonId`, `Level`)
//! - Storage records (`NetworkRecord`, `EdgeRecord`, `TaxonRecord`)
//! - Edge keys used for direction-insensitive grouping (`UnorderedPair`, `WeightSign`)
//! - Error types (`MasqError`)
//!
//! ## Ordering Guarantees
//!
//! Every key type implements `Ord` so that engines iterate `BTreeMap`/`BTreeSet`
//! in a stable order. Given the same store contents and the same id generator,
//! agglomeration and set algebra produce identical results.

use crate::primitives::LEVEL_COUNT;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// =============================================================================
// TAXON IDENTIFIER
// =============================================================================

/// Identifier of a taxon (a network node).
///
/// Either the observation id from the abundance table or a minted id for a
/// synthetic taxon created during agglomeration.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaxonId(pub String);

impl TaxonId {
    /// Create a taxon id from anything string-like.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaxonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaxonId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// =============================================================================
// TAXONOMIC LEVEL
// =============================================================================

/// One of the seven taxonomic ranks, ordered coarse to fine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Level {
    Kingdom,
    Phylum,
    Class,
    Order,
    Family,
    Genus,
    Species,
}

impl Level {
    /// All levels, Kingdom first.
    pub const ALL: [Level; LEVEL_COUNT] = [
        Level::Kingdom,
        Level::Phylum,
        Level::Class,
        Level::Order,
        Level::Family,
        Level::Genus,
        Level::Species,
    ];

    /// Index into a lineage array (Kingdom = 0, Species = 6).
    #[must_use]
    pub const fn depth(self) -> usize {
        self as usize
    }

    /// Capitalized rank name, also used as the derived network prefix.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Level::Kingdom => "Kingdom",
            Level::Phylum => "Phylum",
            Level::Class => "Class",
            Level::Order => "Order",
            Level::Family => "Family",
            Level::Genus => "Genus",
            Level::Species => "Species",
        }
    }

    /// The levels visited by a level walk ending at `self`:
    /// Species first, then every coarser level up to and including `self`.
    pub fn walk_from_species(self) -> impl Iterator<Item = Level> {
        Level::ALL.into_iter().skip(self.depth()).rev()
    }

    /// Name of the network derived from `network` at this level.
    ///
    /// Any level prefix already on `network` is replaced, so chained walks
    /// produce `Genus_x` from `Species_x` rather than `Genus_Species_x`.
    #[must_use]
    pub fn derived_name(self, network: &str) -> String {
        format!("{}_{}", self.name(), strip_level_prefix(network))
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Level {
    type Err = MasqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Level::ALL
            .iter()
            .copied()
            .find(|level| level.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| MasqError::InvalidLevel(s.to_string()))
    }
}

/// Strip one leading `<Level>_` prefix from a network name.
#[must_use]
pub fn strip_level_prefix(network: &str) -> &str {
    Level::ALL
        .iter()
        .find_map(|level| {
            network
                .strip_prefix(level.name())
                .and_then(|rest| rest.strip_prefix('_'))
        })
        .unwrap_or(network)
}

// =============================================================================
// TAXON RECORD
// =============================================================================

/// A taxon row: id, study and a 7-level lineage.
///
/// The lineage obeys the monotonic prefix invariant: a label present at
/// depth d implies labels at every shallower depth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonRecord {
    pub id: TaxonId,
    pub study: String,
    pub labels: [Option<String>; LEVEL_COUNT],
}

impl TaxonRecord {
    /// Create a taxon with a lineage given Kingdom first.
    ///
    /// Empty strings and anything beyond Species are ignored; the lineage
    /// stops at the first empty label so the record is always monotonic.
    pub fn with_lineage<I, S>(id: impl Into<TaxonId>, study: impl Into<String>, lineage: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut labels: [Option<String>; LEVEL_COUNT] = Default::default();
        for (slot, label) in labels.iter_mut().zip(lineage) {
            let label = label.as_ref().trim();
            if label.is_empty() {
                break;
            }
            *slot = Some(label.to_string());
        }
        Self {
            id: id.into(),
            study: study.into(),
            labels,
        }
    }

    /// Label at the given level, if assigned.
    #[must_use]
    pub fn label(&self, level: Level) -> Option<&str> {
        self.labels[level.depth()].as_deref()
    }

    /// Check the monotonic prefix invariant.
    #[must_use]
    pub fn is_monotonic(&self) -> bool {
        let mut absent_seen = false;
        for label in &self.labels {
            match label {
                Some(_) if absent_seen => return false,
                Some(_) => {}
                None => absent_seen = true,
            }
        }
        true
    }

    /// Copy of this lineage truncated after `level`, under a new id.
    #[must_use]
    pub fn truncated(&self, id: TaxonId, level: Level) -> Self {
        let mut labels: [Option<String>; LEVEL_COUNT] = Default::default();
        for (depth, slot) in labels.iter_mut().enumerate().take(level.depth() + 1) {
            slot.clone_from(&self.labels[depth]);
        }
        Self {
            id,
            study: self.study.clone(),
            labels,
        }
    }
}

impl From<String> for TaxonId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// =============================================================================
// NETWORK & EDGE RECORDS
// =============================================================================

/// Summary row of a network. Counts are cached at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkRecord {
    pub id: String,
    pub study: String,
    pub node_count: u64,
    pub edge_count: u64,
}

impl NetworkRecord {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        study: impl Into<String>,
        node_count: u64,
        edge_count: u64,
    ) -> Self {
        Self {
            id: id.into(),
            study: study.into(),
            node_count,
            edge_count,
        }
    }
}

/// One stored edge. Direction is whatever the importer wrote; it carries
/// no meaning and the same relationship may appear reversed elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub network: String,
    pub source: TaxonId,
    pub target: TaxonId,
    pub weight: Option<f64>,
}

impl EdgeRecord {
    #[must_use]
    pub fn new(
        network: impl Into<String>,
        source: impl Into<TaxonId>,
        target: impl Into<TaxonId>,
        weight: Option<f64>,
    ) -> Self {
        Self {
            network: network.into(),
            source: source.into(),
            target: target.into(),
            weight,
        }
    }

    /// Direction-insensitive key of this edge.
    #[must_use]
    pub fn pair(&self) -> UnorderedPair {
        UnorderedPair::new(self.source.clone(), self.target.clone())
    }

    /// Sign class of the weight.
    #[must_use]
    pub fn sign(&self) -> WeightSign {
        WeightSign::of(self.weight)
    }
}

// =============================================================================
// UNORDERED PAIR
// =============================================================================

/// Canonical key for an undirected edge: endpoints stored in sorted order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnorderedPair {
    low: TaxonId,
    high: TaxonId,
}

impl UnorderedPair {
    #[must_use]
    pub fn new(a: TaxonId, b: TaxonId) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    #[must_use]
    pub fn low(&self) -> &TaxonId {
        &self.low
    }

    #[must_use]
    pub fn high(&self) -> &TaxonId {
        &self.high
    }
}

// =============================================================================
// WEIGHT SIGN
// =============================================================================

/// Sign class of an edge weight. Missing (and NaN) weights form their own class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum WeightSign {
    Negative,
    Zero,
    Positive,
    Unweighted,
}

impl WeightSign {
    #[must_use]
    pub fn of(weight: Option<f64>) -> Self {
        match weight {
            None => Self::Unweighted,
            Some(w) if w.is_nan() => Self::Unweighted,
            Some(w) if w > 0.0 => Self::Positive,
            Some(w) if w < 0.0 => Self::Negative,
            Some(_) => Self::Zero,
        }
    }

    /// The sign as a weight value (-1, 0, +1), or `None` for unweighted.
    #[must_use]
    pub const fn as_weight(self) -> Option<f64> {
        match self {
            Self::Negative => Some(-1.0),
            Self::Zero => Some(0.0),
            Self::Positive => Some(1.0),
            Self::Unweighted => None,
        }
    }
}

/// Weight equality used for edge deduplication. `None == None`, NaN equals NaN.
#[must_use]
pub fn same_weight(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => x == y || (x.is_nan() && y.is_nan()),
        _ => false,
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in masq.
///
/// Per-network errors raised inside an agglomeration batch are logged and
/// recorded as an absent mapping entry; they do not abort sibling networks.
#[derive(Debug, Error)]
pub enum MasqError {
    /// An edge references a taxon without a taxonomy record.
    #[error("Taxon not found: {0}")]
    TaxonNotFound(TaxonId),

    /// The requested network does not exist.
    #[error("Network not found: {0}")]
    NetworkNotFound(String),

    /// No materialized ancestor exists for a network in the level chain.
    #[error("Broken network chain for {network} at level {level}")]
    BrokenChain { network: String, level: Level },

    /// A storage operation failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// A pair references an edge that exists in neither orientation.
    #[error("Inconsistent pair in {network}: no edge between {near} and {far}")]
    InconsistentPair {
        network: String,
        near: TaxonId,
        far: TaxonId,
    },

    /// A fixpoint loop exceeded the iteration cap.
    #[error(
        "Fixpoint did not converge for {network} at level {level} after {iterations} iterations"
    )]
    FixpointDiverged {
        network: String,
        level: Level,
        iterations: usize,
    },

    /// A string does not name a taxonomic level.
    #[error("Invalid taxonomic level: {0}")]
    InvalidLevel(String),

    /// A record violates a storage invariant.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),

    /// Configuration could not be loaded or is contradictory.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_parses_case_insensitively() {
        assert_eq!("genus".parse::<Level>().expect("parse"), Level::Genus);
        assert_eq!("ORDER".parse::<Level>().expect("parse"), Level::Order);
        assert!(matches!(
            "strain".parse::<Level>(),
            Err(MasqError::InvalidLevel(_))
        ));
    }

    #[test]
    fn walk_starts_at_species() {
        let walk: Vec<_> = Level::Family.walk_from_species().collect();
        assert_eq!(walk, vec![Level::Species, Level::Genus, Level::Family]);

        let walk: Vec<_> = Level::Species.walk_from_species().collect();
        assert_eq!(walk, vec![Level::Species]);
    }

    #[test]
    fn derived_name_does_not_stack_prefixes() {
        assert_eq!(Level::Species.derived_name("gut"), "Species_gut");
        assert_eq!(Level::Genus.derived_name("Species_gut"), "Genus_gut");
        assert_eq!(strip_level_prefix("Speciesgut"), "Speciesgut");
    }

    #[test]
    fn lineage_stops_at_first_gap() {
        let taxon = TaxonRecord::with_lineage("otu1", "study", ["Bacteria", "Firmicutes", "", "X"]);
        assert_eq!(taxon.label(Level::Phylum), Some("Firmicutes"));
        assert_eq!(taxon.label(Level::Order), None);
        assert!(taxon.is_monotonic());
    }

    #[test]
    fn monotonic_check_rejects_holes() {
        let mut taxon = TaxonRecord::with_lineage("otu1", "study", ["Bacteria"]);
        taxon.labels[3] = Some("Orphan".to_string());
        assert!(!taxon.is_monotonic());
    }

    #[test]
    fn truncation_keeps_prefix_through_level() {
        let taxon = TaxonRecord::with_lineage(
            "otu1",
            "study",
            [
                "Bacteria",
                "Proteobacteria",
                "Gamma",
                "Entero",
                "Enterobacteriaceae",
                "Escherichia",
                "coli",
            ],
        );
        let synthetic = taxon.truncated(TaxonId::new("agg"), Level::Family);
        assert_eq!(synthetic.label(Level::Family), Some("Enterobacteriaceae"));
        assert_eq!(synthetic.label(Level::Genus), None);
        assert_eq!(synthetic.label(Level::Species), None);
        assert_eq!(synthetic.study, "study");
    }

    #[test]
    fn unordered_pair_ignores_direction() {
        let ab = UnorderedPair::new(TaxonId::new("a"), TaxonId::new("b"));
        let ba = UnorderedPair::new(TaxonId::new("b"), TaxonId::new("a"));
        assert_eq!(ab, ba);
        assert_eq!(ab.low().as_str(), "a");
    }

    #[test]
    fn weight_sign_classes() {
        assert_eq!(WeightSign::of(Some(0.7)), WeightSign::Positive);
        assert_eq!(WeightSign::of(Some(-3.0)), WeightSign::Negative);
        assert_eq!(WeightSign::of(Some(0.0)), WeightSign::Zero);
        assert_eq!(WeightSign::of(None), WeightSign::Unweighted);
        assert_eq!(WeightSign::of(Some(f64::NAN)), WeightSign::Unweighted);
        assert_eq!(WeightSign::Negative.as_weight(), Some(-1.0));
    }

    #[test]
    fn inconsistent_pair_names_both_endpoints() {
        let error = MasqError::InconsistentPair {
            network: "Genus_n".to_string(),
            near: TaxonId::new("a"),
            far: TaxonId::new("x"),
        };
        assert_eq!(
            error.to_string(),
            "Inconsistent pair in Genus_n: no edge between a and x"
        );
        assert!(std::error::Error::source(&error).is_none());
    }

    #[test]
    fn weight_equality_handles_missing_values() {
        assert!(same_weight(None, None));
        assert!(same_weight(Some(0.5), Some(0.5)));
        assert!(!same_weight(Some(0.5), None));
        assert!(!same_weight(Some(0.5), Some(-0.5)));
    }
}
