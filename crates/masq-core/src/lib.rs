//! # masq-core
//!
//! The network engines of masq.
//!
//! This crate holds the two graph-rewriting engines that operate on stored
//! microbial co-occurrence networks:
//! - `agglomerate`: contracts a network level by level up the taxonomy
//! - `sets`: intersection, union and difference of edges across networks
//!
//! Both run against the `NetworkStore` trait and never touch a database
//! directly.
//!
//! ## Architectural Constraints
//!
//! - Synchronous and single-threaded: no async, no network dependencies
//! - Deterministic: `BTreeMap` ordering everywhere; synthetic ids come from an
//!   injected `IdGenerator`
//! - Never configures logging; diagnostics go through the `tracing` facade

// =============================================================================
// MODULES
// =============================================================================

pub mod agglomerate;
pub mod formats;
pub mod graph;
pub mod primitives;
pub mod sets;
pub mod storage;
pub mod taxonomy;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    EdgeRecord, Level, MasqError, NetworkRecord, TaxonId, TaxonRecord, UnorderedPair,
    WeightSign, same_weight, strip_level_prefix,
};

// =============================================================================
// RE-EXPORTS: Engines
// =============================================================================

pub use agglomerate::{
    AgglomerationMap, AgglomerationOptions, Agglomerator, LevelEntry, LevelOutcome,
};
pub use graph::{EdgeAttributes, Graph, from_graph, to_edge_records, to_graph};
pub use sets::{MinCount, SetAlgebra, SetOperation};
pub use storage::{MemoryStore, NetworkStore, RedbStore};
pub use taxonomy::{IdGenerator, SequenceIds, TaxonomyResolver, UuidIds};

// =============================================================================
// RE-EXPORTS: Formats (from formats module)
// =============================================================================

pub use formats::{PersistenceHeader, store_from_bytes, store_to_bytes, to_graphml};
