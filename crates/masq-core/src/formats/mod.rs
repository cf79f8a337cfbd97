//! # Formats
//!
//! Byte-level encodings. Pure transformations; file I/O lives in the app.
//!
//! - `persistence`: versioned postcard snapshot of a `MemoryStore`
//! - `graphml`: GraphML export of a `Graph`

pub mod graphml;
pub mod persistence;

pub use graphml::to_graphml;
pub use persistence::{PersistenceHeader, store_from_bytes, store_to_bytes};
