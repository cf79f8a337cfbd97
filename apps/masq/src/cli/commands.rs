//! # CLI Command Implementations
//!
//! Each `cmd_*` opens the configured store, runs one engine operation and
//! prints a summary (plain text, or JSON with `--json`).

use crate::config::{Backend, MasqConfig};
use masq_core::{
    AgglomerationOptions, Agglomerator, EdgeRecord, Level, MasqError, MemoryStore, MinCount,
    NetworkRecord, NetworkStore, RedbStore, SetAlgebra, SetOperation, TaxonRecord,
    primitives::MAX_IMPORT_EDGES, store_from_bytes, store_to_bytes, to_graph, to_graphml,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum dataset size for ingestion (100 MB).
const MAX_INGEST_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), MasqError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| MasqError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(MasqError::SerializationError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Canonicalize an input path and make sure it is a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, MasqError> {
    let canonical = path.canonicalize().map_err(|e| {
        MasqError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(MasqError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Canonicalize the parent of an output path; the file itself may not exist yet.
fn validate_output_path(path: &Path) -> Result<PathBuf, MasqError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        MasqError::IoError(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(MasqError::IoError(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| MasqError::IoError("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

fn write_output(path: &Path, content: &str) -> Result<PathBuf, MasqError> {
    let path = validate_output_path(path)?;
    std::fs::write(&path, content)
        .map_err(|e| MasqError::IoError(format!("Write {}: {}", path.display(), e)))?;
    Ok(path)
}

// =============================================================================
// STORE HANDLE
// =============================================================================

/// The configured backend, opened.
pub enum StoreHandle {
    /// In-memory store loaded from (and saved back to) a binary snapshot.
    File { store: MemoryStore, path: PathBuf },
    Redb(RedbStore),
}

impl StoreHandle {
    /// Open the database named by `config`. A missing snapshot file starts empty.
    pub fn open(config: &MasqConfig) -> Result<Self, MasqError> {
        match config.backend {
            Backend::Redb => Ok(StoreHandle::Redb(RedbStore::open(&config.database)?)),
            Backend::File => {
                let store = if config.database.exists() {
                    let data = std::fs::read(&config.database)
                        .map_err(|e| MasqError::IoError(format!("Read db: {}", e)))?;
                    store_from_bytes(&data)?
                } else {
                    MemoryStore::new()
                };
                Ok(StoreHandle::File {
                    store,
                    path: config.database.clone(),
                })
            }
        }
    }

    pub fn store(&self) -> &dyn NetworkStore {
        match self {
            StoreHandle::File { store, .. } => store,
            StoreHandle::Redb(store) => store,
        }
    }

    pub fn store_mut(&mut self) -> &mut dyn NetworkStore {
        match self {
            StoreHandle::File { store, .. } => store,
            StoreHandle::Redb(store) => store,
        }
    }

    /// Persist the snapshot. redb commits per write, so there is nothing to do.
    pub fn save(&self) -> Result<(), MasqError> {
        match self {
            StoreHandle::File { store, path } => {
                let data = store_to_bytes(store)?;
                std::fs::write(path, &data)
                    .map_err(|e| MasqError::IoError(format!("Write db: {}", e)))
            }
            StoreHandle::Redb(_) => Ok(()),
        }
    }
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Create an empty database.
pub fn cmd_init(config: &MasqConfig, force: bool) -> Result<(), MasqError> {
    let db_path = &config.database;
    if db_path.exists() {
        if !force {
            return Err(MasqError::IoError(
                "Database already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(db_path)
            .map_err(|e| MasqError::IoError(format!("Remove {}: {}", db_path.display(), e)))?;
    }

    let handle = StoreHandle::open(config)?;
    handle.save()?;
    println!(
        "Initialized new {} database at {}",
        config.backend.name(),
        db_path.display()
    );
    Ok(())
}

// =============================================================================
// INGEST COMMAND
// =============================================================================

/// JSON dataset accepted by `ingest`.
///
/// ```json
/// {
///   "taxa": [{"id": "otu1", "study": "s", "lineage": ["Bacteria", "Firmicutes"]}],
///   "networks": [{"id": "n1", "study": "s", "edges": [
///     {"source": "otu1", "target": "otu2", "weight": 0.4}
///   ]}]
/// }
/// ```
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Dataset {
    #[serde(default)]
    pub taxa: Vec<TaxonEntry>,
    #[serde(default)]
    pub networks: Vec<NetworkEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaxonEntry {
    pub id: String,
    #[serde(default)]
    pub study: String,
    /// Kingdom first; `null` or `""` ends the lineage.
    #[serde(default)]
    pub lineage: Vec<Option<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkEntry {
    pub id: String,
    #[serde(default)]
    pub study: String,
    #[serde(default)]
    pub edges: Vec<EdgeEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EdgeEntry {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub weight: Option<f64>,
}

/// Taxa plus each network with its edges, ready for `ingest_dataset`.
pub type DatasetRecords = (Vec<TaxonRecord>, Vec<(NetworkRecord, Vec<EdgeRecord>)>);

impl Dataset {
    /// Convert into store records. Network counts come from the undirected
    /// view of the edge list.
    pub fn into_records(self) -> Result<DatasetRecords, MasqError> {
        let total_edges: usize = self.networks.iter().map(|n| n.edges.len()).sum();
        if total_edges > MAX_IMPORT_EDGES {
            return Err(MasqError::InvalidRecord(format!(
                "{} edges exceed the import limit of {}",
                total_edges, MAX_IMPORT_EDGES
            )));
        }

        let taxa = self
            .taxa
            .into_iter()
            .map(|t| {
                let lineage: Vec<String> = t
                    .lineage
                    .into_iter()
                    .map(Option::unwrap_or_default)
                    .collect();
                TaxonRecord::with_lineage(t.id, t.study, lineage)
            })
            .collect();

        let networks = self
            .networks
            .into_iter()
            .map(|n| {
                let edges: Vec<EdgeRecord> = n
                    .edges
                    .into_iter()
                    .map(|e| EdgeRecord::new(n.id.as_str(), e.source, e.target, e.weight))
                    .collect();
                let graph = to_graph(&edges);
                let record = NetworkRecord::new(
                    n.id,
                    n.study,
                    graph.node_count() as u64,
                    graph.edge_count() as u64,
                );
                (record, edges)
            })
            .collect();

        Ok((taxa, networks))
    }
}

/// Import a JSON dataset.
pub fn cmd_ingest(config: &MasqConfig, json_mode: bool, file: &Path) -> Result<(), MasqError> {
    let path = validate_file_path(file)?;
    validate_file_size(&path, MAX_INGEST_FILE_SIZE)?;
    let content = std::fs::read_to_string(&path)
        .map_err(|e| MasqError::IoError(format!("Read {}: {}", path.display(), e)))?;
    let dataset: Dataset = serde_json::from_str(&content)
        .map_err(|e| MasqError::SerializationError(format!("Invalid dataset: {}", e)))?;

    let (taxa, networks) = dataset.into_records()?;
    let taxon_count = taxa.len();
    let summaries: Vec<NetworkRecord> = networks.iter().map(|(n, _)| n.clone()).collect();

    let mut handle = StoreHandle::open(config)?;
    handle.store_mut().ingest_dataset(taxa, networks)?;
    handle.save()?;
    tracing::info!(taxa = taxon_count, networks = summaries.len(), "ingested dataset");

    if json_mode {
        let output = serde_json::json!({
            "taxa": taxon_count,
            "networks": summaries
                .iter()
                .map(|n| {
                    serde_json::json!({"id": n.id, "nodes": n.node_count, "edges": n.edge_count})
                })
                .collect::<Vec<_>>(),
        });
        println!("{}", output);
    } else {
        println!("Ingested {} taxa and {} networks", taxon_count, summaries.len());
        for n in &summaries {
            println!("  {}: {} nodes, {} edges", n.id, n.node_count, n.edge_count);
        }
    }
    Ok(())
}

// =============================================================================
// NETWORKS COMMAND
// =============================================================================

/// List stored networks.
pub fn cmd_networks(config: &MasqConfig, json_mode: bool) -> Result<(), MasqError> {
    let handle = StoreHandle::open(config)?;
    let store = handle.store();
    let mut records = Vec::new();
    for id in store.list_networks()? {
        if let Some(record) = store.get_network(&id)? {
            records.push(record);
        }
    }

    if json_mode {
        let output = serde_json::to_string(&records)
            .map_err(|e| MasqError::SerializationError(e.to_string()))?;
        println!("{}", output);
    } else if records.is_empty() {
        println!("No networks stored");
    } else {
        for n in &records {
            println!(
                "{}\tstudy={}\tnodes={}\tedges={}",
                n.id, n.study, n.node_count, n.edge_count
            );
        }
    }
    Ok(())
}

// =============================================================================
// AGGLOMERATE COMMAND
// =============================================================================

/// Agglomerate networks up to `level` and report the derived -> input mapping.
pub fn cmd_agglomerate(
    config: &MasqConfig,
    json_mode: bool,
    level: Level,
    networks: &[String],
) -> Result<(), MasqError> {
    let mut handle = StoreHandle::open(config)?;
    let ids = config.id_generator(&level.name().to_lowercase(), handle.store())?;
    let options = AgglomerationOptions {
        weight_sensitive: config.weight_sensitive,
        max_iterations: config.max_iterations,
    };

    let mapping = {
        let mut engine = Agglomerator::new(handle.store_mut(), ids, options);
        engine.agglomerate(level, Some(networks))?
    };
    handle.save()?;

    if json_mode {
        let output = serde_json::to_string(&mapping)
            .map_err(|e| MasqError::SerializationError(e.to_string()))?;
        println!("{}", output);
    } else {
        for (derived, input) in &mapping {
            match input {
                Some(input) => println!("{} <- {}", derived, input),
                None => println!("{} <- (no result)", derived),
            }
        }
    }
    Ok(())
}

// =============================================================================
// SETS COMMAND
// =============================================================================

/// Parse an intersection threshold: a whole number is a network count,
/// anything with a decimal point is a fraction of the networks in (0, 1].
pub fn parse_min_count(size: Option<&str>) -> Result<MinCount, MasqError> {
    let Some(size) = size.map(str::trim) else {
        return Ok(MinCount::All);
    };
    let invalid = || MasqError::InvalidRecord(format!("Invalid intersection size: {}", size));
    if size.contains('.') {
        let fraction: f64 = size.parse().map_err(|_| invalid())?;
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(invalid());
        }
        Ok(MinCount::Fraction(fraction))
    } else {
        let count: usize = size.parse().map_err(|_| invalid())?;
        if count == 0 {
            return Err(invalid());
        }
        Ok(MinCount::Count(count))
    }
}

/// Run a set operation and write `<output_dir>/<operation>.graphml`.
pub fn cmd_sets(
    config: &MasqConfig,
    json_mode: bool,
    operation: SetOperation,
    networks: &[String],
    min_count: MinCount,
    output_dir: &Path,
) -> Result<(), MasqError> {
    let handle = StoreHandle::open(config)?;
    let graph = SetAlgebra::new(handle.store()).run(
        operation,
        Some(networks),
        min_count,
        config.weight_sensitive,
    )?;
    let path = write_output(
        &output_dir.join(format!("{}.graphml", operation.name())),
        &to_graphml(&graph),
    )?;

    if json_mode {
        let output = serde_json::json!({
            "operation": operation.name(),
            "nodes": graph.node_count(),
            "edges": graph.edge_count(),
            "output": path.display().to_string(),
        });
        println!("{}", output);
    } else {
        println!(
            "{}: {} nodes, {} edges written to {}",
            operation,
            graph.node_count(),
            graph.edge_count(),
            path.display()
        );
    }
    Ok(())
}

// =============================================================================
// EXPORT COMMAND
// =============================================================================

/// Write one stored network as GraphML.
pub fn cmd_export(config: &MasqConfig, network: &str, output: &Path) -> Result<(), MasqError> {
    let handle = StoreHandle::open(config)?;
    let store = handle.store();
    if store.get_network(network)?.is_none() {
        return Err(MasqError::NetworkNotFound(network.to_string()));
    }
    let graph = to_graph(&store.get_edges(network)?);
    let path = write_output(output, &to_graphml(&graph))?;
    println!(
        "Exported {} ({} nodes, {} edges) to {}",
        network,
        graph.node_count(),
        graph.edge_count(),
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_count_parsing() {
        assert!(matches!(parse_min_count(None), Ok(MinCount::All)));
        assert!(matches!(parse_min_count(Some("3")), Ok(MinCount::Count(3))));
        assert_eq!(parse_min_count(Some("0.5")).expect("fraction"), MinCount::Fraction(0.5));
        assert!(parse_min_count(Some("0")).is_err());
        assert!(parse_min_count(Some("-0.5")).is_err());
        assert!(parse_min_count(Some("1.5")).is_err());
        assert!(parse_min_count(Some("many")).is_err());
    }

    #[test]
    fn dataset_counts_are_undirected() {
        let dataset: Dataset = serde_json::from_str(
            r#"{"networks": [{"id": "n", "edges": [
                {"source": "a", "target": "b", "weight": 0.5},
                {"source": "b", "target": "a", "weight": 0.5},
                {"source": "b", "target": "c"}
            ]}]}"#,
        )
        .expect("parse");
        let (_, networks) = dataset.into_records().expect("records");
        assert_eq!(networks[0].0.node_count, 3);
        assert_eq!(networks[0].0.edge_count, 2);
        assert_eq!(networks[0].1.len(), 3);
    }

    #[test]
    fn null_label_ends_lineage() {
        let dataset: Dataset = serde_json::from_str(
            r#"{"taxa": [{"id": "t", "lineage": ["Bacteria", null, "Bacilli"]}]}"#,
        )
        .expect("parse");
        let (taxa, _) = dataset.into_records().expect("records");
        assert_eq!(taxa[0].label(Level::Kingdom), Some("Bacteria"));
        assert_eq!(taxa[0].label(Level::Class), None);
    }

    #[test]
    fn output_path_requires_existing_directory() {
        assert!(validate_output_path(Path::new("/nonexistent/dir/out.graphml")).is_err());
        let dir = tempfile::tempdir().expect("tempdir");
        let path = validate_output_path(&dir.path().join("out.graphml")).expect("valid");
        assert!(path.ends_with("out.graphml"));
    }
}
