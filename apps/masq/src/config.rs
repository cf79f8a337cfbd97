//! # Configuration
//!
//! `masq.toml` settings. Every field is optional in the file; command-line
//! flags override whatever the file says.
//!
//! ```toml
//! database = "masq.redb"
//! backend = "redb"          # or "file"
//! weight_sensitive = true
//! id_strategy = "uuid"      # or "sequence"
//! max_iterations = 1000000
//! ```

use clap::ValueEnum;
use masq_core::primitives::MAX_FIXPOINT_ITERATIONS;
use masq_core::{IdGenerator, MasqError, NetworkStore, SequenceIds, UuidIds};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Name of the configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "masq.toml";

/// Storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// redb embedded database (ACID, persistent)
    #[default]
    Redb,
    /// In-memory store saved as a binary snapshot after each command
    File,
}

impl Backend {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Backend::Redb => "redb",
            Backend::File => "file",
        }
    }
}

/// How synthetic taxon ids are minted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum IdStrategy {
    /// Random v4 UUIDs
    #[default]
    Uuid,
    /// Reproducible `agglom-<scope>-<n>` ids
    Sequence,
}

/// Settings for one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MasqConfig {
    pub database: PathBuf,
    pub backend: Backend,
    pub weight_sensitive: bool,
    pub id_strategy: IdStrategy,
    pub max_iterations: usize,
}

impl Default for MasqConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("masq.redb"),
            backend: Backend::default(),
            weight_sensitive: true,
            id_strategy: IdStrategy::default(),
            max_iterations: MAX_FIXPOINT_ITERATIONS,
        }
    }
}

impl MasqConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, MasqError> {
        let config: MasqConfig = toml::from_str(content)
            .map_err(|e| MasqError::ConfigError(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, MasqError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MasqError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Load `explicit` if given (it must exist), else `masq.toml` from the
    /// working directory if present, else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, MasqError> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.is_file() {
                    Self::from_file(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn validate(&self) -> Result<(), MasqError> {
        if self.max_iterations == 0 {
            return Err(MasqError::ConfigError(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if self.database.as_os_str().is_empty() {
            return Err(MasqError::ConfigError("database path is empty".to_string()));
        }
        Ok(())
    }

    /// Id generator for one agglomeration run. Sequences resume after the
    /// ids `store` already holds for `scope`.
    pub fn id_generator<S: NetworkStore + ?Sized>(
        &self,
        scope: &str,
        store: &S,
    ) -> Result<Box<dyn IdGenerator>, MasqError> {
        Ok(match self.id_strategy {
            IdStrategy::Uuid => Box::new(UuidIds),
            IdStrategy::Sequence => Box::new(SequenceIds::resume(scope, store)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use masq_core::{MemoryStore, TaxonRecord};

    #[test]
    fn empty_file_yields_defaults() {
        let config = MasqConfig::from_toml_str("").expect("parse");
        assert_eq!(config, MasqConfig::default());
    }

    #[test]
    fn fields_override_defaults() {
        let config = MasqConfig::from_toml_str(
            "backend = \"file\"\nweight_sensitive = false\nid_strategy = \"sequence\"\n",
        )
        .expect("parse");
        assert_eq!(config.backend, Backend::File);
        assert!(!config.weight_sensitive);
        assert_eq!(config.id_strategy, IdStrategy::Sequence);
        assert_eq!(config.database, PathBuf::from("masq.redb"));
    }

    #[test]
    fn unknown_keys_rejected() {
        let result = MasqConfig::from_toml_str("host = \"localhost\"");
        assert!(matches!(result, Err(MasqError::ConfigError(_))));
    }

    #[test]
    fn zero_iterations_rejected() {
        assert!(MasqConfig::from_toml_str("max_iterations = 0").is_err());
    }

    #[test]
    fn sequence_ids_are_scoped() {
        let config = MasqConfig {
            id_strategy: IdStrategy::Sequence,
            ..MasqConfig::default()
        };
        let mut store = MemoryStore::new();
        let mut ids = config.id_generator("genus", &store).expect("ids");
        assert_eq!(ids.next_id().as_str(), "agglom-genus-0");

        store
            .insert_taxon(TaxonRecord::with_lineage("agglom-genus-7", "s", ["Bacteria"]))
            .expect("taxon");
        let mut ids = config.id_generator("genus", &store).expect("ids");
        assert_eq!(ids.next_id().as_str(), "agglom-genus-8");
    }
}
