//! # masq CLI Module
//!
//! ## Available Commands
//!
//! - `init` - Initialize a new database
//! - `ingest` - Import taxa and networks from a JSON dataset
//! - `networks` - List stored networks
//! - `agglomerate` - Build taxonomically agglomerated networks
//! - `sets` - Intersection, union or difference of networks
//! - `export` - Write one network as GraphML

mod commands;

use crate::config::{Backend, IdStrategy, MasqConfig};
use clap::{Parser, Subcommand};
use masq_core::{Level, MasqError, SetOperation};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// masq - microbial association network agglomeration and comparison
#[derive(Parser, Debug)]
#[command(name = "masq")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging (ignored when RUST_LOG is set)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (defaults to ./masq.toml when present)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the database, overrides the configuration file
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Storage backend, overrides the configuration file
    #[arg(short = 'B', long, global = true, value_enum)]
    pub backend: Option<Backend>,

    /// Synthetic taxon id strategy, overrides the configuration file
    #[arg(long, global = true, value_enum)]
    pub id_strategy: Option<IdStrategy>,

    /// Output in JSON format (for programmatic access)
    #[arg(long = "json", global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new database
    Init {
        /// Overwrite an existing database
        #[arg(short, long)]
        force: bool,
    },

    /// Import taxa and networks from a JSON dataset
    Ingest {
        /// Dataset file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// List stored networks with their cached counts
    Networks,

    /// Agglomerate networks up to a taxonomic level
    Agglomerate {
        /// Target level (kingdom, phylum, class, order, family, genus, species)
        #[arg(short, long)]
        level: Level,

        /// Networks to agglomerate (default: all)
        networks: Vec<String>,

        /// Separate edges by weight sign (true/false), overrides the configuration file
        #[arg(long)]
        weight_sensitive: Option<bool>,
    },

    /// Combine networks with a set operation and write the result as GraphML
    Sets {
        /// Operation: intersection, union or difference
        operation: SetOperation,

        /// Networks to combine (default: all)
        networks: Vec<String>,

        /// Intersection threshold: a count ("3") or a fraction of the networks ("0.5")
        #[arg(short, long)]
        size: Option<String>,

        /// Separate edges by weight sign (true/false), overrides the configuration file
        #[arg(long)]
        weight_sensitive: Option<bool>,

        /// Directory the `<operation>.graphml` file is written to
        #[arg(short = 'o', long, default_value = ".")]
        output_dir: PathBuf,
    },

    /// Export one network as GraphML
    Export {
        /// Network id
        network: String,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },
}

impl Cli {
    /// Load the configuration and apply the global flag overrides.
    pub fn resolve_config(&self) -> Result<MasqConfig, MasqError> {
        let mut config = MasqConfig::load(self.config.as_deref())?;
        if let Some(database) = &self.database {
            config.database = database.clone();
        }
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if let Some(strategy) = self.id_strategy {
            config.id_strategy = strategy;
        }
        config.validate()?;
        Ok(config)
    }
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI command.
pub fn execute(cli: Cli) -> Result<(), MasqError> {
    let config = cli.resolve_config()?;
    let json_mode = cli.json_mode;

    match cli.command {
        Commands::Init { force } => cmd_init(&config, force),
        Commands::Ingest { file } => cmd_ingest(&config, json_mode, &file),
        Commands::Networks => cmd_networks(&config, json_mode),
        Commands::Agglomerate {
            level,
            networks,
            weight_sensitive,
        } => {
            let config = MasqConfig {
                weight_sensitive: weight_sensitive.unwrap_or(config.weight_sensitive),
                ..config
            };
            cmd_agglomerate(&config, json_mode, level, &networks)
        }
        Commands::Sets {
            operation,
            networks,
            size,
            weight_sensitive,
            output_dir,
        } => {
            let config = MasqConfig {
                weight_sensitive: weight_sensitive.unwrap_or(config.weight_sensitive),
                ..config
            };
            let min = parse_min_count(size.as_deref())?;
            cmd_sets(&config, json_mode, operation, &networks, min, &output_dir)
        }
        Commands::Export { network, output } => cmd_export(&config, &network, &output),
    }
}
