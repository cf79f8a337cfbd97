//! # masq
//!
//! Agglomerate microbial co-occurrence networks by taxonomy and compare them
//! with set operations.
//!
//! ## Usage
//!
//! ```bash
//! masq init
//! masq ingest -f dataset.json
//! masq agglomerate --level genus
//! masq sets --operation intersection --size 0.5 -o results/
//! masq export Genus_n1 -o genus_n1.graphml
//! ```

use clap::Parser;
use masq::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    let cli = cli::Cli::parse();

    // MASQ_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("MASQ_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let default_filter = if cli.verbose {
        "masq=debug,masq_core=debug"
    } else {
        "masq=info,masq_core=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    // Logs go to stderr so stdout stays clean for --json-mode output.
    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}
