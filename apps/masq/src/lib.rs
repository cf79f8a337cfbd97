//! # masq
//!
//! Command-line front end for `masq-core`: configuration loading, store
//! selection and the subcommands. `main.rs` only sets up logging and
//! dispatches here, so the commands are testable as a library.

pub mod cli;
pub mod config;
