//! Command line interface
//!
//! - `serve`: run the HTTP API
//! - `validate <path>`: check a chain definition file without starting the server

pub mod serve;
pub mod validate;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// PMP Chain Engine - multi-step workflow chains with pause, retry, branching and rollback
#[derive(Parser)]
#[command(name = "pmp-chain-engine")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP API server
    Serve,

    /// Validate a JSON chain definition
    Validate {
        /// Path to the chain definition file
        path: PathBuf,
    },
}
