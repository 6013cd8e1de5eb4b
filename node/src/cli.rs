//! # CLI Interface
//!
//! Defines the command-line argument structure for `curio-node` using
//! `clap` derive. Supports three subcommands: `run`, `init`, and
//! `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Curio credit ledger service.
///
/// Serves the marketplace's credit economy over HTTP: account creation,
/// balances, purchase callbacks, and every credit-priced feature spend,
/// with Prometheus metrics on a separate port.
#[derive(Parser, Debug)]
#[command(
    name = "curio-node",
    about = "Curio marketplace credit ledger service",
    version,
    propagate_version = true
)]
pub struct CurioNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the curio-node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the ledger service.
    Run(RunArgs),
    /// Initialize a new data directory and create the ledger store.
    Init(InitArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the data directory where the ledger store lives.
    ///
    /// Created on first run if it does not exist.
    #[arg(long, short = 'd', env = "CURIO_DATA_DIR", default_value = "./curio-data")]
    pub data_dir: PathBuf,

    /// Port for the REST API.
    #[arg(long, env = "CURIO_API_PORT", default_value_t = 8780)]
    pub api_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "CURIO_METRICS_PORT", default_value_t = 8781)]
    pub metrics_port: u16,

    /// Log output format: "pretty" or "json".
    #[arg(long, env = "CURIO_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Path to the data directory to initialize.
    #[arg(long, short = 'd', env = "CURIO_DATA_DIR", default_value = "./curio-data")]
    pub data_dir: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        // Ensures the derive macros produce a valid CLI definition.
        CurioNodeCli::command().debug_assert();
    }
}
