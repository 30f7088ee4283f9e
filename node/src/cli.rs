//! # CLI Interface
//!
//! Defines the command-line argument structure for `offtake-node` using
//! `clap` derive. Supports four subcommands: `run`, `init`, `inspect`,
//! and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use offtake_protocol::config::{DEFAULT_API_PORT, DEFAULT_DATA_DIR, DEFAULT_METRICS_PORT};

use crate::logging::LogFormat;

/// Offtake node.
///
/// Hosts a project registry with its tokens and redemption vaults, persists
/// them to a local sled database, serves the discovery API and the JSON-RPC
/// operation gateway, and exposes Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "offtake-node",
    about = "Offtake project registry and redemption node",
    version,
    propagate_version = true
)]
pub struct OfftakeNodeCli {
    /// Log output format.
    #[arg(
        long,
        global = true,
        value_enum,
        env = "OFFTAKE_LOG_FORMAT",
        default_value_t = LogFormat::Pretty
    )]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the offtake node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node and serve the API.
    Run(RunArgs),
    /// Initialize a data directory with an empty registry and its
    /// administrator.
    Init(InitArgs),
    /// List the projects persisted in a data directory without starting
    /// the node.
    Inspect(InspectArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the node data directory holding the registry database.
    ///
    /// Created on first run if it does not exist.
    #[arg(long, short = 'd', env = "OFFTAKE_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    /// Port for the REST and JSON-RPC API.
    #[arg(long, env = "OFFTAKE_API_PORT", default_value_t = DEFAULT_API_PORT)]
    pub api_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "OFFTAKE_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Registry administrator, used only when the data directory holds no
    /// registry yet. Ignored for an initialized directory.
    #[arg(long, env = "OFFTAKE_ADMIN")]
    pub admin: Option<String>,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Path to the data directory to initialize.
    #[arg(long, short = 'd', env = "OFFTAKE_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    /// Registry administrator address.
    #[arg(long, env = "OFFTAKE_ADMIN")]
    pub admin: String,
}

/// Arguments for the `inspect` subcommand.
#[derive(Parser, Debug)]
pub struct InspectArgs {
    /// Path to the data directory to read.
    #[arg(long, short = 'd', env = "OFFTAKE_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    /// Only list projects in this status (pending, approved, denied).
    #[arg(long)]
    pub status: Option<String>,
}
