//! # CLI Interface
//!
//! `clap` derive definitions for `ballast-node`: `run`, `init`, `sign`,
//! `status` and `version`. Every `run` flag can also come from a
//! `BALLAST_*` environment variable.

use ballast_protocol::config::{
    DEFAULT_BIND_HOST, DEFAULT_METRICS_PORT, DEFAULT_RPC_PORT, KEEPER_INTERVAL,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::logging::LogFormat;

/// Ballast treasury node.
///
/// Hosts the share ledger, NAV oracle and treasury vault behind a
/// JSON-RPC/REST/WebSocket API, runs the background keeper and exposes
/// Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "ballast-node",
    about = "Ballast treasury node",
    version,
    propagate_version = true
)]
pub struct BallastNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    Run(RunArgs),
    /// Create a data directory with a genesis file and devnet keys.
    Init(InitArgs),
    /// Print signed JSON-RPC params for a call.
    Sign(SignArgs),
    /// Print the status of a running node.
    Status(StatusArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Data directory holding `genesis.json`.
    #[arg(long, short = 'd', env = "BALLAST_DATA_DIR", default_value = ".ballast")]
    pub data_dir: PathBuf,

    /// Genesis file to use instead of `<data-dir>/genesis.json`.
    #[arg(long, short = 'g', env = "BALLAST_GENESIS")]
    pub genesis: Option<PathBuf>,

    /// Interface to bind both listeners on. Loopback unless set; binding
    /// a public interface is an explicit choice.
    #[arg(long, env = "BALLAST_BIND", default_value = DEFAULT_BIND_HOST)]
    pub bind: String,

    /// Port for the JSON-RPC, REST and WebSocket API.
    #[arg(long, env = "BALLAST_RPC_PORT", default_value_t = DEFAULT_RPC_PORT)]
    pub rpc_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "BALLAST_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Seconds between keeper passes.
    #[arg(long, env = "BALLAST_KEEPER_INTERVAL", default_value_t = KEEPER_INTERVAL.as_secs())]
    pub keeper_interval_secs: u64,

    /// Log output format.
    #[arg(long, env = "BALLAST_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Data directory to create.
    #[arg(long, short = 'd', env = "BALLAST_DATA_DIR", default_value = ".ballast")]
    pub data_dir: PathBuf,

    /// Network label.
    #[arg(long, default_value = "devnet")]
    pub network: String,

    /// Owner address (hex public key). Defaults to a freshly generated
    /// devnet owner whose key is written under `<data-dir>/keys`.
    #[arg(long)]
    pub owner: Option<String>,

    /// Attestor address (hex public key). Repeat for several; replaces the
    /// generated devnet attestor.
    #[arg(long = "attestor")]
    pub attestors: Vec<String>,

    /// Signatures needed to finalize a NAV report.
    #[arg(long)]
    pub threshold: Option<usize>,

    /// Overwrite an existing genesis file.
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the `sign` subcommand.
#[derive(Parser, Debug)]
pub struct SignArgs {
    /// File holding the signer's hex secret key.
    #[arg(long, short = 'k', env = "BALLAST_KEY_FILE")]
    pub key: PathBuf,

    /// Method name, e.g. `ballast_deposit`.
    #[arg(long, short = 'm')]
    pub method: String,

    /// Nonce; must exceed the last one the node accepted from this key.
    #[arg(long, short = 'n')]
    pub nonce: u64,

    /// Method arguments as a JSON object.
    #[arg(long, short = 'a', default_value = "{}")]
    pub args: String,
}

/// Arguments for the `status` subcommand.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Base URL of the running node.
    #[arg(long, default_value = "http://127.0.0.1:9841")]
    pub rpc_url: String,
}
