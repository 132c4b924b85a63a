// Copyright (c) 2026 Ballast Contributors. MIT License.
// See LICENSE for details.

//! # Ballast Treasury Node
//!
//! Entry point for the `ballast-node` binary. Parses CLI arguments,
//! initializes logging and metrics, builds the treasury from its genesis
//! file, starts the keeper and serves the HTTP/WS API.
//!
//! Subcommands:
//!
//! - `run`: start the node
//! - `init`: create a data directory with a genesis file and devnet keys
//! - `sign`: print signed params for a JSON-RPC call
//! - `status`: query a running node's status endpoint
//! - `version`: print build version information

mod api;
mod cli;
mod genesis;
mod keeper;
mod logging;
mod metrics;
mod rpc;

use anyhow::{anyhow, bail, Context, Result};
use ballast_protocol::{Address, SystemClock};
use clap::Parser;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

use cli::{BallastNodeCli, Commands};
use genesis::{DevAccounts, Genesis, GENESIS_FILE, KEYS_DIR};
use logging::LogFormat;
use rpc::{RpcMethod, SignedCall};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = BallastNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Init(args) => init_node(args),
        Commands::Sign(args) => sign_call(args),
        Commands::Status(args) => query_status(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the node: API server, metrics endpoint and keeper.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(logging::DEFAULT_FILTER, args.log_format);

    let genesis_path = args
        .genesis
        .clone()
        .unwrap_or_else(|| args.data_dir.join(GENESIS_FILE));
    let genesis = Genesis::load(&genesis_path)
        .with_context(|| format!("run `ballast-node init -d {}` first", args.data_dir.display()))?;

    tracing::info!(
        network = %genesis.network,
        owner = %genesis.owner,
        attestors = genesis.attestors.len(),
        threshold = genesis.oracle.threshold,
        collateral = genesis.collateral.len(),
        rpc_port = args.rpc_port,
        metrics_port = args.metrics_port,
        "starting ballast-node"
    );

    let state = api::AppState::from_genesis(
        &genesis,
        Arc::new(SystemClock),
        format!(
            "{} (protocol {})",
            env!("CARGO_PKG_VERSION"),
            ballast_protocol::config::PROTOCOL_VERSION,
        ),
    )?;

    if !is_loopback(&args.bind) {
        tracing::warn!(
            bind = %args.bind,
            "API is reachable beyond this host; only signed calls can move funds or change settings"
        );
    }

    // --- API server ---
    let api_router = api::create_router(state.clone());
    let api_addr = format!("{}:{}", args.bind, args.rpc_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind RPC listener on {}", api_addr))?;
    tracing::info!("RPC/API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&state.metrics));
    let metrics_addr = format!("{}:{}", args.bind, args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Keeper ---
    let keeper = tokio::spawn(keeper::run(
        state.clone(),
        Duration::from_secs(args.keeper_interval_secs.max(1)),
    ));

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    keeper.abort();
    tracing::info!("ballast-node stopped");
    Ok(())
}

/// Creates the data directory and writes a genesis file.
fn init_node(args: cli::InitArgs) -> Result<()> {
    logging::init_logging("ballast_node=info", LogFormat::Pretty);

    let genesis_path = args.data_dir.join(GENESIS_FILE);
    let genesis = write_genesis(&args)?;

    tracing::info!(
        path = %genesis_path.display(),
        network = %genesis.network,
        "genesis written"
    );
    println!("Node initialized successfully.");
    println!("  Data directory : {}", args.data_dir.display());
    println!("  Network        : {}", genesis.network);
    println!("  Owner          : {}", genesis.owner);
    println!("  Attestors      : {} (threshold {})", genesis.attestors.len(), genesis.oracle.threshold);
    println!("  Genesis        : {}", genesis_path.display());
    println!("  Keys           : {}", args.data_dir.join(KEYS_DIR).display());
    Ok(())
}

/// Builds the genesis `init` describes and writes it, refusing to clobber
/// an existing file unless `--force`.
fn write_genesis(args: &cli::InitArgs) -> Result<Genesis> {
    let genesis_path = args.data_dir.join(GENESIS_FILE);
    if genesis_path.exists() && !args.force {
        bail!(
            "{} already exists; pass --force to overwrite",
            genesis_path.display()
        );
    }

    let accounts = DevAccounts::generate();
    let mut genesis = Genesis::devnet(&accounts);
    genesis.network = args.network.clone();
    let mut keys = vec![("alice", &accounts.alice), ("bob", &accounts.bob)];
    match &args.owner {
        Some(owner) => genesis.owner = Address::from(owner.as_str()),
        None => keys.push(("owner", &accounts.owner)),
    }
    if args.attestors.is_empty() {
        keys.push(("auditor", &accounts.auditor));
    } else {
        genesis.attestors = args.attestors.iter().map(|a| Address::from(a.as_str())).collect();
    }
    if let Some(threshold) = args.threshold {
        genesis.oracle.threshold = threshold;
    }
    // Catch parameter mistakes now rather than at the first `run`.
    genesis
        .build(Arc::new(SystemClock))
        .context("genesis parameters are inconsistent")?;

    std::fs::create_dir_all(&args.data_dir)
        .with_context(|| format!("failed to create data directory: {}", args.data_dir.display()))?;
    genesis.write(&genesis_path)?;

    let keys_dir = args.data_dir.join(KEYS_DIR);
    for (name, keypair) in keys {
        genesis::write_key(&keys_dir, name, keypair)?;
        tracing::info!(account = name, address = %keypair.address(), "devnet key written");
    }
    Ok(genesis)
}

/// Signs one call with a key file and prints the `params` object to send.
fn sign_call(args: cli::SignArgs) -> Result<()> {
    let method = RpcMethod::parse(&args.method)
        .ok_or_else(|| anyhow!("unknown method {}", args.method))?;
    if !method.is_signed() {
        bail!("{} takes plain params, not a signed envelope", args.method);
    }
    let keypair = genesis::read_key(&args.key)?;
    let call_args: serde_json::Value =
        serde_json::from_str(&args.args).context("--args must be a JSON object")?;
    if !call_args.is_object() {
        bail!("--args must be a JSON object");
    }
    let call = SignedCall::sign(&keypair, &args.method, args.nonce, call_args)
        .map_err(|e| anyhow!(e.message))?;
    println!("{}", serde_json::to_string_pretty(&call)?);
    Ok(())
}

/// Whether `bind` names a loopback interface.
fn is_loopback(bind: &str) -> bool {
    bind == "localhost" || bind.parse::<IpAddr>().map(|ip| ip.is_loopback()).unwrap_or(false)
}

/// Queries a running node's status endpoint and prints the result.
async fn query_status(args: cli::StatusArgs) -> Result<()> {
    let body = http_get(&format!("{}/status", args.rpc_url.trim_end_matches('/'))).await?;
    println!("{}", body);
    Ok(())
}

/// Plain HTTP/1.1 GET over a tokio TCP stream. Enough for `status`.
async fn http_get(url: &str) -> Result<String> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let rest = url
        .strip_prefix("http://")
        .ok_or_else(|| anyhow::anyhow!("only http:// URLs are supported: {}", url))?;
    let (authority, path) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, "/"),
    };
    let host = authority.split(':').next().unwrap_or(authority);
    let addr = if authority.contains(':') {
        authority.to_string()
    } else {
        format!("{}:80", authority)
    };

    let mut stream = tokio::net::TcpStream::connect(&addr)
        .await
        .with_context(|| format!("failed to connect to {}", addr))?;
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        path, host,
    );
    stream.write_all(request.as_bytes()).await?;
    stream.shutdown().await?;

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    let response = String::from_utf8_lossy(&buf);
    Ok(response
        .split_once("\r\n\r\n")
        .map(|(_, b)| b.to_string())
        .unwrap_or_else(|| response.to_string()))
}

/// Prints version information to stdout.
fn print_version() {
    println!("ballast-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol     {}", ballast_protocol::config::PROTOCOL_VERSION);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
