// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Offtake Node
//!
//! Entry point for the `offtake-node` binary. Parses CLI arguments,
//! initializes logging and metrics, loads the persisted registry, and serves
//! the HTTP API.
//!
//! The binary supports four subcommands:
//!
//! - `run`    : serve the discovery API, the JSON-RPC gateway and metrics
//! - `init`   : create a data directory holding an empty registry
//! - `inspect`: list the projects persisted in a data directory
//! - `version`: print build version information

mod api;
mod cli;
mod deployment;
mod logging;
mod metrics;
mod rpc;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;

use offtake_contracts::{ProjectStatus, RegistryStore};
use offtake_protocol::identity::Address;
use offtake_protocol::ledger::SettlementAsset;
use offtake_protocol::math::format_units;
use offtake_protocol::storage::OfftakeDB;

use cli::{Commands, OfftakeNodeCli};
use deployment::Deployment;
use logging::LogFormat;
use metrics::NodeMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = OfftakeNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args, cli.log_format).await,
        Commands::Init(args) => init_node(args, cli.log_format),
        Commands::Inspect(args) => inspect(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Opens (creating if needed) the registry database under `data_dir`.
fn open_store(data_dir: &Path) -> Result<RegistryStore> {
    let db_path = data_dir.join("db");
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create database directory: {}", db_path.display()))?;
    let db = OfftakeDB::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    tracing::info!(path = %db_path.display(), "database opened");
    Ok(RegistryStore::new(db))
}

/// Starts the node: API server and metrics endpoint.
async fn run_node(args: cli::RunArgs, log_format: LogFormat) -> Result<()> {
    logging::init_logging(logging::DEFAULT_FILTER, log_format);

    tracing::info!(
        api_port = args.api_port,
        metrics_port = args.metrics_port,
        data_dir = %args.data_dir.display(),
        "starting offtake-node"
    );

    // --- Registry ---
    let store = open_store(&args.data_dir)?;
    let deployment = match Deployment::load(store.clone()).context("failed to load registry")? {
        Some(deployment) => {
            if args.admin.is_some() {
                tracing::warn!("registry already initialized, ignoring --admin");
            }
            deployment
        }
        None => {
            let admin = args
                .admin
                .context("no registry in the data directory: pass --admin or run `offtake-node init`")?;
            let admin = Address::new(admin).context("invalid --admin")?;
            Deployment::initialize(store, admin).context("failed to initialize registry")?
        }
    };
    tracing::info!(
        admin = %deployment.registry().admin(),
        projects = deployment.registry().project_count(),
        "registry ready"
    );

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);

    // --- Application state ---
    let app_state = api::AppState::new(
        format!(
            "{} (protocol {})",
            env!("CARGO_PKG_VERSION"),
            offtake_protocol::config::PROTOCOL_VERSION,
        ),
        deployment,
        Arc::clone(&node_metrics),
    );

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.api_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

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
            tracing::info!("shutdown signal received");
        }
    }

    tracing::info!("offtake-node stopped");
    Ok(())
}

/// Creates the data directory and an empty registry administered by
/// `--admin`. Refuses to touch an already initialized directory.
fn init_node(args: cli::InitArgs, log_format: LogFormat) -> Result<()> {
    logging::init_logging("offtake_node=info,offtake_contracts=info", log_format);

    let admin = Address::new(args.admin).context("invalid --admin")?;
    let data_dir = &args.data_dir;
    tracing::info!(data_dir = %data_dir.display(), admin = %admin, "initializing node");

    let store = open_store(data_dir)?;
    if store.is_initialized().context("failed to read registry header")? {
        anyhow::bail!("{} already holds a registry", data_dir.display());
    }
    let deployment = Deployment::initialize(store, admin).context("failed to initialize registry")?;

    println!("Node initialized successfully.");
    println!("  Data directory : {}", data_dir.display());
    println!("  Administrator  : {}", deployment.registry().admin());

    Ok(())
}

/// Prints the persisted projects of a data directory. Read-only.
fn inspect(args: cli::InspectArgs) -> Result<()> {
    let filter = args
        .status
        .as_deref()
        .map(str::parse::<ProjectStatus>)
        .transpose()
        .map_err(anyhow::Error::msg)?;

    if !args.data_dir.join("db").exists() {
        anyhow::bail!("{} holds no registry database", args.data_dir.display());
    }
    let store = open_store(&args.data_dir)?;
    let deployment = Deployment::load(store)
        .context("failed to load registry")?
        .with_context(|| format!("{} holds no registry", args.data_dir.display()))?;
    let registry = deployment.registry();

    println!("Administrator: {}", registry.admin());
    println!("Projects:      {}", registry.project_count());
    for project in registry
        .projects()
        .filter(|p| filter.map_or(true, |s| p.status == s))
    {
        println!();
        println!("#{} {} ({}) [{}]", project.id, project.name, project.symbol, project.status);
        println!("  developer : {}", project.developer);
        if let Ok(token) = registry.token(project.id) {
            println!(
                "  token     : {} supply {}{}",
                token.address(),
                format_units(token.total_supply(), token.decimals()),
                if token.is_paused() { " [paused]" } else { "" },
            );
        }
        if let Ok(vault) = registry.vault(project.id) {
            println!(
                "  vault     : {} {} rate {} redeemed {} in {} swaps{}",
                vault.address(),
                vault.status(),
                vault.rate(),
                vault.total_redeemed(),
                vault.swap_count(),
                if vault.is_paused() { " [paused]" } else { "" },
            );
        }
    }
    for ledger in deployment.settlements() {
        println!();
        println!(
            "Settlement {} {} issued by {}, supply {}",
            ledger.symbol(),
            ledger.address(),
            ledger.issuer(),
            ledger.total_supply(),
        );
    }
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("offtake-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol     {}", offtake_protocol::config::PROTOCOL_VERSION);
    println!("rustc        {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
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
