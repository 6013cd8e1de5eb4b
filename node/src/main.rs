// Copyright (c) 2026 Curio Marketplace. MIT License.
// See LICENSE for details.

//! # Curio Ledger Service
//!
//! Entry point for the `curio-node` binary. Parses CLI arguments,
//! initializes logging and metrics, opens the credit ledger, and serves
//! the REST API alongside a Prometheus metrics endpoint.
//!
//! The binary supports three subcommands:
//!
//! - `run`     — start the ledger service
//! - `init`    — initialize the data directory and create the store
//! - `version` — print build version information

mod api;
mod cli;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;

use curio_ledger::Ledger;

use cli::{Commands, CurioNodeCli};
use logging::LogFormat;
use metrics::LedgerMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = CurioNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Init(args) => init_node(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the full ledger service: REST API plus metrics endpoint.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(
        "curio_node=info,curio_ledger=info,tower_http=debug",
        LogFormat::from_str_lossy(&args.log_format),
    );

    tracing::info!(
        api_port = args.api_port,
        metrics_port = args.metrics_port,
        data_dir = %args.data_dir.display(),
        "starting curio-node"
    );

    // --- Persistent storage ---
    let ledger_path = args.data_dir.join("ledger");
    std::fs::create_dir_all(&ledger_path).with_context(|| {
        format!(
            "failed to create ledger directory: {}",
            ledger_path.display()
        )
    })?;

    let ledger = Arc::new(
        Ledger::open(&ledger_path)
            .with_context(|| format!("failed to open ledger at {}", ledger_path.display()))?,
    );
    tracing::info!(
        path = %ledger_path.display(),
        accounts = ledger.store().account_count(),
        "ledger opened"
    );

    // --- Metrics ---
    let ledger_metrics = Arc::new(LedgerMetrics::new());

    // --- Application state ---
    let app_state = api::AppState {
        version: env!("CARGO_PKG_VERSION").to_string(),
        ledger: Arc::clone(&ledger),
        metrics: Arc::clone(&ledger_metrics),
    };

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
        .with_state(Arc::clone(&ledger_metrics));
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
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    // Flush outstanding sled writes before exiting.
    if let Err(e) = ledger.store().flush() {
        tracing::error!("failed to flush ledger on shutdown: {}", e);
    }
    tracing::info!("curio-node stopped");
    Ok(())
}

/// Initializes the data directory and creates an empty ledger store.
fn init_node(args: cli::InitArgs) -> Result<()> {
    logging::init_logging("curio_node=info", LogFormat::Pretty);

    let data_dir = &args.data_dir;
    tracing::info!(data_dir = %data_dir.display(), "initializing ledger");

    let ledger_path = data_dir.join("ledger");
    std::fs::create_dir_all(&ledger_path).with_context(|| {
        format!(
            "failed to create ledger directory: {}",
            ledger_path.display()
        )
    })?;

    let ledger = Ledger::open(&ledger_path)
        .with_context(|| format!("failed to create ledger at {}", ledger_path.display()))?;
    ledger
        .store()
        .flush()
        .context("failed to flush new ledger store")?;

    println!("Ledger initialized successfully.");
    println!("  Data directory : {}", data_dir.display());
    println!("  Ledger store   : {}", ledger_path.display());
    println!("  Accounts       : {}", ledger.store().account_count());

    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("curio-node {}", env!("CARGO_PKG_VERSION"));
    println!("rustc      {}", rustc_version());
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
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
