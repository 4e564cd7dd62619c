// src/main.rs
use anyhow::{Context, Result};
use clap::Parser;
use std::{fs, net::SocketAddr, path::PathBuf, sync::Arc};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod aggregation;
mod api;
mod compensation;
mod kpi;
mod model;
mod money;
mod periods;
mod store;

#[cfg(test)]
mod kpi_tests;

use api::AppState;
use kpi::KpiService;
use periods::PayrollService;
use store::{FleetStore, SeedData};

/// Payroll computation and KPI aggregation service.
#[derive(Debug, Parser)]
#[command(name = "fleetpay-core")]
struct Args {
    /// Address to bind the HTTP server to.
    #[arg(long, env = "FLEETPAY_BIND", default_value = "127.0.0.1:3000")]
    bind: SocketAddr,
    /// Optional JSON fixture with reference data (drivers, vehicles,
    /// attendance, ...) loaded at startup in place of the platform database.
    #[arg(long, env = "FLEETPAY_SEED")]
    seed: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    info!("Tracing subscriber initialized.");

    let args = Args::parse();

    let store = Arc::new(FleetStore::new());
    if let Some(seed_path) = &args.seed {
        let raw = fs::read_to_string(seed_path)
            .with_context(|| format!("Reading seed file {}", seed_path.display()))?;
        let seed: SeedData = serde_json::from_str(&raw)
            .with_context(|| format!("Parsing seed file {}", seed_path.display()))?;
        store.load_seed(seed);
    }

    let state = AppState {
        payroll: Arc::new(PayrollService::new(store.clone())),
        kpi: Arc::new(KpiService::new(store)),
    };
    let app = api::router(state);

    info!("Starting server on http://{}", args.bind);
    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("Binding {}", args.bind))?;
    axum::serve(listener, app)
        .await
        .context("HTTP server failed")?;

    Ok(())
}
