//! pi-server – entry point.
//!
//! Startup order:
//! 1. Parse configuration from environment variables.
//! 2. Initialise structured tracing (JSON or pretty).
//! 3. Load persistent settings and the tool-execution sandbox roots.
//! 4. Wire the generator façade and shared state.
//! 5. Start the server controller and wait for ctrl-c.

mod config;
mod controller;
mod error;
mod http;
mod routes;
mod schemas;
mod state;


use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use pi_core::generator::UnavailableGenerator;
use pi_core::settings::SettingsStore;
use pi_core::tools::FsToolExecutor;
use pi_core::GeneratorFacade;

use crate::config::Config;
use crate::controller::{ServerController, ServerStatus};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Configuration ───────────────────────────────────────────────────────
    let cfg = Arc::new(Config::from_env());

    // ── 2. Tracing ─────────────────────────────────────────────────────────────
    let subscriber = tracing_subscriber::fmt().with_env_filter(
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| cfg.log_level.parse().unwrap_or_default()),
    );
    if cfg.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!(version = env!("CARGO_PKG_VERSION"), "pi-gateway starting");

    // ── 3. Settings & tool sandbox ─────────────────────────────────────────────
    let settings = SettingsStore::open_default().load();
    let executor = Arc::new(FsToolExecutor::from_env());
    info!(workspace_root = %executor.workspace_root().display(), "tool sandbox ready");

    // ── 4. Shared state ────────────────────────────────────────────────────────
    // The on-device model bridge registers itself as a `Generator`; without
    // one the façade serves the local-fallback string for every request.
    let facade = GeneratorFacade::new(Arc::new(UnavailableGenerator::new(
        "no on-device model bridge registered",
    )));
    let status = Arc::new(ServerStatus::new(cfg.port));
    let state = Arc::new(AppState {
        config: Arc::clone(&cfg),
        settings,
        facade,
        executor,
        started_at: Utc::now(),
        status,
    });

    // ── 5. Server ──────────────────────────────────────────────────────────────
    let mut server = ServerController::new(Arc::clone(&state), cfg.host.clone(), cfg.port);
    server.start().await;

    let status = server.status();
    if !status.running() {
        anyhow::bail!(
            "gateway failed to start: {}",
            status.last_error().unwrap_or_else(|| "unknown error".into())
        );
    }

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    server.stop().await;
    Ok(())
}
