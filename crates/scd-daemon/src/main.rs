//! scd-daemon entry point.
//!
//! This file is intentionally thin: it sets up tracing, loads config,
//! connects Postgres and the vendor API, spawns the per-machine sync
//! loops, and starts the HTTP server.  All route handlers live in
//! `routes.rs`; all shared state types live in `state.rs`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use axum::http::{HeaderValue, Method};
use scd_config::SyncSettings;
use scd_daemon::{routes, state};
use scd_sync::{StockStore, SyncLoopConfig};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env.local if present (dev convenience).
    // Silent if the file does not exist — production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let settings = load_settings()?;

    let pool = scd_db::connect_from_env().await?;
    scd_db::migrate(&pool).await?;
    let store = Arc::new(scd_db::PgStore::new(pool));

    let ledger = Arc::new(
        scd_vendor::HttpVendorClient::from_settings(&settings)
            .context("vendor client setup failed")?,
    );

    let loop_config = SyncLoopConfig {
        period: Duration::from_secs(settings.poll_interval_secs),
        temp_max_c: settings.temp_max_c,
    };
    let shared = Arc::new(state::AppState::new(store, ledger, loop_config));

    state::spawn_heartbeat(shared.bus.clone(), Duration::from_secs(1));
    state::spawn_event_forwarder(shared.events.clone(), shared.bus.clone());

    // One periodic loop per active registered machine.
    let machines = shared.store.list_machines().await?;
    for m in machines.iter().filter(|m| m.active) {
        shared.start_loop(&m.machine_id).await;
    }
    info!(
        active = machines.iter().filter(|m| m.active).count(),
        total = machines.len(),
        "sync loops started"
    );

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = bind_addr(&settings).unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8787)));
    info!("scd-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .await
        .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// Layered YAML config from SCD_CONFIG (comma-separated paths), defaults
/// when unset. The merged config's hash goes to the log so an operator
/// can tell exactly which configuration a process runs under.
fn load_settings() -> Result<SyncSettings> {
    let Ok(paths_raw) = std::env::var("SCD_CONFIG") else {
        warn!("SCD_CONFIG not set; using default settings");
        return Ok(SyncSettings::default());
    };
    let paths: Vec<&str> = paths_raw.split(',').map(str::trim).collect();
    let loaded = scd_config::load_layered_yaml(&paths)?;
    info!(config_hash = %loaded.config_hash, "config loaded");
    Ok(SyncSettings::from_config(&loaded.config_json))
}

fn bind_addr(settings: &SyncSettings) -> Option<SocketAddr> {
    if let Ok(addr) = std::env::var("SCD_DAEMON_ADDR") {
        return addr.parse().ok();
    }
    settings.bind_addr.as_ref()?.parse().ok()
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
