/**
 * LASER CONSOLE - Point d'entrée de la console opérateur
 *
 * RÔLE : Orchestration des modules : config, client device-server, session, HTTP.
 * Bootstrap complet avec logging et arrêt sûr des lasers à la sortie.
 *
 * ARCHITECTURE : stream WebSocket -> registry miroir -> API REST opérateur -> commandes HTTP.
 */

mod api;
mod config;
mod http;
mod ws;

use crate::api::HttpDeviceApi;
use crate::config::load_config;
use crate::http::AppState;
use crate::ws::WsConnector;

use anyhow::{Context, Result};
use laser_core::Session;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("laser_console=info,laser_core=info")),
        )
        .init();

    info!("[console] Laser console starting...");
    let cfg = load_config().await;

    // transports du device-server
    let api = Arc::new(HttpDeviceApi::new(&cfg.server.base_url).context("Failed to build HTTP client")?);
    let connector = Arc::new(WsConnector::new(&cfg.server.stream_url));

    let mut session = Session::new(api, connector, &cfg.session);
    if let Err(e) = session.start().await {
        // l'opérateur peut relancer via POST /session/start
        error!("[console] {}", e);
    }

    let api_key = std::env::var("LASER_CONSOLE_API_KEY").ok().filter(|k| !k.is_empty());
    if api_key.is_none() {
        warn!("[console] LASER_CONSOLE_API_KEY not set, only /health will answer");
    }
    let app_state = AppState::new(session, api_key);
    let session = app_state.session.clone();

    // HTTP
    let app = http::build_router(app_state);
    let listener = TcpListener::bind(&cfg.http.bind)
        .await
        .with_context(|| format!("Failed to bind {}", cfg.http.bind))?;
    info!("[console] listening on http://{}", cfg.http.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    // arrêt sûr : power 0 + disable sur chaque laser
    let outcomes = session.lock().await.stop().await;
    let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
    info!("[console] shutdown complete ({} commands, {} failed)", outcomes.len(), failed);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("[console] failed to listen for ctrl-c: {}", e);
    }
    info!("[console] shutdown requested");
}
