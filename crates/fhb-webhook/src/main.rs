//! fhb-webhook entry point.
//!
//! This file is intentionally thin: it sets up tracing, loads config and
//! secrets, builds the shared state, wires middleware, and starts the HTTP
//! server.  All route handlers live in `routes.rs`; all shared state types
//! live in `state.rs`.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use fhb_config::secrets::{resolve_secrets, SecretsMode};
use fhb_log::ExchangeLog;
use fhb_webhook::{routes, state};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env.local if present (dev convenience). Silent if the file does
    // not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let config_path = std::env::var("FHB_CONFIG").unwrap_or_else(|_| "fhb.yaml".to_string());
    let loaded = fhb_config::load_layered_yaml(&[config_path.as_str()])
        .with_context(|| format!("load config {config_path}"))?;
    info!(config_hash = %loaded.config_hash, "config loaded");

    // Inbound verification only needs the shared secret.
    let secrets = resolve_secrets(&loaded.config_json, SecretsMode::WebhookOnly)?;

    let log_path =
        std::env::var("FHB_LOG_PATH").unwrap_or_else(|_| "logs/exchanges.jsonl".to_string());
    let log = ExchangeLog::new(&log_path)?;

    let shared = Arc::new(state::AppState::new(secrets, log));

    let app = routes::build_router(Arc::clone(&shared)).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    let addr = bind_addr_from_env().unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8787)));
    info!("fhb-webhook listening on http://{}", addr);

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

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var("FHB_WEBHOOK_ADDR").ok()?.parse().ok()
}
