//! Shared runtime state for fhb-webhook.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum; this module owns
//! nothing async itself.

use std::sync::Arc;

use fhb_config::secrets::ResolvedSecrets;
use fhb_log::ExchangeLog;
use fhb_signature::MemoryStore;
use tokio::sync::RwLock;

/// Static build metadata included in the health response.
#[derive(Clone, Debug)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

/// Cloneable (Arc) handle shared across all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Static build metadata.
    pub build: BuildInfo,
    /// Signature records keyed by sales document id.
    pub store: Arc<RwLock<MemoryStore>>,
    /// Shared secret used to verify inbound `X-Api-Signature` headers.
    pub secrets: ResolvedSecrets,
    /// Append-only log of every delivery, valid or not.
    pub log: Arc<ExchangeLog>,
}

impl AppState {
    pub fn new(secrets: ResolvedSecrets, log: ExchangeLog) -> Self {
        Self {
            build: BuildInfo {
                service: "fhb-webhook",
                version: env!("CARGO_PKG_VERSION"),
            },
            store: Arc::new(RwLock::new(MemoryStore::new())),
            secrets,
            log: Arc::new(log),
        }
    }
}
