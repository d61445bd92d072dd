//! Axum router and all HTTP handlers for fhb-webhook.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers.  All handlers are `pub(crate)` so the scenario tests in
//! `tests/` can compose the router directly.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use fhb_client::verify_signature;
use fhb_log::{ExchangeEntry, ExchangeStatus};
use fhb_schemas::SignatureCallback;
use fhb_signature::{apply_status_update, SignatureStore};
use tracing::{info, warn};

use crate::{
    api_types::{CaptureErrorResponse, CaptureResponse, HealthResponse},
    state::AppState,
};

pub const CAPTURE_ROUTE: &str = "/api/method/capture_signatures";

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (tracing) are **not** applied here; `main.rs` attaches
/// them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route(CAPTURE_ROUTE, post(capture_signatures))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

// ---------------------------------------------------------------------------
// POST /api/method/capture_signatures
// ---------------------------------------------------------------------------

/// Delivery endpoint the signing service posts fiscal signatures to.
///
/// Contract, in order of precedence:
/// - bad or missing `X-Api-Signature` over the raw body: 401
/// - body is not JSON, or not an array of status entries: 400
/// - an entry names a `RequestId` no record carries: 404
/// - otherwise every entry is merged into its record: 200
///
/// Entries are applied in order; a failing entry aborts the batch but
/// earlier entries stay applied, so redelivery converges (the merge is
/// idempotent).
pub(crate) async fn capture_signatures(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let raw = String::from_utf8_lossy(&body).into_owned();
    let mut entry = ExchangeEntry::new(ExchangeStatus::Success, CAPTURE_ROUTE);
    entry.payload = Some(
        serde_json::from_str(&raw).unwrap_or_else(|_| serde_json::Value::String(raw.clone())),
    );

    let received = headers.get("X-Api-Signature").and_then(|v| v.to_str().ok());
    if !verify_signature(&st.secrets.api_secret, received, &raw) {
        entry.status = ExchangeStatus::Unauthorised;
        entry.response_status_code = Some(401);
        record(
            &st,
            entry
                .signature_invalid()
                .with_error("Received an invalid signature."),
        );
        return capture_error(
            StatusCode::UNAUTHORIZED,
            "Unauthorized - Invalid signature",
            None,
        );
    }

    // "not JSON" and "JSON of the wrong shape" are reported distinctly.
    let parsed: serde_json::Value = match serde_json::from_str(&raw) {
        Ok(v) => v,
        Err(_) => {
            record(
                &st,
                entry
                    .with_error("Invalid JSON data received from Fiscal Harmony.")
                    .invalid_json(),
            );
            return capture_error(StatusCode::BAD_REQUEST, "Invalid JSON", None);
        }
    };
    let callbacks: Vec<SignatureCallback> = match serde_json::from_value(parsed) {
        Ok(c) => c,
        Err(err) => {
            record(
                &st,
                entry
                    .with_error("Invalid JSON structure received from Fiscal Harmony.")
                    .invalid_json(),
            );
            return capture_error(
                StatusCode::BAD_REQUEST,
                "Invalid JSON structure",
                Some(err.to_string()),
            );
        }
    };

    let mut store = st.store.write().await;
    for callback in &callbacks {
        let Some((id, mut record_row)) = store.find_by_remote_id(&callback.request_id) else {
            entry.status = ExchangeStatus::Failure;
            entry.response_status_code = Some(404);
            record(
                &st,
                entry.with_error("Unknown RequestId received from Fiscal Harmony."),
            );
            return capture_error(
                StatusCode::NOT_FOUND,
                "RequestId is unknown",
                Some(callback.request_id.clone()),
            );
        };

        if let Err(err) = apply_status_update(&mut record_row, callback) {
            record(
                &st,
                entry
                    .with_error(err.to_string())
                    .invalid_json(),
            );
            return capture_error(
                StatusCode::BAD_REQUEST,
                "Invalid JSON structure",
                Some(err.to_string()),
            );
        }

        // MemoryStore::save is infallible; the trait is not.
        if let Err(err) = store.save(&id, record_row) {
            entry.status = ExchangeStatus::Failure;
            record(&st, entry.with_error(err.to_string()));
            return capture_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error",
                Some(err.to_string()),
            );
        }
        info!(record = %id, request_id = %callback.request_id, "signature captured");
    }
    drop(store);

    entry.response_status_code = Some(200);
    entry.response = Some(serde_json::json!({"status": "Success"}));
    record(&st, entry);
    (
        StatusCode::OK,
        Json(CaptureResponse {
            status: "Success".to_string(),
        }),
    )
        .into_response()
}

fn capture_error(status: StatusCode, error: &str, details: Option<String>) -> Response {
    (
        status,
        Json(CaptureErrorResponse {
            error: error.to_string(),
            details,
        }),
    )
        .into_response()
}

/// Logging must never mask the delivery outcome.
fn record(st: &AppState, entry: ExchangeEntry) {
    if let Err(err) = st.log.append(&entry) {
        warn!(error = %err, "failed to append exchange log entry");
    }
}

trait EntryExt {
    fn invalid_json(self) -> Self;
}

impl EntryExt for ExchangeEntry {
    fn invalid_json(mut self) -> Self {
        self.status = ExchangeStatus::InvalidJson;
        self.response_status_code = Some(400);
        self
    }
}
