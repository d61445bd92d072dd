//! Request and response types for the fhb-webhook HTTP endpoints.
//!
//! These types are `Serialize + Deserialize` so they can be JSON-encoded
//! by Axum and decoded by tests. No business logic lives here.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// /api/method/capture_signatures
// ---------------------------------------------------------------------------

/// Success acknowledgement expected by the signing service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureResponse {
    pub status: String,
}

/// Error body for every non-success capture outcome. The `error` strings
/// are part of the delivery contract with the signing service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}
