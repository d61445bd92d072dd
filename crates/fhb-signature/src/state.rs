//! Derived lifecycle state and the remote status-update merge rule.

use fhb_schemas::{SignatureCallback, SignatureRecord};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SignatureState
// ---------------------------------------------------------------------------

/// All states a signature record can occupy. Never stored — always derived
/// from the record's fields via [`SignatureState::of`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureState {
    /// Submitted locally; the remote service has not yet accepted it.
    Pending,
    /// Accepted remotely (`fiscal_harmony_id` set) but the signing URL has
    /// not arrived — the webhook delivery may have been missed.
    AwaitingSigningData,
    /// Signing URL received. **Terminal.**
    Fiscalised,
    /// A non-retryable error was recorded. Terminal until the server
    /// re-flags the record as retryable.
    Failed,
    /// A prior attempt failed in a retryable way; an operator may resubmit.
    RetryPending,
}

impl SignatureState {
    /// Derive the state from a record's fields.
    ///
    /// # Errors
    /// Returns [`InvalidRecord`] when the record violates the completion
    /// invariant (signing URL present while the retry flag is set). Such a
    /// record must be flagged, never silently classified.
    pub fn of(record: &SignatureRecord) -> Result<Self, InvalidRecord> {
        if record.signing_url.is_some() && record.needs_retry {
            return Err(InvalidRecord {
                sales_document: record.sales_document.clone(),
                reason: "signing URL present while retry flag is set",
            });
        }

        Ok(if record.needs_retry {
            Self::RetryPending
        } else if record.signing_url.is_some() {
            Self::Fiscalised
        } else if record.error_message.is_some() {
            Self::Failed
        } else if record.fiscal_harmony_id.is_some() {
            Self::AwaitingSigningData
        } else {
            Self::Pending
        })
    }

    /// Returns `true` if no remote update can move the record further.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Fiscalised)
    }
}

// ---------------------------------------------------------------------------
// InvalidRecord
// ---------------------------------------------------------------------------

/// A record whose fields violate the lifecycle invariant. Indicates drift
/// between this client and the authoritative server state — callers must
/// surface it, not classify around it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidRecord {
    pub sales_document: String,
    pub reason: &'static str,
}

impl std::fmt::Display for InvalidRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid signature record for {}: {}",
            self.sales_document, self.reason
        )
    }
}

impl std::error::Error for InvalidRecord {}

// ---------------------------------------------------------------------------
// Status-update merge
// ---------------------------------------------------------------------------

/// Returned when a remote status update cannot legally be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateError {
    /// The callback's `RequestId` does not match the record's remote id.
    RemoteIdMismatch { expected: Option<String>, got: String },
    /// The callback carries QR data together with an actionable failure —
    /// applying it would break the completion invariant.
    ContradictoryCallback { request_id: String },
    /// An actionable failure arrived for a record whose signing URL is
    /// already set. Completion is terminal; flagging the record for retry
    /// would break the completion invariant.
    FailureAfterFiscalisation { request_id: String },
}

impl std::fmt::Display for UpdateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RemoteIdMismatch { expected, got } => write!(
                f,
                "status update for {got} applied to record with remote id {expected:?}"
            ),
            Self::ContradictoryCallback { request_id } => write!(
                f,
                "status update {request_id} carries QR data and an actionable failure"
            ),
            Self::FailureAfterFiscalisation { request_id } => write!(
                f,
                "status update {request_id} reports an actionable failure for a fiscalised record"
            ),
        }
    }
}

impl std::error::Error for UpdateError {}

/// Apply one remote status update to a record.
///
/// Merge rule (mirrors the remote service's webhook contract):
/// - `needs_retry` becomes `is_actionable && !success`.
/// - the error text is copied when present; a clean callback clears a
///   previously recorded error.
/// - QR data, when present, sets the signing URL and verification extras.
/// - the attachment filename is taken verbatim (absent clears it).
///
/// Updates that would leave the record with both a signing URL and the
/// retry flag are rejected. The record is untouched on error.
pub fn apply_status_update(
    record: &mut SignatureRecord,
    callback: &SignatureCallback,
) -> Result<(), UpdateError> {
    if record.fiscal_harmony_id.as_deref() != Some(callback.request_id.as_str()) {
        return Err(UpdateError::RemoteIdMismatch {
            expected: record.fiscal_harmony_id.clone(),
            got: callback.request_id.clone(),
        });
    }

    let needs_retry = callback.is_actionable && !callback.success;
    if needs_retry && callback.qr_data.is_some() {
        return Err(UpdateError::ContradictoryCallback {
            request_id: callback.request_id.clone(),
        });
    }
    // A fiscalised record is terminal: a late failure may not re-flag it.
    if needs_retry && record.signing_url.is_some() {
        return Err(UpdateError::FailureAfterFiscalisation {
            request_id: callback.request_id.clone(),
        });
    }

    record.needs_retry = needs_retry;

    if let Some(error) = &callback.error {
        record.error_message = Some(error.clone());
    } else if record.error_message.is_some() {
        record.error_message = None;
    }

    if let Some(qr) = &callback.qr_data {
        record.signing_url = Some(qr.qr_code_url.clone());
        record.verification_code = Some(qr.verification_code.clone());
        record.fiscal_day = Some(qr.fiscal_day);
        record.device_id = Some(qr.device_id);
        record.invoice_number = Some(qr.invoice_number);
    }

    record.attachment_filename = callback.fiscal_invoice_pdf.clone();

    Ok(())
}
