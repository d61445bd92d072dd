//! Which remote actions a viewer may trigger on a record.

use std::collections::BTreeSet;

use fhb_schemas::SignatureRecord;
use serde::{Deserialize, Serialize};

/// Viewer role, passed explicitly — never read from ambient context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Administrator-equivalent; may trigger remote signature actions.
    SystemManager,
    /// Any other viewer; gets a read-only view.
    Standard,
}

/// User-triggerable remote operations on a signature record. Each issues
/// exactly one remote call and must be followed by a full record reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Action {
    /// Resubmit the linked document for fiscalisation.
    RetryFiscalisation,
    /// Pull signing data the webhook never delivered.
    FetchSigningData,
    /// Download the generated fiscal PDF and attach it locally.
    AttachFiscalPdf,
}

/// Actions currently permitted on `record` for a viewer with `role`.
///
/// Non-privileged roles always get the empty set, regardless of record
/// state. For [`Role::SystemManager`]:
/// - `RetryFiscalisation` iff the retry flag is set.
/// - `FetchSigningData` iff the record has a remote id but no signing URL.
/// - `AttachFiscalPdf` iff a remote PDF filename is recorded.
pub fn available_actions(record: &SignatureRecord, role: Role) -> BTreeSet<Action> {
    let mut actions = BTreeSet::new();
    if role != Role::SystemManager {
        return actions;
    }

    if record.needs_retry {
        actions.insert(Action::RetryFiscalisation);
    }
    if record.fiscal_harmony_id.is_some() && record.signing_url.is_none() {
        actions.insert(Action::FetchSigningData);
    }
    if record.attachment_filename.is_some() {
        actions.insert(Action::AttachFiscalPdf);
    }

    actions
}
