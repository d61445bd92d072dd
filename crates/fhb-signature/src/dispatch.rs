//! Per-record dispatch guard.
//!
//! Each user action issues at most one outstanding remote call per record.
//! A second action on the same record is refused until the first has
//! completed AND the record has been re-fetched from storage — completion
//! is only expressible through [`DispatchGuard::complete`], which performs
//! the reload itself. There is no optimistic local mutation path.

use std::collections::BTreeSet;

use fhb_schemas::SignatureRecord;

use crate::store::{SignatureStore, StoreError};

// ---------------------------------------------------------------------------
// DispatchError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// A remote action for this record is already outstanding.
    AlreadyInFlight { id: String },
    /// `complete` called for a record with no outstanding action.
    NotInFlight { id: String },
    /// The post-action reload failed; the in-flight marker is kept so the
    /// record stays blocked rather than drifting.
    ReloadFailed(StoreError),
}

impl std::fmt::Display for DispatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyInFlight { id } => {
                write!(f, "a remote action for {id} is already in flight")
            }
            Self::NotInFlight { id } => write!(f, "no remote action in flight for {id}"),
            Self::ReloadFailed(err) => write!(f, "post-action reload failed: {err}"),
        }
    }
}

impl std::error::Error for DispatchError {}

// ---------------------------------------------------------------------------
// DispatchGuard
// ---------------------------------------------------------------------------

/// Tracks which records have an outstanding remote action.
#[derive(Debug, Clone, Default)]
pub struct DispatchGuard {
    in_flight: BTreeSet<String>,
}

impl DispatchGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a remote action as started for `id`.
    ///
    /// # Errors
    /// [`DispatchError::AlreadyInFlight`] while a prior action on the same
    /// record has not completed.
    pub fn begin(&mut self, id: &str) -> Result<(), DispatchError> {
        if !self.in_flight.insert(id.to_string()) {
            return Err(DispatchError::AlreadyInFlight { id: id.to_string() });
        }
        Ok(())
    }

    /// Complete the outstanding action for `id` and return the freshly
    /// loaded record. The displayed state is always this re-fetched copy.
    ///
    /// # Errors
    /// - [`DispatchError::NotInFlight`] when nothing was begun for `id`.
    /// - [`DispatchError::ReloadFailed`] when the store cannot produce the
    ///   record; the in-flight marker is retained so the record stays
    ///   blocked until a successful reload.
    pub fn complete<S: SignatureStore>(
        &mut self,
        store: &S,
        id: &str,
    ) -> Result<SignatureRecord, DispatchError> {
        if !self.in_flight.contains(id) {
            return Err(DispatchError::NotInFlight { id: id.to_string() });
        }

        let record = store.load(id).map_err(DispatchError::ReloadFailed)?;
        self.in_flight.remove(id);
        Ok(record)
    }

    /// Whether a remote action is currently outstanding for `id`.
    pub fn is_in_flight(&self, id: &str) -> bool {
        self.in_flight.contains(id)
    }
}
