//! Storage seam for signature records.
//!
//! Business-document persistence is external; this trait is the only
//! surface the daemon and CLI touch. The in-memory implementation is
//! deterministic and keyed by record id (the sales document name).

use std::collections::BTreeMap;

use fhb_schemas::SignatureRecord;

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No record under the given id.
    NotFound { id: String },
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { id } => write!(f, "no signature record for {id}"),
        }
    }
}

impl std::error::Error for StoreError {}

// ---------------------------------------------------------------------------
// SignatureStore
// ---------------------------------------------------------------------------

/// Record storage as seen by this component. `load` returns a fresh copy
/// of the authoritative record — callers re-fetch after every remote
/// action rather than mutating a cached view.
pub trait SignatureStore {
    fn load(&self, id: &str) -> Result<SignatureRecord, StoreError>;

    fn save(&mut self, id: &str, record: SignatureRecord) -> Result<(), StoreError>;

    /// Locate the record whose `fiscal_harmony_id` equals `remote_id`.
    /// Webhook deliveries are keyed this way.
    fn find_by_remote_id(&self, remote_id: &str) -> Option<(String, SignatureRecord)>;
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// BTreeMap-backed store used by the webhook daemon and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: BTreeMap<String, SignatureRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl SignatureStore for MemoryStore {
    fn load(&self, id: &str) -> Result<SignatureRecord, StoreError> {
        self.records
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })
    }

    fn save(&mut self, id: &str, record: SignatureRecord) -> Result<(), StoreError> {
        self.records.insert(id.to_string(), record);
        Ok(())
    }

    fn find_by_remote_id(&self, remote_id: &str) -> Option<(String, SignatureRecord)> {
        self.records
            .iter()
            .find(|(_, rec)| rec.fiscal_harmony_id.as_deref() == Some(remote_id))
            .map(|(id, rec)| (id.clone(), rec.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_returns_a_copy_not_a_view() {
        let mut store = MemoryStore::new();
        store
            .save("SINV-0001", SignatureRecord::new("SINV-0001"))
            .unwrap();

        let mut copy = store.load("SINV-0001").unwrap();
        copy.needs_retry = true;

        // Mutating the copy must not leak into the store.
        assert!(!store.load("SINV-0001").unwrap().needs_retry);
    }

    #[test]
    fn missing_record_is_not_found() {
        let store = MemoryStore::new();
        let err = store.load("SINV-0404").unwrap_err();
        assert_eq!(
            err,
            StoreError::NotFound {
                id: "SINV-0404".to_string()
            }
        );
    }

    #[test]
    fn find_by_remote_id_matches_fiscal_harmony_id() {
        let mut store = MemoryStore::new();
        let mut rec = SignatureRecord::new("SINV-0002");
        rec.fiscal_harmony_id = Some("FH2".to_string());
        store.save("SINV-0002", rec).unwrap();

        let (id, rec) = store.find_by_remote_id("FH2").unwrap();
        assert_eq!(id, "SINV-0002");
        assert_eq!(rec.fiscal_harmony_id.as_deref(), Some("FH2"));
        assert!(store.find_by_remote_id("FH-NONE").is_none());
    }
}
