//! JSON-file record store for the CLI.
//!
//! The authoritative signature records live in the ERP; the CLI works on a
//! JSON export of them (a map of sales document id to record) and writes
//! the file back after every remote action. Implements [`SignatureStore`]
//! so the dispatch guard can reload records through the same seam the
//! webhook daemon uses.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fhb_schemas::SignatureRecord;
use fhb_signature::{SignatureStore, StoreError};

pub struct FileStore {
    path: PathBuf,
    records: BTreeMap<String, SignatureRecord>,
}

impl FileStore {
    /// Open a record file; a missing file is an empty store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let records = if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("read record file {:?}", path))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("parse record file {:?}", path))?
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, records })
    }

    /// Write the records back to disk.
    pub fn persist(&self) -> Result<()> {
        let raw = serde_json::to_string_pretty(&self.records).context("encode record file")?;
        fs::write(&self.path, raw).with_context(|| format!("write record file {:?}", self.path))
    }
}

impl SignatureStore for FileStore {
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
    fn records_survive_a_persist_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");

        let mut store = FileStore::open(&path).unwrap();
        let mut rec = SignatureRecord::new("SINV-0001");
        rec.fiscal_harmony_id = Some("FH-1".to_string());
        store.save("SINV-0001", rec).unwrap();
        store.persist().unwrap();

        let reopened = FileStore::open(&path).unwrap();
        let rec = reopened.load("SINV-0001").unwrap();
        assert_eq!(rec.fiscal_harmony_id.as_deref(), Some("FH-1"));
        assert_eq!(
            reopened.find_by_remote_id("FH-1").unwrap().0,
            "SINV-0001"
        );
    }

    #[test]
    fn missing_file_is_an_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("absent.json")).unwrap();
        assert!(matches!(
            store.load("SINV-0001"),
            Err(StoreError::NotFound { .. })
        ));
    }
}
