use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Outcome recorded for one exchange with the fiscal authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExchangeStatus {
    Success,
    Failure,
    Unauthorised,
    InvalidJson,
}

/// One logged exchange. Request and response bodies are kept as raw JSON so
/// the log stays useful when the wire format drifts ahead of this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeEntry {
    pub entry_id: Uuid,
    pub ts_utc: DateTime<Utc>,
    pub status: ExchangeStatus,
    pub request_url: String,
    /// Remote document id, when the exchange concerns a known record.
    pub request_id: Option<String>,
    pub payload: Option<Value>,
    pub response: Option<Value>,
    pub response_status_code: Option<u16>,
    /// False only when an inbound callback failed HMAC verification.
    pub signature_valid: bool,
    pub error_details: Option<String>,
}

impl ExchangeEntry {
    pub fn new(status: ExchangeStatus, request_url: impl Into<String>) -> Self {
        Self {
            entry_id: Uuid::new_v4(),
            ts_utc: Utc::now(),
            status,
            request_url: request_url.into(),
            request_id: None,
            payload: None,
            response: None,
            response_status_code: None,
            signature_valid: true,
            error_details: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_response(mut self, status_code: u16, response: Value) -> Self {
        self.response_status_code = Some(status_code);
        self.response = Some(response);
        self
    }

    pub fn with_error(mut self, details: impl Into<String>) -> Self {
        self.error_details = Some(details.into());
        self
    }

    pub fn signature_invalid(mut self) -> Self {
        self.signature_valid = false;
        self
    }
}

/// Append-only exchange log. Writes JSON Lines (one exchange per line).
pub struct ExchangeLog {
    path: PathBuf,
}

impl ExchangeLog {
    /// Creates the log writer and ensures parent dirs exist.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create_dir_all {:?}", parent))?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one exchange.
    pub fn append(&self, entry: &ExchangeEntry) -> Result<()> {
        let line = canonical_json_line(entry)?;
        append_line(&self.path, &line)
    }

    /// Read every entry back. Blank lines are skipped; a malformed line is an
    /// error, not a silent drop.
    pub fn read_all(&self) -> Result<Vec<ExchangeEntry>> {
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("read exchange log {:?}", self.path))?;
        let mut entries = Vec::new();
        for (i, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let entry: ExchangeEntry = serde_json::from_str(trimmed)
                .with_context(|| format!("parse exchange entry at line {}", i + 1))?;
            entries.push(entry);
        }
        Ok(entries)
    }
}

/// Write a single line to file (with trailing newline).
fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open exchange log {:?}", path))?;
    f.write_all(line.as_bytes())
        .context("write exchange line failed")?;
    f.write_all(b"\n").context("write newline failed")?;
    Ok(())
}

/// Canonicalize by sorting keys recursively and emitting compact JSON.
/// One exchange == one JSON line.
fn canonical_json_line<T: Serialize>(v: &T) -> Result<String> {
    let raw = serde_json::to_value(v).context("serialize exchange entry failed")?;
    let sorted = sort_keys(&raw);
    serde_json::to_string(&sorted).context("json stringify failed")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}
