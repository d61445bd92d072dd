//! Layered YAML configuration for the Fiscal Harmony bridge.
//!
//! Config documents merge in order (base first, overrides later), are
//! canonicalised to compact JSON, and hashed so deployments can assert
//! which configuration a binary is running. Secret VALUES never live in
//! config — only env var NAMES do (see [`secrets`]); a literal that looks
//! like a secret aborts the load.

use anyhow::{bail, Context, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;

pub mod secrets;

/// Known secret-like prefixes. Any leaf string starting with one of these
/// fails the load with CONFIG_SECRET_DETECTED.
const SECRET_PREFIXES: &[&str] = &[
    "sk-",
    "sk_live",
    "sk_test",
    "AKIA",
    "-----BEGIN",
    "ghp_",
    "gho_",
    "glpat-",
    "xoxb-",
    "xoxp-",
];

/// Result of a layered load: the merged JSON plus its canonical form and
/// sha256 hash.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

impl LoadedConfig {
    /// Fiscal Harmony endpoint from `/fiscal_harmony/endpoint`,
    /// format-validated.
    pub fn endpoint(&self) -> Result<String> {
        let url = read_str_at(&self.config_json, "/fiscal_harmony/endpoint")
            .context("config missing /fiscal_harmony/endpoint")?;
        fhb_validate::validate_endpoint(&url)
            .map_err(|e| anyhow::anyhow!("invalid endpoint in config: {e}"))?;
        Ok(url)
    }

    /// IANA timezone name used for payload timestamps, from
    /// `/site/time_zone`. Defaults to "Africa/Harare" (the fiscal
    /// authority's zone) when absent.
    pub fn time_zone(&self) -> String {
        read_str_at(&self.config_json, "/site/time_zone")
            .unwrap_or_else(|| "Africa/Harare".to_string())
    }

    /// Whether line items must carry HS codes, from
    /// `/fiscal_harmony/include_hs_codes`. Defaults to false.
    pub fn include_hs_codes(&self) -> bool {
        self.config_json
            .pointer("/fiscal_harmony/include_hs_codes")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

/// Load and merge YAML files in order: earlier paths are base, later
/// paths override.
pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut docs: Vec<String> = Vec::new();
    for p in paths {
        let raw =
            fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}"))?;
        docs.push(raw);
    }

    let doc_refs: Vec<&str> = docs.iter().map(|s| s.as_str()).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

/// Same as [`load_layered_yaml`] for in-memory documents.
pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = serde_json::json!({});
    for raw in yaml_docs {
        let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw).context("invalid yaml")?;
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        merged = deep_merge(merged, v_json);
    }

    enforce_no_secret_literals(&merged)?;

    let canonical_json = canonicalize_json(&merged)?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

/// Read a non-empty string value at a JSON pointer. `None` when absent,
/// non-string, or blank after trimming.
pub(crate) fn read_str_at(config: &Value, pointer: &str) -> Option<String> {
    let s = config.pointer(pointer)?.as_str()?;
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn deep_merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a_map), Value::Object(b_map)) => {
            for (k, b_val) in b_map {
                let a_val = a_map.remove(&k).unwrap_or(Value::Null);
                a_map.insert(k, deep_merge(a_val, b_val));
            }
            Value::Object(a_map)
        }
        (_, b_other) => b_other,
    }
}

/// Compact JSON with recursively sorted keys. One canonical text per
/// logical config, independent of YAML key order.
fn canonicalize_json(v: &Value) -> Result<String> {
    let sorted = sort_keys(v);
    serde_json::to_string(&sorted).context("canonical json serialize failed")
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

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn enforce_no_secret_literals(v: &Value) -> Result<()> {
    let mut leaves = Vec::new();
    collect_leaf_pointers(v, "", &mut leaves);

    for ptr in leaves {
        if let Some(val) = v.pointer(&ptr) {
            if let Some(s) = val.as_str() {
                if looks_like_secret(s) {
                    bail!("CONFIG_SECRET_DETECTED leaf={} value=REDACTED", ptr);
                }
            }
        }
    }
    Ok(())
}

fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    if t.len() < 8 {
        return false;
    }
    SECRET_PREFIXES.iter().any(|p| t.starts_with(p))
}

fn collect_leaf_pointers(v: &Value, prefix: &str, out: &mut Vec<String>) {
    match v {
        Value::Object(map) => {
            for (k, vv) in map.iter() {
                let next = format!("{}/{}", prefix, escape_pointer_token(k));
                collect_leaf_pointers(vv, &next, out);
            }
        }
        Value::Array(arr) => {
            for (i, vv) in arr.iter().enumerate() {
                let next = format!("{}/{}", prefix, i);
                collect_leaf_pointers(vv, &next, out);
            }
        }
        _ => {
            let p = if prefix.is_empty() {
                "/".to_string()
            } else {
                prefix.to_string()
            };
            out.push(p);
        }
    }
}

fn escape_pointer_token(s: &str) -> String {
    s.replace('~', "~0").replace('/', "~1")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_layers_override_earlier_ones() {
        let base = "fiscal_harmony:\n  endpoint: \"https://api.fiscalharmony.co.zw/api\"\n  include_hs_codes: false\n";
        let overlay = "fiscal_harmony:\n  include_hs_codes: true\n";
        let loaded = load_layered_yaml_from_strings(&[base, overlay]).unwrap();
        assert!(loaded.include_hs_codes());
        assert_eq!(
            loaded.endpoint().unwrap(),
            "https://api.fiscalharmony.co.zw/api"
        );
    }

    #[test]
    fn time_zone_defaults_to_harare() {
        let loaded = load_layered_yaml_from_strings(&["{}"]).unwrap();
        assert_eq!(loaded.time_zone(), "Africa/Harare");
    }

    #[test]
    fn bad_endpoint_in_config_is_rejected() {
        let yaml = "fiscal_harmony:\n  endpoint: \"http://insecure.example.com/api\"\n";
        let loaded = load_layered_yaml_from_strings(&[yaml]).unwrap();
        assert!(loaded.endpoint().is_err());
    }
}
