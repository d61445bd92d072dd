//! Request signing and webhook signature verification.
//!
//! Both sides of the integration sign the same way: the request body is
//! canonicalized (compact JSON, keys sorted recursively), HMAC-SHA256'd with
//! the shared API secret, and the digest is base64-encoded into the
//! `X-Api-Signature` header.

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::Serialize;
use serde_json::Value;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Canonical wire body: compact JSON with keys sorted at every depth.
/// The remote service verifies against exactly this form, so the encoding
/// is part of the protocol, not a style choice.
pub fn canonical_body<T: Serialize>(data: &T) -> Result<String> {
    let raw = serde_json::to_value(data).context("serialize request body failed")?;
    let sorted = sort_keys(&raw);
    serde_json::to_string(&sorted).context("encode request body failed")
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

/// Base64 HMAC-SHA256 of `payload` under `api_secret`.
pub fn sign_payload(api_secret: &str, payload: &str) -> String {
    // HmacSha256::new_from_slice only fails on invalid key length and
    // SHA-256 HMAC accepts any length, so this cannot error.
    let mut mac = HmacSha256::new_from_slice(api_secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("hmac-sha256 accepts keys of any length"));
    mac.update(payload.as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}

/// Check an inbound `X-Api-Signature` header against the raw request body.
/// A missing header fails verification.
pub fn verify_signature(api_secret: &str, received: Option<&str>, raw_body: &str) -> bool {
    let Some(received) = received else {
        return false;
    };
    received == sign_payload(api_secret, raw_body)
}
