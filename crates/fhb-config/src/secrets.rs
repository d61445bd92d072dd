//! Runtime secret resolution.
//!
//! # Contract
//! - Config YAML stores only env var NAMES (e.g. `"FH_API_KEY"`), under
//!   `/fiscal_harmony/keys_env/api_key` and `.../api_secret`.
//! - Callers resolve once at startup and pass [`ResolvedSecrets`] into
//!   constructors; `std::env::var` is never scattered elsewhere.
//! - `Debug` output redacts values; error messages name the env var NAME,
//!   never the value.
//!
//! # Mode-aware enforcement
//! - `Full` (CLI, anything issuing outbound API calls): key + secret
//!   required.
//! - `WebhookOnly` (inbound signature verification): secret required,
//!   key optional.

use anyhow::{bail, Result};
use serde_json::Value;

use crate::read_str_at;

/// What the resolving binary needs the credentials for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretsMode {
    /// Outbound API calls: both key and secret are required.
    Full,
    /// Inbound webhook verification only: the secret alone suffices.
    WebhookOnly,
}

/// Credentials resolved from the environment. Values are redacted in
/// `Debug` output.
#[derive(Clone)]
pub struct ResolvedSecrets {
    /// API key; `None` only permitted in [`SecretsMode::WebhookOnly`].
    pub api_key: Option<String>,
    /// API secret used for request signing and webhook verification.
    pub api_secret: String,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field("api_key", &self.api_key.as_ref().map(|_| "<REDACTED>"))
            .field("api_secret", &"<REDACTED>")
            .finish()
    }
}

/// Resolve a named environment variable. `None` when unset or blank.
/// The value never appears in an error path.
fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Resolve credentials for the given mode from the loaded config JSON.
///
/// # Errors
/// Fails naming the env var NAME of the first missing required variable.
pub fn resolve_secrets(config_json: &Value, mode: SecretsMode) -> Result<ResolvedSecrets> {
    let key_var = read_str_at(config_json, "/fiscal_harmony/keys_env/api_key")
        .unwrap_or_else(|| "FH_API_KEY".to_string());
    let secret_var = read_str_at(config_json, "/fiscal_harmony/keys_env/api_secret")
        .unwrap_or_else(|| "FH_API_SECRET".to_string());

    let api_key = resolve_env(&key_var);
    let api_secret = resolve_env(&secret_var);

    if mode == SecretsMode::Full && api_key.is_none() {
        bail!(
            "SECRETS_MISSING: required env var '{}' (api key) is not set or empty",
            key_var,
        );
    }

    let Some(api_secret) = api_secret else {
        bail!(
            "SECRETS_MISSING: required env var '{}' (api secret) is not set or empty",
            secret_var,
        );
    };

    Ok(ResolvedSecrets {
        api_key,
        api_secret,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env-var mutation: each test uses its own variable names so the tests
    // stay independent under parallel execution.

    #[test]
    fn webhook_mode_needs_only_the_secret() {
        let config = serde_json::json!({
            "fiscal_harmony": { "keys_env": {
                "api_key": "FHB_TEST_WH_KEY",
                "api_secret": "FHB_TEST_WH_SECRET",
            }}
        });
        std::env::set_var("FHB_TEST_WH_SECRET", "s3cret-value");
        std::env::remove_var("FHB_TEST_WH_KEY");

        let resolved = resolve_secrets(&config, SecretsMode::WebhookOnly).unwrap();
        assert!(resolved.api_key.is_none());
        assert_eq!(resolved.api_secret, "s3cret-value");
    }

    #[test]
    fn full_mode_fails_naming_the_key_var() {
        let config = serde_json::json!({
            "fiscal_harmony": { "keys_env": {
                "api_key": "FHB_TEST_FULL_KEY",
                "api_secret": "FHB_TEST_FULL_SECRET",
            }}
        });
        std::env::set_var("FHB_TEST_FULL_SECRET", "s3cret-value");
        std::env::remove_var("FHB_TEST_FULL_KEY");

        let err = resolve_secrets(&config, SecretsMode::Full).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("FHB_TEST_FULL_KEY"));
        assert!(!msg.contains("s3cret-value"));
    }

    #[test]
    fn debug_output_redacts_values() {
        let secrets = ResolvedSecrets {
            api_key: Some("THEKEY".to_string()),
            api_secret: "THESECRET".to_string(),
        };
        let dbg = format!("{secrets:?}");
        assert!(!dbg.contains("THEKEY"));
        assert!(!dbg.contains("THESECRET"));
        assert!(dbg.contains("<REDACTED>"));
    }
}
