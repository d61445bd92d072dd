//! Secret-literal guard scenario.
//!
//! GREEN when:
//! - A YAML carrying a literal secret value fails with CONFIG_SECRET_DETECTED.
//! - A YAML carrying env var NAMES loads, and the merged JSON contains the
//!   names, not secret values.
//! - Key reordering does not change the config hash; value changes do.

use fhb_config::load_layered_yaml_from_strings;

const YAML_WITH_SECRET: &str = r#"
fiscal_harmony:
  endpoint: "https://api.fiscalharmony.co.zw/api"
  keys_env:
    api_key: "sk-live-abc123secretvalue"
    api_secret: "FH_API_SECRET"
"#;

const YAML_WITH_ENV_NAMES: &str = r#"
fiscal_harmony:
  endpoint: "https://api.fiscalharmony.co.zw/api"
  keys_env:
    api_key: "FH_API_KEY"
    api_secret: "FH_API_SECRET"
"#;

const YAML_REORDERED: &str = r#"
fiscal_harmony:
  keys_env:
    api_secret: "FH_API_SECRET"
    api_key: "FH_API_KEY"
  endpoint: "https://api.fiscalharmony.co.zw/api"
"#;

#[test]
fn literal_secret_aborts_the_load() {
    let err = load_layered_yaml_from_strings(&[YAML_WITH_SECRET]).unwrap_err();
    assert!(
        err.to_string().contains("CONFIG_SECRET_DETECTED"),
        "unexpected error: {err}"
    );
    assert!(
        !err.to_string().contains("abc123"),
        "error message must not echo the secret"
    );
}

#[test]
fn env_var_names_load_cleanly() {
    let loaded = load_layered_yaml_from_strings(&[YAML_WITH_ENV_NAMES]).unwrap();
    assert_eq!(
        loaded
            .config_json
            .pointer("/fiscal_harmony/keys_env/api_key")
            .and_then(|v| v.as_str()),
        Some("FH_API_KEY")
    );
}

#[test]
fn hash_is_stable_under_key_reordering() {
    let a = load_layered_yaml_from_strings(&[YAML_WITH_ENV_NAMES]).unwrap();
    let b = load_layered_yaml_from_strings(&[YAML_REORDERED]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
    assert_eq!(a.canonical_json, b.canonical_json);
}

#[test]
fn different_values_produce_different_hashes() {
    let a = load_layered_yaml_from_strings(&[YAML_WITH_ENV_NAMES]).unwrap();
    let overlay = "site:\n  time_zone: \"Africa/Harare\"\n";
    let b = load_layered_yaml_from_strings(&[YAML_WITH_ENV_NAMES, overlay]).unwrap();
    assert_ne!(a.config_hash, b.config_hash);
}
