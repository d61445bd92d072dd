//! Format validators for Fiscal Harmony credentials and tax identifiers.
//!
//! Every check here runs synchronously BEFORE any remote call is issued.
//! A failed check blocks the triggering action entirely — callers must not
//! fall through to the remote update on `Err`.

use std::sync::OnceLock;

use regex::Regex;

// ---------------------------------------------------------------------------
// ValidationError
// ---------------------------------------------------------------------------

/// A value failed its format contract. Names the field, the offending
/// value, and the expected format so the message can be shown verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Which input failed: "api_key", "api_secret", "tax_id", "tin_number",
    /// "hs_code", "endpoint".
    pub field: &'static str,
    /// The rejected value. Secrets are elided by the constructor.
    pub value: String,
    /// Human description of the expected format.
    pub expected: &'static str,
}

impl ValidationError {
    fn new(field: &'static str, value: &str, expected: &'static str) -> Self {
        Self {
            field,
            value: value.to_string(),
            expected,
        }
    }

    /// Variant for secret-bearing fields: the value is never echoed back.
    fn secret(field: &'static str, expected: &'static str) -> Self {
        Self {
            field,
            value: "<hidden>".to_string(),
            expected,
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} \"{}\" is invalid: expected {}",
            self.field, self.value, self.expected
        )
    }
}

impl std::error::Error for ValidationError {}

// ---------------------------------------------------------------------------
// Compiled patterns
// ---------------------------------------------------------------------------

fn pattern(cell: &'static OnceLock<Regex>, src: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(src).expect("hardcoded regex compiles"))
}

fn api_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    pattern(&RE, r"^[A-Z0-9]{32}$")
}

fn api_secret_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // 86 base64 characters + "==" padding: a 66-byte value, encoded.
    pattern(&RE, r"^[A-Za-z0-9/+]{86}==$")
}

fn tax_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    pattern(&RE, r"^2\d{8}$")
}

fn tin_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    pattern(&RE, r"^\d{10}$")
}

fn hs_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    pattern(&RE, r"^\d{8,10}$")
}

fn endpoint_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    pattern(&RE, r"^https://[a-z]+\.([a-z]+\.)*(co\.zw|com)/[a-z]+$")
}

// ---------------------------------------------------------------------------
// Public checks
// ---------------------------------------------------------------------------

/// Validate an API key/secret pair before a remote credential update.
///
/// Key: exactly 32 uppercase alphanumerics. Secret: 86 base64 characters
/// followed by `==`. The key is checked first; the secret error never
/// echoes the secret value.
pub fn validate_credentials(api_key: &str, api_secret: &str) -> Result<(), ValidationError> {
    if !api_key_re().is_match(api_key) {
        return Err(ValidationError::new(
            "api_key",
            api_key,
            "32 uppercase letters or digits",
        ));
    }
    if !api_secret_re().is_match(api_secret) {
        return Err(ValidationError::secret(
            "api_secret",
            "86 base64 characters followed by ==",
        ));
    }
    Ok(())
}

/// Validate the tax identifiers on a customer record before save.
///
/// Both checks are independent: a `None` field passes, and every failed
/// field is reported. A non-empty error list vetoes the save.
pub fn validate_tax_identifiers(
    tax_id: Option<&str>,
    tin_number: Option<&str>,
) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Some(vat) = tax_id {
        if !tax_id_re().is_match(vat) {
            errors.push(ValidationError::new(
                "tax_id",
                vat,
                "a 2 followed by 8 digits",
            ));
        }
    }

    if let Some(tin) = tin_number {
        if !tin_re().is_match(tin) {
            errors.push(ValidationError::new("tin_number", tin, "exactly 10 digits"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate an HS (Harmonized System) code: 8 to 10 digits.
pub fn validate_hs_code(code: &str) -> Result<(), ValidationError> {
    if !hs_code_re().is_match(code) {
        return Err(ValidationError::new("hs_code", code, "8 to 10 digits"));
    }
    Ok(())
}

/// Validate the Fiscal Harmony endpoint URL. The service only issues
/// lowercase `https` endpoints under `.com` or `.co.zw`.
pub fn validate_endpoint(url: &str) -> Result<(), ValidationError> {
    if !endpoint_re().is_match(url) {
        return Err(ValidationError::new(
            "endpoint",
            url,
            "an https URL like https://api.example.com/api",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD_KEY: &str = "ABCDEFGH12345678ABCDEFGH12345678";

    fn good_secret() -> String {
        // 86 base64 chars + "==".
        format!("{}==", "Ab1/+".repeat(18).chars().take(86).collect::<String>())
    }

    #[test]
    fn valid_credentials_pass() {
        assert!(validate_credentials(GOOD_KEY, &good_secret()).is_ok());
    }

    #[test]
    fn short_key_fails_naming_the_key_field() {
        let err = validate_credentials("short", &good_secret()).unwrap_err();
        assert_eq!(err.field, "api_key");
        assert!(err.to_string().contains("short"));
    }

    #[test]
    fn lowercase_key_rejected() {
        let err = validate_credentials(&GOOD_KEY.to_lowercase(), &good_secret()).unwrap_err();
        assert_eq!(err.field, "api_key");
    }

    #[test]
    fn bad_secret_fails_without_echoing_it() {
        let err = validate_credentials(GOOD_KEY, "not-a-secret").unwrap_err();
        assert_eq!(err.field, "api_secret");
        assert!(!err.to_string().contains("not-a-secret"));
    }

    #[test]
    fn secret_with_wrong_padding_rejected() {
        let long = "A".repeat(86);
        let err = validate_credentials(GOOD_KEY, &format!("{long}=")).unwrap_err();
        assert_eq!(err.field, "api_secret");
    }

    #[test]
    fn valid_tax_identifiers_pass() {
        assert!(validate_tax_identifiers(Some("200000000"), Some("1234567890")).is_ok());
    }

    #[test]
    fn absent_identifiers_pass() {
        assert!(validate_tax_identifiers(None, None).is_ok());
    }

    #[test]
    fn both_bad_identifiers_reported_independently() {
        let errors = validate_tax_identifiers(Some("300000000"), Some("123")).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].field, "tax_id");
        assert_eq!(errors[1].field, "tin_number");
    }

    #[test]
    fn vat_must_lead_with_two() {
        let errors = validate_tax_identifiers(Some("100000000"), None).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "tax_id");
    }

    #[test]
    fn hs_code_length_bounds() {
        assert!(validate_hs_code("12345678").is_ok());
        assert!(validate_hs_code("1234567890").is_ok());
        assert!(validate_hs_code("1234567").is_err());
        assert!(validate_hs_code("12345678901").is_err());
        assert!(validate_hs_code("1234567a").is_err());
    }

    #[test]
    fn endpoint_format() {
        assert!(validate_endpoint("https://api.fiscalharmony.co.zw/api").is_ok());
        assert!(validate_endpoint("https://api.example.com/v").is_ok());
        assert!(validate_endpoint("http://api.example.com/v").is_err());
        assert!(validate_endpoint("https://example.com").is_err());
    }
}
