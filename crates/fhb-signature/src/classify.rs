//! Display classification for record listings.
//!
//! One canonical filter policy: the retry branch filters on stored-value
//! equality (the flag is a persisted boolean column), the remaining
//! branches on field presence.

use fhb_schemas::SignatureRecord;
use serde::{Deserialize, Serialize};

use crate::state::{InvalidRecord, SignatureState};

// ---------------------------------------------------------------------------
// StatusColor
// ---------------------------------------------------------------------------

/// Indicator colour shown next to the status label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusColor {
    Red,
    Green,
    Gray,
    Orange,
}

// ---------------------------------------------------------------------------
// ListFilter
// ---------------------------------------------------------------------------

/// Three-part `(field, operator, value)` filter tuple consumed by the
/// external record-listing facility to pre-filter by computed status.
// Serialize only: the static field strings cannot satisfy a
// deserializer's borrowed-data lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ListFilter {
    pub field: &'static str,
    pub operator: &'static str,
    pub value: &'static str,
}

// ---------------------------------------------------------------------------
// StatusIndicator
// ---------------------------------------------------------------------------

/// Result of [`classify`]: what a listing row shows for one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusIndicator {
    pub label: String,
    pub color: StatusColor,
    pub filter: ListFilter,
}

/// Classify a record for display. Deterministic and total over valid
/// records; exactly one branch applies, in strict priority order:
///
/// 1. retry flag set           → "Needs Retry", red
/// 2. signing URL present      → "Fiscalised", green
/// 3. error recorded           → the error text, gray
/// 4. otherwise                → "Pending FH Response", orange
///
/// # Errors
/// Propagates [`InvalidRecord`] for records violating the completion
/// invariant (see [`SignatureState::of`]).
pub fn classify(record: &SignatureRecord) -> Result<StatusIndicator, InvalidRecord> {
    let state = SignatureState::of(record)?;

    Ok(match state {
        SignatureState::RetryPending => StatusIndicator {
            label: "Needs Retry".to_string(),
            color: StatusColor::Red,
            filter: ListFilter {
                field: "is_retry",
                operator: "=",
                value: "1",
            },
        },
        SignatureState::Fiscalised => StatusIndicator {
            label: "Fiscalised".to_string(),
            color: StatusColor::Green,
            filter: ListFilter {
                field: "fdms_url",
                operator: "is",
                value: "set",
            },
        },
        SignatureState::Failed => StatusIndicator {
            // The literal error text doubles as the label.
            label: record
                .error_message
                .clone()
                .unwrap_or_default(),
            color: StatusColor::Gray,
            filter: ListFilter {
                field: "error",
                operator: "is",
                value: "set",
            },
        },
        SignatureState::Pending | SignatureState::AwaitingSigningData => StatusIndicator {
            label: "Pending FH Response".to_string(),
            color: StatusColor::Orange,
            filter: ListFilter {
                field: "fdms_url",
                operator: "is",
                value: "not set",
            },
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> SignatureRecord {
        SignatureRecord::new("SINV-0001")
    }

    #[test]
    fn retry_takes_priority_over_error() {
        let mut rec = record();
        rec.needs_retry = true;
        rec.error_message = Some("Device offline".to_string());

        let ind = classify(&rec).unwrap();
        assert_eq!(ind.label, "Needs Retry");
        assert_eq!(ind.color, StatusColor::Red);
        assert_eq!(ind.filter.field, "is_retry");
        assert_eq!(ind.filter.operator, "=");
        assert_eq!(ind.filter.value, "1");
    }

    #[test]
    fn signing_url_classifies_fiscalised() {
        let mut rec = record();
        rec.signing_url = Some("https://fdms.example/qr/1".to_string());
        // A stale error must not demote a completed signature.
        rec.error_message = Some("old error".to_string());

        let ind = classify(&rec).unwrap();
        assert_eq!(ind.label, "Fiscalised");
        assert_eq!(ind.color, StatusColor::Green);
        assert_eq!(
            ind.filter,
            ListFilter {
                field: "fdms_url",
                operator: "is",
                value: "set"
            }
        );
    }

    #[test]
    fn error_text_becomes_the_label() {
        let mut rec = record();
        rec.error_message = Some("Invalid buyer TIN".to_string());

        let ind = classify(&rec).unwrap();
        assert_eq!(ind.label, "Invalid buyer TIN");
        assert_eq!(ind.color, StatusColor::Gray);
        assert_eq!(ind.filter.field, "error");
    }

    #[test]
    fn empty_record_is_pending() {
        let ind = classify(&record()).unwrap();
        assert_eq!(ind.label, "Pending FH Response");
        assert_eq!(ind.color, StatusColor::Orange);
        assert_eq!(ind.filter.value, "not set");
    }

    #[test]
    fn indicator_serializes_for_listing_consumers() {
        let mut rec = record();
        rec.needs_retry = true;

        let json = serde_json::to_value(classify(&rec).unwrap()).unwrap();
        assert_eq!(json["label"], "Needs Retry");
        assert_eq!(json["color"], "red");
        assert_eq!(json["filter"]["field"], "is_retry");
    }

    #[test]
    fn exactly_one_branch_for_every_flag_combination() {
        // Total over all valid {needs_retry, url, error} combinations.
        for needs_retry in [false, true] {
            for url in [None, Some("https://fdms.example/qr/1".to_string())] {
                for error in [None, Some("boom".to_string())] {
                    let mut rec = record();
                    rec.needs_retry = needs_retry;
                    rec.signing_url = url.clone();
                    rec.error_message = error.clone();

                    let invalid = needs_retry && url.is_some();
                    match classify(&rec) {
                        Err(_) => assert!(invalid, "only the invariant violation may fail"),
                        Ok(ind) => {
                            assert!(!invalid);
                            let expected = if needs_retry {
                                "Needs Retry".to_string()
                            } else if url.is_some() {
                                "Fiscalised".to_string()
                            } else if let Some(e) = &error {
                                e.clone()
                            } else {
                                "Pending FH Response".to_string()
                            };
                            assert_eq!(ind.label, expected);
                        }
                    }
                }
            }
        }
    }
}
