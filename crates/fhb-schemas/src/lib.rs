//! Shared data model for the Fiscal Harmony bridge.
//!
//! Record and wire types only — no business logic. Lifecycle rules live in
//! `fhb-signature`, payload construction in `fhb-client`.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SignatureRecord
// ---------------------------------------------------------------------------

/// One fiscal-signature record per sales document submitted for signing.
///
/// Serde field names match the storage schema of the originating ERP
/// (`fdms_url`, `is_retry`, ...), so records round-trip unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignatureRecord {
    /// Identifier of the originating sales document. Externally owned;
    /// read-only here.
    pub sales_document: String,
    /// Remote identifier assigned once the service accepts the submission.
    pub fiscal_harmony_id: Option<String>,
    /// URL of the signed fiscal artifact. Presence denotes completion.
    #[serde(rename = "fdms_url")]
    pub signing_url: Option<String>,
    /// Server-set flag: a prior attempt failed in a retryable way.
    #[serde(rename = "is_retry")]
    pub needs_retry: bool,
    /// Last error text returned by the remote service, if any.
    #[serde(rename = "error")]
    pub error_message: Option<String>,
    /// Name of the generated fiscal PDF once available remotely.
    #[serde(rename = "fiscal_harmony_filename")]
    pub attachment_filename: Option<String>,
    /// Verification extras delivered alongside the signing URL.
    pub verification_code: Option<String>,
    pub fiscal_day: Option<i64>,
    pub device_id: Option<i64>,
    pub invoice_number: Option<i64>,
    /// Allows fiscalising a business customer without a TIN on file.
    pub bypass_tin: bool,
}

impl SignatureRecord {
    /// New record for a freshly submitted sales document.
    pub fn new(sales_document: impl Into<String>) -> Self {
        Self {
            sales_document: sales_document.into(),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Status callbacks (webhook + fetch)
// ---------------------------------------------------------------------------

/// QR verification data delivered once a document is fiscalised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QrData {
    pub qr_code_url: String,
    pub verification_code: String,
    pub fiscal_day: i64,
    pub device_id: i64,
    pub invoice_number: i64,
}

/// One status entry as posted by the remote service, either via the
/// webhook or in response to an explicit status fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SignatureCallback {
    /// The remote id the entry refers to (matches `fiscal_harmony_id`).
    pub request_id: String,
    pub success: bool,
    /// True when the failure is one the operator may manually retry.
    pub is_actionable: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub qr_data: Option<QrData>,
    #[serde(default)]
    pub fiscal_invoice_pdf: Option<String>,
}

// ---------------------------------------------------------------------------
// Outbound wire payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BuyerAddress {
    pub province: String,
    pub street: String,
    pub house_no: String,
    pub city: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BuyerContact {
    pub name: String,
    pub address: BuyerAddress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trade_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vat_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LineItem {
    pub description: String,
    pub unit_amount: f64,
    pub tax_code: String,
    pub line_amount: f64,
    /// `None` when the line carries no discount.
    pub discount_amount: Option<f64>,
    pub quantity: f64,
    /// HS code; only populated when HS codes are enabled in settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InvoicePayload {
    pub invoice_id: String,
    pub invoice_number: String,
    pub reference: Option<String>,
    pub is_discounted: bool,
    pub is_tax_inclusive: bool,
    pub buyer_contact: BuyerContact,
    /// Site-local timestamp, `%Y-%m-%dT%H:%M:%S%:z`.
    pub date: String,
    pub line_items: Vec<LineItem>,
    pub sub_total: f64,
    pub total_tax: f64,
    pub total: f64,
    pub currency_code: String,
    pub is_retry: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreditNotePayload {
    pub credit_note_id: String,
    pub credit_note_number: String,
    pub original_invoice_id: String,
    pub reference: Option<String>,
    pub is_tax_inclusive: bool,
    pub buyer_contact: BuyerContact,
    pub date: String,
    pub line_items: Vec<LineItem>,
    pub sub_total: f64,
    pub total_tax: f64,
    pub total: f64,
    pub currency_code: String,
    pub is_retry: bool,
}

/// Either of the two document payload shapes. The variant decides the
/// submission route (`/invoice` vs `/creditnote`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FiscalPayload {
    Invoice(InvoicePayload),
    CreditNote(CreditNotePayload),
}

impl FiscalPayload {
    pub fn is_credit_note(&self) -> bool {
        matches!(self, FiscalPayload::CreditNote(_))
    }
}

// ---------------------------------------------------------------------------
// Mapping tables
// ---------------------------------------------------------------------------

/// Currency mapping row: system currency code → remote currency code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyMapping {
    pub system_currency: String,
    pub fiscal_harmony_currency: String,
    /// Remote row id, assigned on first successful upload.
    pub currency_id: Option<u64>,
}

/// Tax mapping row: tax template name → remote tax id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxMapping {
    pub tax_code: String,
    pub destination_tax_id: String,
    #[serde(default)]
    pub is_default: bool,
    /// Remote row id, assigned on first successful upload.
    pub tax_id: Option<u64>,
}

// ---------------------------------------------------------------------------
// Source document snapshot
// ---------------------------------------------------------------------------

/// One sellable line of a sales document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentLine {
    pub item_code: Option<String>,
    pub item_name: String,
    pub item_group: Option<String>,
    /// Item-level tax template, if any.
    pub item_tax_template: Option<String>,
    pub rate: f64,
    pub amount: f64,
    pub discount_amount: f64,
    pub qty: f64,
    /// HS code set directly on the item, if any.
    pub hs_code: Option<String>,
    /// HS code inherited from the item group, used when the item has none.
    pub group_hs_code: Option<String>,
}

/// Customer details needed to build the buyer contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerInfo {
    /// Display name; may carry a trading name after " t/a ".
    pub name: String,
    /// "Individual" or "Company".
    pub customer_type: String,
    pub tin_number: Option<String>,
    pub tax_id: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub country: String,
    pub address_line1: String,
    pub address_line2: Option<String>,
    pub city: String,
}

/// Snapshot of the sales document being fiscalised. Built by the caller
/// from the ERP's records; this crate never reads business storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesDocument {
    pub id: String,
    /// Purchase-order or return reference, if any.
    pub reference: Option<String>,
    pub is_discounted: bool,
    /// True for credit notes.
    pub is_return: bool,
    /// Original invoice id, required when `is_return`.
    pub return_against: Option<String>,
    pub posting_date: NaiveDate,
    pub posting_time: NaiveTime,
    /// Document-level tax template, if any.
    pub taxes_and_charges: Option<String>,
    pub net_total: f64,
    pub total_taxes_and_charges: f64,
    pub grand_total: f64,
    pub currency: String,
    pub customer: CustomerInfo,
    pub lines: Vec<DocumentLine>,
}

// ---------------------------------------------------------------------------
// Misc
// ---------------------------------------------------------------------------

/// Remote device configuration as returned by `/fiscaldevice`.
/// Shape is service-defined; kept as raw JSON for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// Timestamped marker of the last request the remote service answered
/// successfully. Used for settings display only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LastSuccess {
    pub at_utc: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_parses_pascal_case_wire_shape() {
        let raw = r#"{
            "RequestId": "FH1",
            "Success": true,
            "IsActionable": false,
            "Error": null,
            "QrData": {
                "QrCodeUrl": "https://fdms.example/qr/1",
                "VerificationCode": "ABCD",
                "FiscalDay": 12,
                "DeviceId": 7,
                "InvoiceNumber": 42
            },
            "FiscalInvoicePdf": "INV-0001.pdf"
        }"#;

        let cb: SignatureCallback = serde_json::from_str(raw).unwrap();
        assert_eq!(cb.request_id, "FH1");
        assert!(cb.success);
        let qr = cb.qr_data.unwrap();
        assert_eq!(qr.qr_code_url, "https://fdms.example/qr/1");
        assert_eq!(qr.invoice_number, 42);
        assert_eq!(cb.fiscal_invoice_pdf.as_deref(), Some("INV-0001.pdf"));
    }

    #[test]
    fn record_serializes_with_storage_field_names() {
        let mut rec = SignatureRecord::new("SINV-0001");
        rec.needs_retry = true;
        rec.error_message = Some("Device offline".to_string());

        let v = serde_json::to_value(&rec).unwrap();
        assert_eq!(v["is_retry"], true);
        assert_eq!(v["error"], "Device offline");
        assert!(v["fdms_url"].is_null());
        assert_eq!(v["sales_document"], "SINV-0001");
    }

    #[test]
    fn line_item_omits_product_code_when_absent() {
        let li = LineItem {
            description: "Widget".to_string(),
            unit_amount: 10.0,
            tax_code: "S".to_string(),
            line_amount: 10.0,
            discount_amount: None,
            quantity: 1.0,
            product_code: None,
        };
        let v = serde_json::to_value(&li).unwrap();
        assert!(v.get("ProductCode").is_none());
        // DiscountAmount is always present, null when no discount.
        assert!(v["DiscountAmount"].is_null());
    }
}
