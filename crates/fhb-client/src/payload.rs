//! Fiscal payload construction.
//!
//! Turns a [`SalesDocument`] snapshot into the wire payload the signing
//! service accepts. Credit notes and invoices share line-item and buyer
//! rules but differ in envelope shape and route.

use chrono::LocalResult;
use chrono_tz::Tz;
use fhb_schemas::{
    BuyerAddress, BuyerContact, CreditNotePayload, DocumentLine, FiscalPayload, InvoicePayload,
    LineItem, SalesDocument, SignatureRecord, TaxMapping,
};

/// Why a payload could not be generated. These surface to the operator,
/// so each names the offending document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    /// No tax code resolvable for a line: neither the item template, the
    /// document template, nor a default mapping matched.
    NoTaxMapping { document: String },
    /// HS codes are mandatory but neither the item nor its group has one.
    MissingHsCode { document: String, item: String },
    /// A credit note must reference the invoice it reverses.
    MissingReturnReference { document: String },
    /// The posting date and time do not exist in the site time zone.
    InvalidPostingTime { document: String },
}

impl std::fmt::Display for PayloadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayloadError::NoTaxMapping { document } => write!(
                f,
                "failed to generate fiscal payload for {document}: no tax templates are mapped"
            ),
            PayloadError::MissingHsCode { document, item } => write!(
                f,
                "failed to generate fiscal payload for {document}: missing HS code for item \"{item}\""
            ),
            PayloadError::MissingReturnReference { document } => write!(
                f,
                "credit note {document} does not reference an original invoice"
            ),
            PayloadError::InvalidPostingTime { document } => write!(
                f,
                "posting timestamp of {document} is invalid in the site time zone"
            ),
        }
    }
}

impl std::error::Error for PayloadError {}

/// Build the submission payload for `document`.
///
/// `record` contributes the retry flag and the TIN bypass; `tax_mappings`
/// is the settings table driving tax-code resolution; `hs_codes` controls
/// whether `ProductCode` is populated (and required); `time_zone` is the
/// site time zone used for the posting timestamp.
pub fn build_payload(
    document: &SalesDocument,
    record: &SignatureRecord,
    tax_mappings: &[TaxMapping],
    hs_codes: bool,
    time_zone: Tz,
) -> Result<FiscalPayload, PayloadError> {
    let buyer_contact = buyer_contact(document, record.bypass_tin);
    let line_items = line_items(document, tax_mappings, hs_codes)?;
    let date = posting_timestamp(document, time_zone)?;

    if document.is_return {
        let original = document
            .return_against
            .clone()
            .ok_or_else(|| PayloadError::MissingReturnReference {
                document: document.id.clone(),
            })?;
        Ok(FiscalPayload::CreditNote(CreditNotePayload {
            credit_note_id: document.id.clone(),
            credit_note_number: document.id.clone(),
            original_invoice_id: original,
            reference: document.reference.clone(),
            is_tax_inclusive: true,
            buyer_contact,
            date,
            line_items,
            sub_total: round2(document.net_total.abs()),
            total_tax: round2(document.total_taxes_and_charges.abs()),
            total: round2(document.grand_total.abs()),
            currency_code: document.currency.clone(),
            is_retry: record.needs_retry,
        }))
    } else {
        Ok(FiscalPayload::Invoice(InvoicePayload {
            invoice_id: document.id.clone(),
            invoice_number: document.id.clone(),
            reference: document.reference.clone(),
            is_discounted: document.is_discounted,
            is_tax_inclusive: true,
            buyer_contact,
            date,
            line_items,
            sub_total: round2(document.net_total),
            total_tax: round2(document.total_taxes_and_charges),
            total: round2(document.grand_total),
            currency_code: document.currency.clone(),
            is_retry: record.needs_retry,
        }))
    }
}

fn line_items(
    document: &SalesDocument,
    tax_mappings: &[TaxMapping],
    hs_codes: bool,
) -> Result<Vec<LineItem>, PayloadError> {
    let default_tax_code = tax_mappings
        .iter()
        .find(|m| m.is_default)
        .map(|m| m.tax_code.as_str());
    let mut items = Vec::with_capacity(document.lines.len());
    for line in &document.lines {
        // Item template first, then the document template, then the
        // default mapping.
        let tax_code = mapped(&line.item_tax_template, tax_mappings)
            .or_else(|| mapped(&document.taxes_and_charges, tax_mappings))
            .or(default_tax_code)
            .ok_or_else(|| PayloadError::NoTaxMapping {
                document: document.id.clone(),
            })?;

        let product_code = if hs_codes {
            Some(resolve_hs_code(document, line)?)
        } else {
            None
        };

        let discount = round2(line.discount_amount.abs());
        items.push(LineItem {
            description: line.item_name.clone(),
            unit_amount: round3(line.rate.abs()),
            tax_code: tax_code.to_string(),
            line_amount: round2(line.amount.abs()),
            discount_amount: (discount != 0.0).then_some(discount),
            quantity: round3(line.qty.abs()),
            product_code,
        });
    }
    Ok(items)
}

/// A template name counts only when a mapping row exists for it.
fn mapped<'a>(code: &'a Option<String>, tax_mappings: &[TaxMapping]) -> Option<&'a str> {
    code.as_deref()
        .filter(|c| tax_mappings.iter().any(|m| m.tax_code == *c))
}

/// Item-level HS code wins; the item group's code is the fallback.
fn resolve_hs_code(document: &SalesDocument, line: &DocumentLine) -> Result<String, PayloadError> {
    line.hs_code
        .clone()
        .filter(|c| !c.is_empty())
        .or_else(|| line.group_hs_code.clone().filter(|c| !c.is_empty()))
        .ok_or_else(|| PayloadError::MissingHsCode {
            document: document.id.clone(),
            item: line.item_name.clone(),
        })
}

fn buyer_contact(document: &SalesDocument, bypass_tin: bool) -> BuyerContact {
    let customer = &document.customer;
    // "Acme (Pvt) Ltd t/a Acme Hardware" carries the trading name after
    // the marker.
    let mut names = customer.name.splitn(2, " t/a ");
    let base_name = names.next().unwrap_or_default().to_string();
    let trade_name = names.next().map(str::to_string);

    let mut contact = BuyerContact {
        name: base_name,
        address: BuyerAddress {
            province: customer.country.clone(),
            street: customer
                .address_line2
                .clone()
                .unwrap_or_else(|| customer.address_line1.clone()),
            house_no: customer.address_line1.clone(),
            city: customer.city.clone(),
        },
        trade_name,
        phone: customer.phone.clone(),
        email: customer.email.clone(),
        tin: None,
        vat_number: None,
    };

    if let Some(tin) = customer.tin_number.as_deref().filter(|t| !t.is_empty()) {
        contact.tin = Some(tin.to_string());
        contact.vat_number = customer.tax_id.clone().filter(|t| !t.is_empty());
    } else if (customer.customer_type == "Individual" || bypass_tin)
        && !contact.name.starts_with("Cash ")
    {
        contact.name = format!("Cash {}", contact.name);
    }

    contact
}

/// Site-local posting timestamp, `%Y-%m-%dT%H:%M:%S%:z`.
fn posting_timestamp(document: &SalesDocument, time_zone: Tz) -> Result<String, PayloadError> {
    let naive = document.posting_date.and_time(document.posting_time);
    let local = match naive.and_local_timezone(time_zone) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt,
        LocalResult::None => {
            return Err(PayloadError::InvalidPostingTime {
                document: document.id.clone(),
            })
        }
    };
    Ok(local.format("%Y-%m-%dT%H:%M:%S%:z").to_string())
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};
    use fhb_schemas::CustomerInfo;

    fn mappings() -> Vec<TaxMapping> {
        vec![
            TaxMapping {
                tax_code: "ZW VAT 15%".to_string(),
                destination_tax_id: "1".to_string(),
                is_default: true,
                tax_id: Some(11),
            },
            TaxMapping {
                tax_code: "ZW Zero Rated".to_string(),
                destination_tax_id: "2".to_string(),
                is_default: false,
                tax_id: Some(12),
            },
        ]
    }

    fn customer() -> CustomerInfo {
        CustomerInfo {
            name: "Acme (Pvt) Ltd t/a Acme Hardware".to_string(),
            customer_type: "Company".to_string(),
            tin_number: Some("1234567890".to_string()),
            tax_id: Some("212345678".to_string()),
            phone: Some("+263771234567".to_string()),
            email: Some("accounts@acme.co.zw".to_string()),
            country: "Zimbabwe".to_string(),
            address_line1: "12 Samora Machel Ave".to_string(),
            address_line2: Some("Eastlea".to_string()),
            city: "Harare".to_string(),
        }
    }

    fn line() -> DocumentLine {
        DocumentLine {
            item_code: Some("WID-01".to_string()),
            item_name: "Widget".to_string(),
            item_group: Some("Hardware".to_string()),
            item_tax_template: None,
            rate: 10.5001,
            amount: 21.0,
            discount_amount: 0.0,
            qty: 2.0,
            hs_code: Some("85044090".to_string()),
            group_hs_code: Some("85040000".to_string()),
        }
    }

    fn document() -> SalesDocument {
        SalesDocument {
            id: "SINV-0042".to_string(),
            reference: Some("PO-881".to_string()),
            is_discounted: false,
            is_return: false,
            return_against: None,
            posting_date: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            posting_time: NaiveTime::from_hms_opt(14, 30, 0).unwrap(),
            taxes_and_charges: Some("ZW Zero Rated".to_string()),
            net_total: 21.0,
            total_taxes_and_charges: 0.0,
            grand_total: 21.0,
            currency: "USD".to_string(),
            customer: customer(),
            lines: vec![line()],
        }
    }

    fn build(doc: &SalesDocument, record: &SignatureRecord, hs: bool) -> FiscalPayload {
        build_payload(doc, record, &mappings(), hs, chrono_tz::Africa::Harare).unwrap()
    }

    #[test]
    fn invoice_envelope_and_timestamp() {
        let payload = build(&document(), &SignatureRecord::new("SINV-0042"), false);
        let FiscalPayload::Invoice(inv) = payload else {
            panic!("expected invoice");
        };
        assert_eq!(inv.invoice_id, "SINV-0042");
        assert_eq!(inv.date, "2024-03-15T14:30:00+02:00");
        assert!(inv.is_tax_inclusive);
        assert!(!inv.is_retry);
        assert_eq!(inv.line_items[0].unit_amount, 10.5);
        assert_eq!(inv.line_items[0].discount_amount, None);
    }

    #[test]
    fn tax_code_falls_back_item_then_document_then_default() {
        let mut doc = document();

        // Document template matches a mapping.
        let payload = build(&doc, &SignatureRecord::new("SINV-0042"), false);
        let FiscalPayload::Invoice(inv) = payload else {
            panic!("expected invoice");
        };
        assert_eq!(inv.line_items[0].tax_code, "ZW Zero Rated");

        // Item template wins over the document template.
        doc.lines[0].item_tax_template = Some("ZW VAT 15%".to_string());
        let FiscalPayload::Invoice(inv) = build(&doc, &SignatureRecord::new("SINV-0042"), false)
        else {
            panic!("expected invoice");
        };
        assert_eq!(inv.line_items[0].tax_code, "ZW VAT 15%");

        // Neither matches: the default mapping applies.
        doc.lines[0].item_tax_template = Some("Unmapped".to_string());
        doc.taxes_and_charges = Some("Also Unmapped".to_string());
        let FiscalPayload::Invoice(inv) = build(&doc, &SignatureRecord::new("SINV-0042"), false)
        else {
            panic!("expected invoice");
        };
        assert_eq!(inv.line_items[0].tax_code, "ZW VAT 15%");
    }

    #[test]
    fn no_resolvable_tax_code_is_an_error() {
        let mut doc = document();
        doc.taxes_and_charges = None;
        let no_default: Vec<TaxMapping> = mappings()
            .into_iter()
            .map(|mut m| {
                m.is_default = false;
                m
            })
            .collect();
        let err = build_payload(
            &doc,
            &SignatureRecord::new("SINV-0042"),
            &no_default,
            false,
            chrono_tz::Africa::Harare,
        )
        .unwrap_err();
        assert_eq!(
            err,
            PayloadError::NoTaxMapping {
                document: "SINV-0042".to_string()
            }
        );
    }

    #[test]
    fn hs_code_required_only_when_enabled() {
        let mut doc = document();
        let FiscalPayload::Invoice(inv) = build(&doc, &SignatureRecord::new("SINV-0042"), true)
        else {
            panic!("expected invoice");
        };
        assert_eq!(inv.line_items[0].product_code.as_deref(), Some("85044090"));

        // Item code missing: the group's code is the fallback.
        doc.lines[0].hs_code = None;
        let FiscalPayload::Invoice(inv) = build(&doc, &SignatureRecord::new("SINV-0042"), true)
        else {
            panic!("expected invoice");
        };
        assert_eq!(inv.line_items[0].product_code.as_deref(), Some("85040000"));

        doc.lines[0].group_hs_code = None;
        let err = build_payload(
            &doc,
            &SignatureRecord::new("SINV-0042"),
            &mappings(),
            true,
            chrono_tz::Africa::Harare,
        )
        .unwrap_err();
        assert_eq!(
            err,
            PayloadError::MissingHsCode {
                document: "SINV-0042".to_string(),
                item: "Widget".to_string()
            }
        );

        // Disabled: the missing code is not an error and nothing is sent.
        let FiscalPayload::Invoice(inv) = build(&doc, &SignatureRecord::new("SINV-0042"), false)
        else {
            panic!("expected invoice");
        };
        assert_eq!(inv.line_items[0].product_code, None);
    }

    #[test]
    fn trade_name_splits_and_tin_carries_vat_number() {
        let payload = build(&document(), &SignatureRecord::new("SINV-0042"), false);
        let FiscalPayload::Invoice(inv) = payload else {
            panic!("expected invoice");
        };
        assert_eq!(inv.buyer_contact.name, "Acme (Pvt) Ltd");
        assert_eq!(inv.buyer_contact.trade_name.as_deref(), Some("Acme Hardware"));
        assert_eq!(inv.buyer_contact.tin.as_deref(), Some("1234567890"));
        assert_eq!(inv.buyer_contact.vat_number.as_deref(), Some("212345678"));
    }

    #[test]
    fn individual_without_tin_gets_cash_prefix_once() {
        let mut doc = document();
        doc.customer.name = "Jane Moyo".to_string();
        doc.customer.customer_type = "Individual".to_string();
        doc.customer.tin_number = None;
        let FiscalPayload::Invoice(inv) = build(&doc, &SignatureRecord::new("SINV-0042"), false)
        else {
            panic!("expected invoice");
        };
        assert_eq!(inv.buyer_contact.name, "Cash Jane Moyo");
        assert_eq!(inv.buyer_contact.tin, None);

        // Already prefixed: no doubling.
        doc.customer.name = "Cash Jane Moyo".to_string();
        let FiscalPayload::Invoice(inv) = build(&doc, &SignatureRecord::new("SINV-0042"), false)
        else {
            panic!("expected invoice");
        };
        assert_eq!(inv.buyer_contact.name, "Cash Jane Moyo");
    }

    #[test]
    fn company_without_tin_needs_the_bypass_to_go_cash() {
        let mut doc = document();
        doc.customer.tin_number = None;
        let FiscalPayload::Invoice(inv) = build(&doc, &SignatureRecord::new("SINV-0042"), false)
        else {
            panic!("expected invoice");
        };
        assert_eq!(inv.buyer_contact.name, "Acme (Pvt) Ltd");

        let mut record = SignatureRecord::new("SINV-0042");
        record.bypass_tin = true;
        let FiscalPayload::Invoice(inv) = build(&doc, &record, false) else {
            panic!("expected invoice");
        };
        assert_eq!(inv.buyer_contact.name, "Cash Acme (Pvt) Ltd");
    }

    #[test]
    fn credit_note_uses_absolute_amounts_and_original_reference() {
        let mut doc = document();
        doc.is_return = true;
        doc.return_against = Some("SINV-0040".to_string());
        doc.net_total = -21.0;
        doc.total_taxes_and_charges = -3.15;
        doc.grand_total = -24.15;
        doc.lines[0].qty = -2.0;
        doc.lines[0].amount = -21.0;

        let payload = build(&doc, &SignatureRecord::new("SINV-0042"), false);
        let FiscalPayload::CreditNote(cn) = payload else {
            panic!("expected credit note");
        };
        assert_eq!(cn.original_invoice_id, "SINV-0040");
        assert_eq!(cn.sub_total, 21.0);
        assert_eq!(cn.total_tax, 3.15);
        assert_eq!(cn.total, 24.15);
        assert_eq!(cn.line_items[0].quantity, 2.0);
        assert_eq!(cn.line_items[0].line_amount, 21.0);
    }

    #[test]
    fn credit_note_without_original_invoice_is_rejected() {
        let mut doc = document();
        doc.is_return = true;
        let err = build_payload(
            &doc,
            &SignatureRecord::new("SINV-0042"),
            &mappings(),
            false,
            chrono_tz::Africa::Harare,
        )
        .unwrap_err();
        assert_eq!(
            err,
            PayloadError::MissingReturnReference {
                document: "SINV-0042".to_string()
            }
        );
    }

    #[test]
    fn zero_discount_serializes_as_null() {
        let payload = build(&document(), &SignatureRecord::new("SINV-0042"), false);
        let FiscalPayload::Invoice(inv) = payload else {
            panic!("expected invoice");
        };
        let v = serde_json::to_value(&inv).unwrap();
        assert!(v["LineItems"][0]["DiscountAmount"].is_null());
    }
}
