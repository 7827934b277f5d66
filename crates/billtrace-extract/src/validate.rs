//! Extraction result validation.
//!
//! The vision model returns loosely-shaped JSON; nothing downstream touches
//! it until this module has turned it into a typed [`BillExtraction`]. Every
//! violation names the offending field, and a failed validation means the
//! pipeline never reaches persistence.

use chrono::NaiveDate;
use serde_json::Value;

use billtrace_core::{defaults, BillExtraction, Error, LineItemExtraction, Result};

/// Validate a raw extraction payload and produce the typed result.
pub fn validate_extraction(raw: &Value) -> Result<BillExtraction> {
    let obj = raw
        .as_object()
        .ok_or_else(|| Error::Validation("extraction payload must be a JSON object".into()))?;

    let account_number = require_string(obj, "accountNumber")?;
    let invoice_number = require_string(obj, "invoiceNumber")?;
    let billing_period_start = require_date(obj, "billingPeriodStart")?;
    let billing_period_end = require_date(obj, "billingPeriodEnd")?;
    let bill_date = require_date(obj, "billDate")?;
    let due_date = optional_date(obj, "dueDate")?;

    let current_charges = require_number(obj, "currentCharges")?;
    let outstanding = require_number(obj, "outstanding")?;
    let gst_amount = require_number(obj, "gstAmount")?;
    let total_due = require_number(obj, "totalDue")?;
    let discounts = optional_number(obj, "discounts")?.unwrap_or(0.0);

    let confidence = require_number(obj, "confidence")?;
    if !(0.0..=100.0).contains(&confidence) {
        return Err(Error::Validation(
            "confidence must be a number between 0 and 100".into(),
        ));
    }

    let raw_items = obj
        .get("lineItems")
        .ok_or_else(|| Error::Validation("Missing required field: lineItems".into()))?
        .as_array()
        .ok_or_else(|| Error::Validation("lineItems must be an array".into()))?;

    let mut line_items = Vec::with_capacity(raw_items.len());
    for (index, raw_item) in raw_items.iter().enumerate() {
        line_items.push(validate_line_item(raw_item, index)?);
    }

    Ok(BillExtraction {
        account_number,
        invoice_number,
        billing_period_start,
        billing_period_end,
        bill_date,
        due_date,
        current_charges,
        outstanding,
        gst_amount,
        total_due,
        discounts,
        line_items,
        confidence: confidence.round() as i32,
    })
}

fn validate_line_item(raw: &Value, index: usize) -> Result<LineItemExtraction> {
    let obj = raw.as_object().ok_or_else(|| {
        Error::Validation(format!("lineItems[{}] must be a JSON object", index))
    })?;

    let field = |name: &str| format!("lineItems[{}].{}", index, name);

    let service_number = obj
        .get("serviceNumber")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Validation(format!("Missing required field: {}", field("serviceNumber"))))?
        .to_string();
    let package_name = obj
        .get("packageName")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Validation(format!("Missing required field: {}", field("packageName"))))?
        .to_string();

    let charge = |name: &str| -> Result<f64> {
        let value = obj
            .get(name)
            .and_then(Value::as_f64)
            .ok_or_else(|| Error::Validation(format!("{} must be a number", field(name))))?;
        if value < 0.0 {
            return Err(Error::Validation(format!(
                "{} must not be negative",
                field(name)
            )));
        }
        Ok(value)
    };

    let subscription_charge = charge("subscriptionCharge")?;
    let usage_charges = charge("usageCharges")?;
    let other_charges = match obj.get("otherCharges") {
        Some(_) => charge("otherCharges")?,
        None => 0.0,
    };
    let total_charge = charge("totalCharge")?;

    Ok(LineItemExtraction {
        service_number,
        package_name,
        subscription_charge,
        usage_charges,
        other_charges,
        total_charge,
        service_period_start: optional_date(obj, "servicePeriodStart")?,
        service_period_end: optional_date(obj, "servicePeriodEnd")?,
        usage_details: obj.get("usageDetails").cloned(),
    })
}

fn require_string(obj: &serde_json::Map<String, Value>, field: &str) -> Result<String> {
    obj.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::Validation(format!("Missing required field: {}", field)))
}

fn require_number(obj: &serde_json::Map<String, Value>, field: &str) -> Result<f64> {
    match obj.get(field) {
        Some(value) => value
            .as_f64()
            .ok_or_else(|| Error::Validation(format!("{} must be a number", field))),
        None => Err(Error::Validation(format!(
            "Missing required field: {}",
            field
        ))),
    }
}

fn optional_number(obj: &serde_json::Map<String, Value>, field: &str) -> Result<Option<f64>> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_f64()
            .map(Some)
            .ok_or_else(|| Error::Validation(format!("{} must be a number", field))),
    }
}

fn require_date(obj: &serde_json::Map<String, Value>, field: &str) -> Result<NaiveDate> {
    let text = obj
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Validation(format!("Missing required field: {}", field)))?;
    parse_date(text, field)
}

fn optional_date(obj: &serde_json::Map<String, Value>, field: &str) -> Result<Option<NaiveDate>> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => {
            let text = value
                .as_str()
                .ok_or_else(|| Error::Validation(format!("{} must be a string", field)))?;
            if text.is_empty() {
                return Ok(None);
            }
            parse_date(text, field).map(Some)
        }
    }
}

fn parse_date(text: &str, field: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map_err(|_| Error::Validation(format!("{} must be in YYYY-MM-DD format", field)))
}

/// Whether the line item totals are consistent with the bill totals.
///
/// Line items carry the pre-tax service charges, so their sum is compared
/// against `total_due − gst − outstanding + discounts`. Tolerance scales
/// with the item count because each amount is independently rounded to
/// cents by the extractor.
pub fn line_items_sum_consistent(extraction: &BillExtraction) -> bool {
    let item_sum: f64 = extraction.line_items.iter().map(|i| i.total_charge).sum();
    let expected = extraction.total_due - extraction.gst_amount - extraction.outstanding
        + extraction.discounts;
    let tolerance = defaults::CHARGE_TOLERANCE * extraction.line_items.len().max(1) as f64;
    (item_sum - expected).abs() <= tolerance
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_payload() -> Value {
        json!({
            "accountNumber": "BA11639924",
            "invoiceNumber": "B1-176644802",
            "billingPeriodStart": "2026-01-01",
            "billingPeriodEnd": "2026-01-31",
            "billDate": "2026-02-01",
            "currentCharges": 950.0,
            "outstanding": 0.0,
            "gstAmount": 76.0,
            "totalDue": 1026.0,
            "lineItems": [
                {
                    "serviceNumber": "7771234",
                    "packageName": "Fibre 100M",
                    "subscriptionCharge": 800.0,
                    "usageCharges": 150.0,
                    "otherCharges": 0.0,
                    "totalCharge": 950.0
                }
            ],
            "confidence": 92
        })
    }

    #[test]
    fn test_valid_payload_passes() {
        let extraction = validate_extraction(&valid_payload()).unwrap();
        assert_eq!(extraction.invoice_number, "B1-176644802");
        assert_eq!(extraction.line_items.len(), 1);
        assert_eq!(extraction.confidence, 92);
        assert_eq!(extraction.discounts, 0.0);
        assert_eq!(
            extraction.billing_period_start,
            NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()
        );
    }

    #[test]
    fn test_each_missing_required_field_is_named() {
        for field in [
            "accountNumber",
            "invoiceNumber",
            "billingPeriodStart",
            "billingPeriodEnd",
            "billDate",
            "currentCharges",
            "outstanding",
            "gstAmount",
            "totalDue",
            "lineItems",
            "confidence",
        ] {
            let mut payload = valid_payload();
            payload.as_object_mut().unwrap().remove(field);
            let err = validate_extraction(&payload).unwrap_err();
            assert_eq!(err.kind(), "validation", "field {}", field);
            assert!(err.to_string().contains(field), "field {}: {}", field, err);
        }
    }

    #[test]
    fn test_empty_line_items_is_valid() {
        let mut payload = valid_payload();
        payload["lineItems"] = json!([]);
        let extraction = validate_extraction(&payload).unwrap();
        assert!(extraction.line_items.is_empty());
    }

    #[test]
    fn test_line_items_must_be_array() {
        let mut payload = valid_payload();
        payload["lineItems"] = json!("none");
        let err = validate_extraction(&payload).unwrap_err();
        assert!(err.to_string().contains("lineItems must be an array"));
    }

    #[test]
    fn test_bad_date_format_rejected() {
        let mut payload = valid_payload();
        payload["billDate"] = json!("01/02/2026");
        let err = validate_extraction(&payload).unwrap_err();
        assert!(err.to_string().contains("billDate"));
        assert!(err.to_string().contains("YYYY-MM-DD"));
    }

    #[test]
    fn test_confidence_out_of_range_rejected() {
        for bad in [-1, 101, 250] {
            let mut payload = valid_payload();
            payload["confidence"] = json!(bad);
            let err = validate_extraction(&payload).unwrap_err();
            assert!(err.to_string().contains("confidence"));
        }
    }

    #[test]
    fn test_non_numeric_money_rejected() {
        let mut payload = valid_payload();
        payload["totalDue"] = json!("MVR 1,026.00");
        let err = validate_extraction(&payload).unwrap_err();
        assert!(err.to_string().contains("totalDue must be a number"));
    }

    #[test]
    fn test_negative_line_item_charge_rejected() {
        let mut payload = valid_payload();
        payload["lineItems"][0]["usageCharges"] = json!(-4.5);
        let err = validate_extraction(&payload).unwrap_err();
        assert!(err.to_string().contains("lineItems[0].usageCharges"));
    }

    #[test]
    fn test_line_item_missing_service_number_is_named_with_index() {
        let mut payload = valid_payload();
        payload["lineItems"][0].as_object_mut().unwrap().remove("serviceNumber");
        let err = validate_extraction(&payload).unwrap_err();
        assert!(err.to_string().contains("lineItems[0].serviceNumber"));
    }

    #[test]
    fn test_missing_other_charges_defaults_to_zero() {
        let mut payload = valid_payload();
        payload["lineItems"][0].as_object_mut().unwrap().remove("otherCharges");
        let extraction = validate_extraction(&payload).unwrap();
        assert_eq!(extraction.line_items[0].other_charges, 0.0);
    }

    #[test]
    fn test_sum_consistency_within_tolerance() {
        let extraction = validate_extraction(&valid_payload()).unwrap();
        // 950.00 item sum vs 1026 - 76 - 0 + 0 = 950.00
        assert!(line_items_sum_consistent(&extraction));
    }

    #[test]
    fn test_sum_consistency_allows_cent_drift() {
        let mut payload = valid_payload();
        payload["lineItems"][0]["totalCharge"] = json!(950.04);
        let extraction = validate_extraction(&payload).unwrap();
        assert!(line_items_sum_consistent(&extraction));
    }

    #[test]
    fn test_sum_consistency_catches_real_mismatch() {
        let mut payload = valid_payload();
        payload["lineItems"][0]["totalCharge"] = json!(800.0);
        let extraction = validate_extraction(&payload).unwrap();
        assert!(!line_items_sum_consistent(&extraction));
    }
}
