//! Prompts sent to the vision model.
//!
//! Both prompts demand raw JSON without commentary; the client still strips
//! markdown code fences because models add them anyway.

/// Full-extraction prompt: every bill field plus the line item table.
pub const BILL_EXTRACTION_PROMPT: &str = r#"You are reading a scanned telecom/ISP invoice. Extract the billing data and respond with a single JSON object, no markdown, no commentary:

{
  "accountNumber": "the service account number, e.g. BA11639924",
  "invoiceNumber": "the invoice/bill number, e.g. B1-176644802",
  "billingPeriodStart": "YYYY-MM-DD",
  "billingPeriodEnd": "YYYY-MM-DD",
  "billDate": "YYYY-MM-DD",
  "dueDate": "YYYY-MM-DD or omit if absent",
  "currentCharges": 0.0,
  "outstanding": 0.0,
  "gstAmount": 0.0,
  "totalDue": 0.0,
  "discounts": 0.0,
  "lineItems": [
    {
      "serviceNumber": "the billed service/phone number",
      "packageName": "the plan or package name",
      "subscriptionCharge": 0.0,
      "usageCharges": 0.0,
      "otherCharges": 0.0,
      "totalCharge": 0.0
    }
  ],
  "confidence": 0
}

Rules:
- All monetary values are plain numbers (no currency symbols, no thousands separators).
- Include every line item in the services table, one entry per service number.
- "confidence" is your 0-100 estimate of extraction accuracy.
- If a field is unreadable, use your best guess and lower the confidence."#;

/// Note appended when the bill spans multiple pages.
pub const MULTI_PAGE_NOTE: &str =
    "\n\nNOTE: This bill has multiple pages. Extract information from ALL pages.";

/// Quick-scan prompt: identity fields only, from the first page.
pub const QUICK_SCAN_PROMPT: &str = r#"You are reading the first page of a scanned telecom/ISP invoice. Extract ONLY the identity fields and respond with a single JSON object, no markdown, no commentary:

{
  "invoiceNumber": "the invoice/bill number",
  "accountNumber": "the service account number",
  "confidence": 0
}

"confidence" is your 0-100 estimate. Do not extract any other field."#;
