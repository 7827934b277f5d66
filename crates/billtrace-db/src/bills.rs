//! Bill repository.
//!
//! `create_from_extraction` is the only write path that creates bills: the
//! bill row and all of its line items commit in a single transaction, or not
//! at all.

use chrono::NaiveDate;
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use billtrace_core::{
    Bill, BillComparison, BillExtraction, BillStatus, Error, LineItem, Result,
};

use crate::is_unique_violation;

const BILL_COLUMNS: &str = "id, service_account_id, invoice_number, account_number, \
     billing_period_start, billing_period_end, bill_date, due_date, \
     current_charges, outstanding_amount, gst_amount, total_due, discounts, \
     file_path, file_name, file_size_bytes, content_hash, \
     processing_status, extraction_confidence, extracted_data, \
     requires_review, is_verified, created_at, updated_at, processed_at";

const LINE_ITEM_COLUMNS: &str = "id, bill_id, service_number, package_name, \
     subscription_charge, usage_charges, other_charges, total_charge, \
     service_period_start, service_period_end, usage_details, created_at";

/// Source-file identity recorded on a bill.
#[derive(Debug, Clone)]
pub struct BillFileInfo {
    pub file_path: String,
    pub file_name: String,
    pub file_size_bytes: Option<i64>,
    /// `blake3:{hex}` of the uploaded bytes, when stored through the
    /// content-addressed file store.
    pub content_hash: Option<String>,
}

/// PostgreSQL implementation of the bill repository.
pub struct PgBillRepository {
    pool: PgPool,
}

impl PgBillRepository {
    /// Create a new PgBillRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a bill by ID.
    pub async fn get(&self, id: Uuid) -> Result<Bill> {
        let row = sqlx::query(&format!("SELECT {} FROM bills WHERE id = $1", BILL_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(Error::BillNotFound(id))?;

        Ok(bill_from_row(&row))
    }

    /// Look up a bill by invoice number.
    pub async fn get_by_invoice_number(&self, invoice_number: &str) -> Result<Option<Bill>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM bills WHERE invoice_number = $1",
            BILL_COLUMNS
        ))
        .bind(invoice_number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| bill_from_row(&r)))
    }

    /// Look up a bill by original file name.
    pub async fn get_by_file_name(&self, file_name: &str) -> Result<Option<Bill>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM bills WHERE file_name = $1 ORDER BY created_at LIMIT 1",
            BILL_COLUMNS
        ))
        .bind(file_name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| bill_from_row(&r)))
    }

    /// Look up a bill by source-file content hash.
    pub async fn get_by_content_hash(&self, content_hash: &str) -> Result<Option<Bill>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM bills WHERE content_hash = $1 ORDER BY created_at LIMIT 1",
            BILL_COLUMNS
        ))
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| bill_from_row(&r)))
    }

    /// Look up a completed bill on an account covering exactly the given
    /// billing period.
    pub async fn get_by_billing_period(
        &self,
        account_id: Uuid,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> Result<Option<Bill>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM bills \
             WHERE service_account_id = $1 \
               AND billing_period_start = $2 \
               AND billing_period_end = $3 \
               AND processing_status = 'completed' \
             LIMIT 1",
            BILL_COLUMNS
        ))
        .bind(account_id)
        .bind(period_start)
        .bind(period_end)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| bill_from_row(&r)))
    }

    /// Most recent bills, newest bill date first.
    pub async fn list_recent(&self, limit: i64) -> Result<Vec<Bill>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM bills ORDER BY bill_date DESC LIMIT $1",
            BILL_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(bill_from_row).collect())
    }

    /// All bills for one account, newest bill date first.
    pub async fn list_for_account(&self, account_id: Uuid) -> Result<Vec<Bill>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM bills WHERE service_account_id = $1 ORDER BY bill_date DESC",
            BILL_COLUMNS
        ))
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(bill_from_row).collect())
    }

    /// Bills flagged for manual review, newest first.
    pub async fn requiring_review(&self) -> Result<Vec<Bill>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM bills WHERE requires_review = TRUE ORDER BY created_at DESC",
            BILL_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(bill_from_row).collect())
    }

    /// Persist a validated extraction as a bill plus its line items, in one
    /// transaction.
    ///
    /// With a resolved account the bill lands `completed`; without one it
    /// lands `review_required` with the review flag set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyExists`] when the invoice number is taken
    /// (duplicate slipping past a skipped check still cannot double-persist).
    pub async fn create_from_extraction(
        &self,
        extraction: &BillExtraction,
        raw_payload: serde_json::Value,
        file: &BillFileInfo,
        account_id: Option<Uuid>,
    ) -> Result<(Bill, Vec<LineItem>)> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let bill_id = Uuid::now_v7();
        let status = if account_id.is_some() {
            BillStatus::Completed
        } else {
            BillStatus::ReviewRequired
        };

        let bill_row = sqlx::query(&format!(
            "INSERT INTO bills (\
                id, service_account_id, invoice_number, account_number, \
                billing_period_start, billing_period_end, bill_date, due_date, \
                current_charges, outstanding_amount, gst_amount, total_due, discounts, \
                file_path, file_name, file_size_bytes, content_hash, \
                processing_status, extraction_confidence, extracted_data, \
                requires_review, processed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, \
                     $14, $15, $16, $17, $18, $19, $20, $21, NOW()) \
             RETURNING {}",
            BILL_COLUMNS
        ))
        .bind(bill_id)
        .bind(account_id)
        .bind(&extraction.invoice_number)
        .bind(&extraction.account_number)
        .bind(extraction.billing_period_start)
        .bind(extraction.billing_period_end)
        .bind(extraction.bill_date)
        .bind(extraction.due_date)
        .bind(extraction.current_charges)
        .bind(extraction.outstanding)
        .bind(extraction.gst_amount)
        .bind(extraction.total_due)
        .bind(extraction.discounts)
        .bind(&file.file_path)
        .bind(&file.file_name)
        .bind(file.file_size_bytes)
        .bind(&file.content_hash)
        .bind(status.as_str())
        .bind(extraction.confidence)
        .bind(&raw_payload)
        .bind(account_id.is_none())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::AlreadyExists(format!(
                    "Invoice {} already exists",
                    extraction.invoice_number
                ))
            } else {
                Error::Database(e)
            }
        })?;

        let mut line_items = Vec::with_capacity(extraction.line_items.len());
        for item in &extraction.line_items {
            let row = sqlx::query(&format!(
                "INSERT INTO line_items (\
                    id, bill_id, service_number, package_name, \
                    subscription_charge, usage_charges, other_charges, total_charge, \
                    service_period_start, service_period_end, usage_details) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
                 RETURNING {}",
                LINE_ITEM_COLUMNS
            ))
            .bind(Uuid::now_v7())
            .bind(bill_id)
            .bind(&item.service_number)
            .bind(&item.package_name)
            .bind(item.subscription_charge)
            .bind(item.usage_charges)
            .bind(item.other_charges)
            .bind(item.total_charge)
            .bind(item.service_period_start)
            .bind(item.service_period_end)
            .bind(&item.usage_details)
            .fetch_one(&mut *tx)
            .await?;

            line_items.push(line_item_from_row(&row));
        }

        tx.commit().await.map_err(Error::Database)?;

        info!(
            subsystem = "db",
            component = "bills",
            op = "create",
            bill_id = %bill_id,
            invoice_number = %extraction.invoice_number,
            line_item_count = line_items.len(),
            "Bill persisted"
        );

        Ok((bill_from_row(&bill_row), line_items))
    }

    /// Link a bill to an account, completing it and clearing the review flag.
    pub async fn link_to_account(&self, bill_id: Uuid, account_id: Uuid) -> Result<Bill> {
        let row = sqlx::query(&format!(
            "UPDATE bills \
             SET service_account_id = $2, \
                 processing_status = 'completed', \
                 requires_review = FALSE, \
                 updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {}",
            BILL_COLUMNS
        ))
        .bind(bill_id)
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(Error::BillNotFound(bill_id))?;

        Ok(bill_from_row(&row))
    }

    /// Mark a bill as human-verified.
    pub async fn verify(&self, bill_id: Uuid) -> Result<Bill> {
        let row = sqlx::query(&format!(
            "UPDATE bills \
             SET is_verified = TRUE, requires_review = FALSE, updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {}",
            BILL_COLUMNS
        ))
        .bind(bill_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(Error::BillNotFound(bill_id))?;

        Ok(bill_from_row(&row))
    }

    /// Delete a bill (line items cascade).
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM bills WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::BillNotFound(id));
        }
        Ok(())
    }

    /// Line items for a bill, ordered by service number.
    pub async fn line_items(&self, bill_id: Uuid) -> Result<Vec<LineItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM line_items WHERE bill_id = $1 ORDER BY service_number",
            LINE_ITEM_COLUMNS
        ))
        .bind(bill_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(line_item_from_row).collect())
    }

    /// The most recent completed bill on the account whose billing period
    /// started before `before_start`. Ties on start date break toward the
    /// most recently created row.
    pub async fn previous_completed_bill(
        &self,
        account_id: Uuid,
        before_start: NaiveDate,
    ) -> Result<Option<Bill>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM bills \
             WHERE service_account_id = $1 \
               AND billing_period_start < $2 \
               AND processing_status = 'completed' \
             ORDER BY billing_period_start DESC, created_at DESC \
             LIMIT 1",
            BILL_COLUMNS
        ))
        .bind(account_id)
        .bind(before_start)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| bill_from_row(&r)))
    }

    /// Compare a bill against a previous one (explicit id, or the most
    /// recent prior completed bill on the same account).
    pub async fn compare(
        &self,
        current_bill_id: Uuid,
        previous_bill_id: Option<Uuid>,
    ) -> Result<BillComparison> {
        let current = self.get(current_bill_id).await?;

        let previous = match previous_bill_id {
            Some(id) => Some(self.get(id).await?),
            None => match current.service_account_id {
                Some(account_id) => {
                    self.previous_completed_bill(account_id, current.billing_period_start)
                        .await?
                }
                None => None,
            },
        };

        let Some(previous) = previous else {
            return Ok(BillComparison {
                current_bill: current,
                previous_bill: None,
                difference: 0.0,
                percentage_change: 0.0,
                has_increased: false,
                new_line_items: Vec::new(),
                removed_line_items: Vec::new(),
            });
        };

        let difference = current.total_due - previous.total_due;
        let percentage_change = if previous.total_due != 0.0 {
            (difference / previous.total_due) * 100.0
        } else {
            0.0
        };

        let current_items = self.line_items(current.id).await?;
        let previous_items = self.line_items(previous.id).await?;

        let current_numbers: std::collections::HashSet<&str> = current_items
            .iter()
            .map(|i| i.service_number.as_str())
            .collect();
        let previous_numbers: std::collections::HashSet<&str> = previous_items
            .iter()
            .map(|i| i.service_number.as_str())
            .collect();

        let new_line_items = current_items
            .iter()
            .filter(|i| !previous_numbers.contains(i.service_number.as_str()))
            .map(|i| i.service_number.clone())
            .collect();
        let removed_line_items = previous_items
            .iter()
            .filter(|i| !current_numbers.contains(i.service_number.as_str()))
            .map(|i| i.service_number.clone())
            .collect();

        Ok(BillComparison {
            current_bill: current,
            previous_bill: Some(previous),
            difference,
            percentage_change,
            has_increased: difference > 0.0,
            new_line_items,
            removed_line_items,
        })
    }
}

/// Parse bill processing status from its database string.
pub(crate) fn parse_bill_status(s: &str) -> BillStatus {
    match s {
        "pending" => BillStatus::Pending,
        "processing" => BillStatus::Processing,
        "completed" => BillStatus::Completed,
        "failed" => BillStatus::Failed,
        "review_required" => BillStatus::ReviewRequired,
        _ => BillStatus::Pending,
    }
}

/// Convert a database row to a Bill.
pub(crate) fn bill_from_row(row: &sqlx::postgres::PgRow) -> Bill {
    Bill {
        id: row.get("id"),
        service_account_id: row.get("service_account_id"),
        invoice_number: row.get("invoice_number"),
        account_number: row.get("account_number"),
        billing_period_start: row.get("billing_period_start"),
        billing_period_end: row.get("billing_period_end"),
        bill_date: row.get("bill_date"),
        due_date: row.get("due_date"),
        current_charges: row.get("current_charges"),
        outstanding_amount: row.get("outstanding_amount"),
        gst_amount: row.get("gst_amount"),
        total_due: row.get("total_due"),
        discounts: row.get("discounts"),
        file_path: row.get("file_path"),
        file_name: row.get("file_name"),
        file_size_bytes: row.get("file_size_bytes"),
        content_hash: row.get("content_hash"),
        processing_status: parse_bill_status(row.get("processing_status")),
        extraction_confidence: row.get("extraction_confidence"),
        extracted_data: row.get("extracted_data"),
        requires_review: row.get("requires_review"),
        is_verified: row.get("is_verified"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        processed_at: row.get("processed_at"),
    }
}

/// Convert a database row to a LineItem.
pub(crate) fn line_item_from_row(row: &sqlx::postgres::PgRow) -> LineItem {
    LineItem {
        id: row.get("id"),
        bill_id: row.get("bill_id"),
        service_number: row.get("service_number"),
        package_name: row.get("package_name"),
        subscription_charge: row.get("subscription_charge"),
        usage_charges: row.get("usage_charges"),
        other_charges: row.get("other_charges"),
        total_charge: row.get("total_charge"),
        service_period_start: row.get("service_period_start"),
        service_period_end: row.get("service_period_end"),
        usage_details: row.get("usage_details"),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bill_status() {
        assert_eq!(parse_bill_status("completed"), BillStatus::Completed);
        assert_eq!(
            parse_bill_status("review_required"),
            BillStatus::ReviewRequired
        );
        assert_eq!(parse_bill_status("bogus"), BillStatus::Pending);
    }
}
