//! Embedded schema definition.
//!
//! The schema is applied idempotently by [`crate::Database::ensure_schema`];
//! deployments that manage migrations externally can skip it. Uniqueness and
//! foreign-key constraints here are load-bearing: account auto-registration
//! and the service-number/monthly-charge upserts rely on their conflict
//! targets to stay race-safe.

/// Idempotent DDL for all billtrace tables.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS service_accounts (
    id              UUID PRIMARY KEY,
    account_number  TEXT NOT NULL UNIQUE,
    account_name    TEXT NOT NULL,
    provider        TEXT NOT NULL,
    description     TEXT,
    is_active       BOOLEAN NOT NULL DEFAULT TRUE,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS stored_files (
    id              UUID PRIMARY KEY,
    content_hash    TEXT NOT NULL UNIQUE,
    file_name       TEXT NOT NULL,
    storage_path    TEXT NOT NULL,
    size_bytes      BIGINT NOT NULL,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS bills (
    id                    UUID PRIMARY KEY,
    service_account_id    UUID REFERENCES service_accounts(id) ON DELETE SET NULL,
    invoice_number        TEXT NOT NULL UNIQUE,
    account_number        TEXT NOT NULL,
    billing_period_start  DATE NOT NULL,
    billing_period_end    DATE NOT NULL,
    bill_date             DATE NOT NULL,
    due_date              DATE,
    current_charges       DOUBLE PRECISION NOT NULL DEFAULT 0,
    outstanding_amount    DOUBLE PRECISION NOT NULL DEFAULT 0,
    gst_amount            DOUBLE PRECISION NOT NULL DEFAULT 0,
    total_due             DOUBLE PRECISION NOT NULL DEFAULT 0,
    discounts             DOUBLE PRECISION NOT NULL DEFAULT 0,
    file_path             TEXT NOT NULL,
    file_name             TEXT NOT NULL,
    file_size_bytes       BIGINT,
    content_hash          TEXT,
    processing_status     TEXT NOT NULL DEFAULT 'pending',
    extraction_confidence INTEGER,
    extracted_data        JSONB,
    requires_review       BOOLEAN NOT NULL DEFAULT FALSE,
    is_verified           BOOLEAN NOT NULL DEFAULT FALSE,
    created_at            TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at            TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    processed_at          TIMESTAMPTZ
);

CREATE INDEX IF NOT EXISTS idx_bills_account ON bills (service_account_id);
CREATE INDEX IF NOT EXISTS idx_bills_period_start ON bills (billing_period_start);
CREATE INDEX IF NOT EXISTS idx_bills_file_name ON bills (file_name);
CREATE INDEX IF NOT EXISTS idx_bills_content_hash ON bills (content_hash);

CREATE TABLE IF NOT EXISTS line_items (
    id                   UUID PRIMARY KEY,
    bill_id              UUID NOT NULL REFERENCES bills(id) ON DELETE CASCADE,
    service_number       TEXT NOT NULL,
    package_name         TEXT NOT NULL,
    subscription_charge  DOUBLE PRECISION NOT NULL DEFAULT 0,
    usage_charges        DOUBLE PRECISION NOT NULL DEFAULT 0,
    other_charges        DOUBLE PRECISION NOT NULL DEFAULT 0,
    total_charge         DOUBLE PRECISION NOT NULL DEFAULT 0,
    service_period_start DATE,
    service_period_end   DATE,
    usage_details        JSONB,
    created_at           TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_line_items_bill ON line_items (bill_id);

CREATE TABLE IF NOT EXISTS service_numbers (
    id                  UUID PRIMARY KEY,
    service_number      TEXT NOT NULL,
    service_account_id  UUID NOT NULL REFERENCES service_accounts(id) ON DELETE CASCADE,
    package_name        TEXT,
    first_seen_bill_id  UUID REFERENCES bills(id) ON DELETE SET NULL,
    first_seen_date     DATE,
    last_seen_bill_id   UUID REFERENCES bills(id) ON DELETE SET NULL,
    last_seen_date      DATE,
    is_active           BOOLEAN NOT NULL DEFAULT TRUE,
    notes               TEXT,
    created_at          TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at          TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE (service_number, service_account_id)
);

CREATE TABLE IF NOT EXISTS service_number_monthly_charges (
    id                   UUID PRIMARY KEY,
    service_number_id    UUID NOT NULL REFERENCES service_numbers(id) ON DELETE CASCADE,
    bill_id              UUID NOT NULL REFERENCES bills(id) ON DELETE CASCADE,
    line_item_id         UUID REFERENCES line_items(id) ON DELETE SET NULL,
    service_number       TEXT NOT NULL,
    billing_period_start DATE NOT NULL,
    billing_period_end   DATE NOT NULL,
    bill_date            DATE NOT NULL,
    subscription_charge  DOUBLE PRECISION NOT NULL DEFAULT 0,
    usage_charges        DOUBLE PRECISION NOT NULL DEFAULT 0,
    other_charges        DOUBLE PRECISION NOT NULL DEFAULT 0,
    total_charge         DOUBLE PRECISION NOT NULL DEFAULT 0,
    package_name         TEXT,
    created_at           TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at           TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE (service_number, bill_id)
);

CREATE INDEX IF NOT EXISTS idx_monthly_charges_service
    ON service_number_monthly_charges (service_number);

CREATE TABLE IF NOT EXISTS alerts (
    id                  UUID PRIMARY KEY,
    bill_id             UUID NOT NULL REFERENCES bills(id) ON DELETE CASCADE,
    service_account_id  UUID NOT NULL REFERENCES service_accounts(id) ON DELETE CASCADE,
    alert_type          TEXT NOT NULL,
    severity            TEXT NOT NULL,
    current_amount      DOUBLE PRECISION,
    previous_amount     DOUBLE PRECISION,
    percentage_increase DOUBLE PRECISION,
    threshold_exceeded  DOUBLE PRECISION,
    title               TEXT NOT NULL,
    description         TEXT,
    status              TEXT NOT NULL DEFAULT 'active',
    acknowledged_at     TIMESTAMPTZ,
    acknowledged_by     TEXT,
    resolved_at         TIMESTAMPTZ,
    resolved_by         TEXT,
    resolution_notes    TEXT,
    metadata            JSONB,
    created_at          TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at          TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_alerts_bill ON alerts (bill_id);
CREATE INDEX IF NOT EXISTS idx_alerts_status ON alerts (status);

CREATE TABLE IF NOT EXISTS ingest_jobs (
    id            UUID PRIMARY KEY,
    bill_id       UUID REFERENCES bills(id) ON DELETE SET NULL,
    file_name     TEXT NOT NULL,
    state         TEXT NOT NULL DEFAULT 'uploaded',
    error_message TEXT,
    created_at    TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at    TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    completed_at  TIMESTAMPTZ
);

CREATE INDEX IF NOT EXISTS idx_ingest_jobs_state ON ingest_jobs (state);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_declares_all_tables() {
        for table in [
            "service_accounts",
            "stored_files",
            "bills",
            "line_items",
            "service_numbers",
            "service_number_monthly_charges",
            "alerts",
            "ingest_jobs",
        ] {
            assert!(
                SCHEMA_SQL.contains(&format!("CREATE TABLE IF NOT EXISTS {}", table)),
                "missing table: {}",
                table
            );
        }
    }

    #[test]
    fn test_conflict_targets_present() {
        // The upsert conflict targets the repositories depend on.
        assert!(SCHEMA_SQL.contains("account_number  TEXT NOT NULL UNIQUE"));
        assert!(SCHEMA_SQL.contains("UNIQUE (service_number, service_account_id)"));
        assert!(SCHEMA_SQL.contains("UNIQUE (service_number, bill_id)"));
        assert!(SCHEMA_SQL.contains("content_hash    TEXT NOT NULL UNIQUE"));
    }
}
