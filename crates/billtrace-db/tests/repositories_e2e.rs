//! Repository integration tests against PostgreSQL.
//!
//! These tests require a running PostgreSQL database with DATABASE_URL set
//! (defaults to the billtrace test database on port 15432) and are ignored
//! by default:
//!
//! ```text
//! cargo test -p billtrace-db -- --ignored
//! ```

use chrono::NaiveDate;
use uuid::Uuid;

use billtrace_db::test_fixtures::{sample_extraction, sample_raw_payload, TestDatabase};
use billtrace_db::{
    AlertSeverity, AlertStatus, AlertType, BillFileInfo, BillStatus, CreateAccountRequest,
    CreateAlertRequest, ServiceSighting,
};

fn unique(prefix: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}{}", prefix, &suffix[..10])
}

fn date(text: &str) -> NaiveDate {
    text.parse().unwrap()
}

fn file_info(name: &str) -> BillFileInfo {
    BillFileInfo {
        file_path: format!("blobs/aa/bb/{}", name),
        file_name: name.to_string(),
        file_size_bytes: Some(1024),
        content_hash: Some(format!("blake3:{:064x}", 0xabcdu128)),
    }
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_auto_register_is_reused_not_duplicated() {
    let test_db = TestDatabase::new().await;
    let number = unique("BA");

    let (first, created_first) = test_db
        .db
        .accounts
        .auto_register(&number, "Dhiraagu")
        .await
        .unwrap();
    let (second, created_second) = test_db
        .db
        .accounts
        .auto_register(&number, "Dhiraagu")
        .await
        .unwrap();

    assert!(created_first);
    assert!(!created_second);
    assert_eq!(first.id, second.id);
    assert_eq!(first.account_name, format!("Auto-registered {}", number));
    assert!(first.description.unwrap().contains("Automatically registered"));
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_explicit_create_conflicts_on_taken_number() {
    let test_db = TestDatabase::new().await;
    let number = unique("BA");

    test_db
        .db
        .accounts
        .create(CreateAccountRequest {
            account_number: number.clone(),
            account_name: "Head Office".to_string(),
            provider: None,
            description: None,
        })
        .await
        .unwrap();

    let err = test_db
        .db
        .accounts
        .create(CreateAccountRequest {
            account_number: number.clone(),
            account_name: "Somewhere Else".to_string(),
            provider: None,
            description: None,
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "already_exists");
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_bill_create_links_and_review_states() {
    let test_db = TestDatabase::new().await;
    let number = unique("BA");
    let invoice = unique("B1-");

    let extraction = sample_extraction(&invoice, &number, date("2026-01-01"), 1026.0);
    let raw = sample_raw_payload(&invoice, &number, date("2026-01-01"), 1026.0);

    // Persisted without an account: review required.
    let (bill, line_items) = test_db
        .db
        .bills
        .create_from_extraction(&extraction, raw, &file_info(&format!("{}.pdf", invoice)), None)
        .await
        .unwrap();

    assert_eq!(bill.processing_status, BillStatus::ReviewRequired);
    assert!(bill.requires_review);
    assert_eq!(line_items.len(), 1);
    assert_eq!(line_items[0].bill_id, bill.id);

    // Linking to an account completes it.
    let (account, _) = test_db
        .db
        .accounts
        .auto_register(&number, "Dhiraagu")
        .await
        .unwrap();
    let linked = test_db
        .db
        .bills
        .link_to_account(bill.id, account.id)
        .await
        .unwrap();
    assert_eq!(linked.processing_status, BillStatus::Completed);
    assert!(!linked.requires_review);

    let verified = test_db.db.bills.verify(bill.id).await.unwrap();
    assert!(verified.is_verified);
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_duplicate_invoice_number_cannot_double_persist() {
    let test_db = TestDatabase::new().await;
    let number = unique("BA");
    let invoice = unique("B1-");

    let extraction = sample_extraction(&invoice, &number, date("2026-01-01"), 500.0);
    let raw = sample_raw_payload(&invoice, &number, date("2026-01-01"), 500.0);

    test_db
        .db
        .bills
        .create_from_extraction(&extraction, raw.clone(), &file_info("a.pdf"), None)
        .await
        .unwrap();

    let err = test_db
        .db
        .bills
        .create_from_extraction(&extraction, raw, &file_info("b.pdf"), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "already_exists");
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_service_number_upsert_guards_last_seen() {
    let test_db = TestDatabase::new().await;
    let number = unique("BA");
    let service = unique("777");

    let (account, _) = test_db
        .db
        .accounts
        .auto_register(&number, "Dhiraagu")
        .await
        .unwrap();

    // Two bills to point at.
    let feb_invoice = unique("B1-");
    let (feb_bill, _) = test_db
        .db
        .bills
        .create_from_extraction(
            &sample_extraction(&feb_invoice, &number, date("2026-02-01"), 500.0),
            sample_raw_payload(&feb_invoice, &number, date("2026-02-01"), 500.0),
            &file_info(&format!("{}.pdf", feb_invoice)),
            Some(account.id),
        )
        .await
        .unwrap();
    let jan_invoice = unique("B1-");
    let (jan_bill, _) = test_db
        .db
        .bills
        .create_from_extraction(
            &sample_extraction(&jan_invoice, &number, date("2026-01-01"), 480.0),
            sample_raw_payload(&jan_invoice, &number, date("2026-01-01"), 480.0),
            &file_info(&format!("{}.pdf", jan_invoice)),
            Some(account.id),
        )
        .await
        .unwrap();

    // February processed first, January late: last_seen must not go back.
    test_db
        .db
        .service_numbers
        .upsert_sighting(account.id, &service, Some("Fibre"), feb_bill.id, feb_bill.bill_date)
        .await
        .unwrap();
    let row = test_db
        .db
        .service_numbers
        .upsert_sighting(account.id, &service, None, jan_bill.id, jan_bill.bill_date)
        .await
        .unwrap();

    assert_eq!(row.last_seen_bill_id, Some(feb_bill.id));
    assert_eq!(row.last_seen_date, Some(feb_bill.bill_date));
    // package_name was set on first sight and survives the None.
    assert_eq!(row.package_name.as_deref(), Some("Fibre"));

    // A later March bill does advance it.
    let mar_invoice = unique("B1-");
    let (mar_bill, _) = test_db
        .db
        .bills
        .create_from_extraction(
            &sample_extraction(&mar_invoice, &number, date("2026-03-01"), 520.0),
            sample_raw_payload(&mar_invoice, &number, date("2026-03-01"), 520.0),
            &file_info(&format!("{}.pdf", mar_invoice)),
            Some(account.id),
        )
        .await
        .unwrap();
    let row = test_db
        .db
        .service_numbers
        .upsert_sighting(account.id, &service, None, mar_bill.id, mar_bill.bill_date)
        .await
        .unwrap();
    assert_eq!(row.last_seen_date, Some(mar_bill.bill_date));
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_detect_for_bill_flags_only_unseen_services() {
    let test_db = TestDatabase::new().await;
    let number = unique("BA");
    let s1 = unique("777");
    let s2 = unique("777");

    let (account, _) = test_db
        .db
        .accounts
        .auto_register(&number, "Dhiraagu")
        .await
        .unwrap();
    let invoice = unique("B1-");
    let (bill, _) = test_db
        .db
        .bills
        .create_from_extraction(
            &sample_extraction(&invoice, &number, date("2026-01-01"), 500.0),
            sample_raw_payload(&invoice, &number, date("2026-01-01"), 500.0),
            &file_info(&format!("{}.pdf", invoice)),
            Some(account.id),
        )
        .await
        .unwrap();

    let sightings = vec![
        ServiceSighting {
            service_number: s1.clone(),
            package_name: Some("Fibre".to_string()),
        },
        ServiceSighting {
            service_number: s2.clone(),
            package_name: None,
        },
    ];

    let first_pass = test_db
        .db
        .service_numbers
        .detect_for_bill(bill.id, bill.bill_date, account.id, &sightings)
        .await
        .unwrap();
    assert!(first_pass.iter().all(|d| d.is_new));

    let second_pass = test_db
        .db
        .service_numbers
        .detect_for_bill(bill.id, bill.bill_date, account.id, &sightings)
        .await
        .unwrap();
    assert!(second_pass.iter().all(|d| !d.is_new));
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_alert_state_machine_transitions() {
    let test_db = TestDatabase::new().await;
    let number = unique("BA");
    let invoice = unique("B1-");

    let (account, _) = test_db
        .db
        .accounts
        .auto_register(&number, "Dhiraagu")
        .await
        .unwrap();
    let (bill, _) = test_db
        .db
        .bills
        .create_from_extraction(
            &sample_extraction(&invoice, &number, date("2026-01-01"), 500.0),
            sample_raw_payload(&invoice, &number, date("2026-01-01"), 500.0),
            &file_info(&format!("{}.pdf", invoice)),
            Some(account.id),
        )
        .await
        .unwrap();

    let alert = test_db
        .db
        .alerts
        .create(CreateAlertRequest {
            bill_id: bill.id,
            service_account_id: account.id,
            alert_type: AlertType::HighCharge,
            severity: AlertSeverity::Medium,
            current_amount: Some(125.0),
            previous_amount: Some(100.0),
            percentage_increase: Some(25.0),
            threshold_exceeded: Some(20.0),
            title: "Bill increased by 25.0%".to_string(),
            description: None,
            metadata: None,
        })
        .await
        .unwrap();
    assert_eq!(alert.status, AlertStatus::Active);

    // active → acknowledged → resolved
    let acked = test_db
        .db
        .alerts
        .acknowledge(alert.id, Some("ops"))
        .await
        .unwrap();
    assert_eq!(acked.status, AlertStatus::Acknowledged);
    assert!(acked.acknowledged_at.is_some());

    let resolved = test_db
        .db
        .alerts
        .resolve(alert.id, Some("ops"), Some("expected seasonal increase"))
        .await
        .unwrap();
    assert_eq!(resolved.status, AlertStatus::Resolved);

    // Terminal: no further transitions.
    assert_eq!(
        test_db.db.alerts.dismiss(alert.id).await.unwrap_err().kind(),
        "state_conflict"
    );
    assert_eq!(
        test_db
            .db
            .alerts
            .acknowledge(alert.id, None)
            .await
            .unwrap_err()
            .kind(),
        "state_conflict"
    );

    // Unknown alert is a different failure.
    assert_eq!(
        test_db
            .db
            .alerts
            .dismiss(Uuid::now_v7())
            .await
            .unwrap_err()
            .kind(),
        "not_found"
    );
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_stored_file_content_addressing() {
    use billtrace_db::{FilesystemBackend, PgFileRepository};

    let test_db = TestDatabase::new().await;
    let dir = tempfile::tempdir().unwrap();
    let files = PgFileRepository::new(test_db.db.pool.clone(), FilesystemBackend::new(dir.path()));

    let bytes = format!("%PDF-1.4\n{}", unique("content")).into_bytes();

    let (first, reused_first) = files.store("jan.pdf", &bytes).await.unwrap();
    let (second, reused_second) = files.store("jan-copy.pdf", &bytes).await.unwrap();

    assert!(!reused_first);
    assert!(reused_second);
    assert_eq!(first.id, second.id);
    assert_eq!(first.content_hash, second.content_hash);

    let read_back = files.read(first.id).await.unwrap();
    assert_eq!(read_back, bytes);
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_previous_completed_bill_ordering() {
    let test_db = TestDatabase::new().await;
    let number = unique("BA");

    let (account, _) = test_db
        .db
        .accounts
        .auto_register(&number, "Dhiraagu")
        .await
        .unwrap();

    for (start, total) in [("2026-01-01", 100.0), ("2026-02-01", 125.0)] {
        let invoice = unique("B1-");
        test_db
            .db
            .bills
            .create_from_extraction(
                &sample_extraction(&invoice, &number, date(start), total),
                sample_raw_payload(&invoice, &number, date(start), total),
                &file_info(&format!("{}.pdf", invoice)),
                Some(account.id),
            )
            .await
            .unwrap();
    }

    let previous = test_db
        .db
        .bills
        .previous_completed_bill(account.id, date("2026-03-01"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(previous.billing_period_start, date("2026-02-01"));
    assert_eq!(previous.total_due, 125.0);

    assert!(test_db
        .db
        .bills
        .previous_completed_bill(account.id, date("2026-01-01"))
        .await
        .unwrap()
        .is_none());
}
