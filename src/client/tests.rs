//! End-to-end tests for the client over the in-memory transport and store.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::*;
use crate::column_model::ColumnType;
use crate::config_store::MemoryStore;
use crate::reconcile::ManualClock;
use crate::record_kind::STUDENTS;
use crate::record_transform::CellValue;
use crate::sheet_gateway::{InMemorySheets, TransportOp};

type TestClient = SheetClient<Arc<InMemorySheets>, Arc<MemoryStore>, Arc<ManualClock>>;

struct Harness {
    client: TestClient,
    sheets: Arc<InMemorySheets>,
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
}

fn row(cells: &[&str]) -> Vec<String> {
    cells.iter().map(|c| c.to_string()).collect()
}

fn token() -> AccessToken {
    AccessToken::new("token-1")
}

fn harness(grid: Vec<Vec<String>>) -> Harness {
    let sheets = Arc::new(InMemorySheets::new().with_sheet("Students", grid));
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::default());
    let client = SheetClient::with_clock(
        &STUDENTS,
        ClientConfig::new("spreadsheet-1", &STUDENTS),
        Arc::clone(&sheets),
        Arc::clone(&store),
        Arc::clone(&clock),
    )
    .unwrap();
    Harness {
        client,
        sheets,
        store,
        clock,
    }
}

fn roster() -> Vec<Vec<String>> {
    vec![
        row(&["First Name", "Last Name", "Email", "Notes"]),
        row(&["Ada", "Lovelace", "ada@example.com", "likes math"]),
        row(&["Grace", "Hopper", "grace@example.com", ""]),
    ]
}

fn after_cooldown(h: &Harness) {
    h.clock.advance(Duration::from_millis(1500));
}

async fn custom_headers(client: &TestClient) -> Vec<String> {
    client
        .columns()
        .await
        .into_iter()
        .filter(|c| c.is_custom)
        .map(|c| c.header_name)
        .collect()
}

#[test]
fn test_new_rejects_invalid_config() {
    let result = SheetClient::new(
        &STUDENTS,
        ClientConfig::new(" ", &STUDENTS),
        InMemorySheets::new(),
        MemoryStore::new(),
    );
    assert!(matches!(result, Err(SheetError::ConfigurationMissing(_))));
}

#[tokio::test]
async fn test_fetch_discovers_and_persists_custom_columns() {
    let h = harness(roster());
    h.client.sign_in("ada@example.com").await.unwrap();

    let records = h.client.fetch_and_reconcile(token()).await.unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].custom_fields["notes"], CellValue::Text("likes math".into()));
    assert_eq!(custom_headers(&h.client).await, vec!["Notes".to_string()]);

    let persisted = h.client.store().load("ada@example.com").unwrap();
    assert_eq!(persisted.custom_columns().count(), 1);
}

#[tokio::test]
async fn test_fetch_without_credential_is_configuration_error() {
    let h = harness(roster());
    let err = h.client.fetch_and_reconcile(AccessToken::new("")).await.unwrap_err();
    assert!(matches!(err, SheetError::ConfigurationMissing(_)));
}

#[tokio::test]
async fn test_cooldown_then_deletion_self_heals() {
    let h = harness(roster());
    h.client.fetch_and_reconcile(token()).await.unwrap();

    // Header removed by a collaborator.
    h.sheets.set_cell("Students", 1, 3, "");

    h.clock.advance(Duration::from_millis(200));
    h.client.fetch_and_reconcile(token()).await.unwrap();
    assert_eq!(custom_headers(&h.client).await, vec!["Notes".to_string()]);

    after_cooldown(&h);
    h.client.fetch_and_reconcile(token()).await.unwrap();
    assert!(custom_headers(&h.client).await.is_empty());

    // Header back again: rediscovered under a new id.
    h.sheets.set_cell("Students", 1, 3, "Notes");
    after_cooldown(&h);
    h.client.fetch_and_reconcile(token()).await.unwrap();
    assert_eq!(custom_headers(&h.client).await, vec!["Notes".to_string()]);
}

#[tokio::test]
async fn test_failed_fetch_keeps_cached_records() {
    let h = harness(roster());
    let records = h.client.fetch_and_reconcile(token()).await.unwrap();

    h.sheets.set_offline(true);
    after_cooldown(&h);
    let err = h.client.fetch_and_reconcile(token()).await.unwrap_err();

    assert!(err.is_remote());
    assert_eq!(h.client.records().await, records);
}

#[tokio::test]
async fn test_add_custom_column_writes_sheet_first() {
    let h = harness(roster());
    h.client.fetch_and_reconcile(token()).await.unwrap();

    h.sheets.set_offline(true);
    let err = h
        .client
        .add_custom_column(CustomColumnDraft::new("Locker", ColumnType::Number))
        .await
        .unwrap_err();
    assert!(err.is_remote());
    assert_eq!(custom_headers(&h.client).await, vec!["Notes".to_string()]);

    h.sheets.set_offline(false);
    let column = h
        .client
        .add_custom_column(CustomColumnDraft::new("Locker", ColumnType::Number))
        .await
        .unwrap();
    assert_eq!(column.field, "locker");
    assert_eq!(
        h.sheets.headers("Students"),
        row(&["First Name", "Last Name", "Email", "Notes", "Locker"])
    );
    assert_eq!(
        custom_headers(&h.client).await,
        vec!["Notes".to_string(), "Locker".to_string()]
    );
}

#[tokio::test]
async fn test_add_duplicate_column_makes_no_remote_call() {
    let h = harness(roster());
    h.client.fetch_and_reconcile(token()).await.unwrap();
    let writes = h.sheets.call_count(TransportOp::Write);

    let err = h
        .client
        .add_custom_column(CustomColumnDraft::new("notes!", ColumnType::String))
        .await
        .unwrap_err();
    assert!(matches!(err, SheetError::DuplicateColumn { .. }));

    let err = h
        .client
        .add_custom_column(CustomColumnDraft::new("E-mail", ColumnType::String))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        SheetError::DuplicateColumn {
            header_name: "E-mail".into(),
            existing_id: "email".into()
        }
    );
    assert_eq!(h.sheets.call_count(TransportOp::Write), writes);
}

#[tokio::test]
async fn test_add_column_requires_credential() {
    let h = harness(roster());
    let err = h
        .client
        .add_custom_column(CustomColumnDraft::new("Locker", ColumnType::String))
        .await
        .unwrap_err();
    assert!(matches!(err, SheetError::ConfigurationMissing(_)));
}

#[tokio::test]
async fn test_remove_custom_column_is_local_first() {
    let h = harness(roster());
    h.client.fetch_and_reconcile(token()).await.unwrap();
    let notes = h.client.columns().await.into_iter().find(|c| c.is_custom).unwrap();

    h.sheets.fail_on(TransportOp::Structural, true);
    h.client.remove_custom_column(&notes.id).await.unwrap();

    assert!(custom_headers(&h.client).await.is_empty());
    assert!(h.sheets.headers("Students").contains(&"Notes".to_string()));

    assert_eq!(
        h.client.remove_custom_column("email").await,
        Err(SheetError::BuiltinColumn("Email".into()))
    );
    assert_eq!(
        h.client.remove_custom_column("custom_missing").await,
        Err(SheetError::ColumnNotFound("custom_missing".into()))
    );
}

#[tokio::test]
async fn test_remove_custom_column_deletes_remote_column() {
    let h = harness(roster());
    h.client.fetch_and_reconcile(token()).await.unwrap();
    let notes = h.client.columns().await.into_iter().find(|c| c.is_custom).unwrap();

    h.client.remove_custom_column(&notes.id).await.unwrap();

    assert_eq!(h.sheets.headers("Students"), row(&["First Name", "Last Name", "Email"]));
}

#[tokio::test]
async fn test_rename_custom_column_keeps_field_and_data() {
    let h = harness(roster());
    h.client.fetch_and_reconcile(token()).await.unwrap();
    let notes = h.client.columns().await.into_iter().find(|c| c.is_custom).unwrap();

    h.client.rename_column(&notes.id, "Comments").await.unwrap();
    assert_eq!(h.sheets.headers("Students")[3], "Comments");

    after_cooldown(&h);
    let records = h.client.fetch_and_reconcile(token()).await.unwrap();
    let columns = h.client.columns().await;
    let renamed = columns.iter().find(|c| c.id == notes.id).unwrap();
    assert_eq!(renamed.header_name, "Comments");
    assert_eq!(renamed.field, "notes");
    assert_eq!(records[0].custom_fields["notes"], CellValue::Text("likes math".into()));
    assert_eq!(custom_headers(&h.client).await.len(), 1);
}

#[tokio::test]
async fn test_rename_rejections() {
    let h = harness(roster());
    h.client.fetch_and_reconcile(token()).await.unwrap();
    let notes = h.client.columns().await.into_iter().find(|c| c.is_custom).unwrap();

    assert_eq!(
        h.client.rename_column("first_name", "Given Name").await,
        Err(SheetError::BuiltinColumn("First Name".into()))
    );
    assert!(matches!(
        h.client.rename_column(&notes.id, "Last Name").await,
        Err(SheetError::DuplicateColumn { .. })
    ));
    assert!(matches!(
        h.client.rename_column(&notes.id, "  ").await,
        Err(SheetError::Validation(_))
    ));

    // Header already gone remotely.
    h.sheets.set_cell("Students", 1, 3, "Memo");
    assert_eq!(
        h.client.rename_column(&notes.id, "Comments").await,
        Err(SheetError::ColumnNotFound("Notes".into()))
    );
}

#[tokio::test]
async fn test_presentation_settings_persist() {
    let h = harness(roster());
    h.client.sign_in("ada@example.com").await.unwrap();

    h.client.toggle_visibility("email").await.unwrap();
    h.client.set_records_per_page(50).await.unwrap();
    h.client
        .reorder_columns(vec!["last_name".into(), "first_name".into()])
        .await
        .unwrap();

    let saved = h.client.store().load("ada@example.com").unwrap();
    assert!(!saved.column("email").unwrap().visible);
    assert_eq!(saved.records_per_page, 50);
    assert_eq!(saved.columns[0].id, "last_name");

    h.client.reset_columns().await.unwrap();
    assert_eq!(h.client.settings().await, ColumnSettings::defaults(&STUDENTS));
    assert_eq!(
        h.client.toggle_visibility("nope").await,
        Err(SheetError::ColumnNotFound("nope".into()))
    );
}

#[tokio::test]
async fn test_sign_in_migrates_legacy_settings() {
    let h = harness(roster());
    let mut legacy = ColumnSettings::defaults(&STUDENTS);
    legacy.records_per_page = 40;
    h.store
        .set(
            &h.client.config().legacy_storage_key,
            &serde_json::to_string(&legacy).unwrap(),
        )
        .unwrap();

    let settings = h.client.sign_in("Grace@Example.com").await.unwrap();

    assert_eq!(settings.records_per_page, 40);
    assert_eq!(h.store.get(&h.client.config().legacy_storage_key).unwrap(), None);
    assert_eq!(
        h.store.keys(),
        vec![format!("{}grace@example.com", h.client.config().storage_key_prefix)]
    );
}

#[tokio::test]
async fn test_create_record_validates_then_appends() {
    let h = harness(vec![
        row(&["First Name", "Last Name"]),
        row(&["Ada", "Lovelace"]),
    ]);
    h.client.fetch_and_reconcile(token()).await.unwrap();
    h.client
        .add_custom_column(CustomColumnDraft::new("Locker", ColumnType::Number))
        .await
        .unwrap();

    let mut draft = RecordDraft::default();
    draft.fields.insert("first_name".into(), "Grace".into());
    draft.fields.insert("last_name".into(), "Hopper".into());
    draft.custom_fields.insert("locker".into(), "abc".into());

    let err = h.client.create_record(draft.clone()).await.unwrap_err();
    match err {
        SheetError::Validation(errors) => assert!(errors.get("locker").is_some()),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(h.sheets.call_count(TransportOp::Append), 0);

    draft.custom_fields.insert("locker".into(), "12".into());
    let record = h.client.create_record(draft).await.unwrap();

    assert_eq!(record.row_index, 3);
    assert!(record.id.starts_with("student_"));
    let ids: Vec<String> = h.client.records().await.into_iter().map(|r| r.id).collect();
    assert_eq!(ids.iter().filter(|id| **id == record.id).count(), 1);
    assert!(record.last_modified.is_some());
    assert_eq!(h.sheets.grid("Students")[2], row(&["Grace", "Hopper", "12"]));
    assert_eq!(h.client.records().await.len(), 2);
}

#[tokio::test]
async fn test_update_record_overwrites_row() {
    let h = harness(roster());
    let records = h.client.fetch_and_reconcile(token()).await.unwrap();

    let mut grace = records[1].clone();
    grace
        .fields
        .insert("email".into(), CellValue::Text("grace@navy.mil".into()));
    grace
        .custom_fields
        .insert("notes".into(), CellValue::Text("COBOL".into()));

    let updated = h.client.update_record(grace).await.unwrap();

    assert_eq!(updated.row_index, 3);
    assert_eq!(
        h.sheets.grid("Students")[2],
        row(&["Grace", "Hopper", "grace@navy.mil", "COBOL"])
    );

    let missing = Record::new("student_row_99", 99);
    assert_eq!(
        h.client.update_record(missing).await,
        Err(SheetError::RecordNotFound("student_row_99".into()))
    );
}

#[tokio::test]
async fn test_delete_record_shifts_later_rows() {
    let h = harness(vec![
        row(&["First Name", "Last Name"]),
        row(&["Ada", "Lovelace"]),
        row(&["Grace", "Hopper"]),
        row(&["Alan", "Turing"]),
    ]);
    let fetched = h.client.fetch_and_reconcile(token()).await.unwrap();
    let (ada, grace, alan) = (&fetched[0], &fetched[1], &fetched[2]);

    h.client.delete_record(&grace.id).await.unwrap();

    let records = h.client.records().await;
    let summary: Vec<(String, u32, String)> = records
        .iter()
        .map(|r| (r.id.clone(), r.row_index, r.display_name()))
        .collect();
    assert_eq!(
        summary,
        vec![
            (ada.id.clone(), 2, "Ada Lovelace".to_string()),
            (alan.id.clone(), 3, "Alan Turing".to_string()),
        ]
    );
    assert_eq!(h.sheets.grid("Students").len(), 3);
    assert_eq!(
        h.client.delete_record(&grace.id).await,
        Err(SheetError::RecordNotFound(grace.id.clone()))
    );

    // Remote failure leaves local state untouched.
    h.sheets.fail_on(TransportOp::Structural, true);
    assert!(h.client.delete_record(&ada.id).await.unwrap_err().is_remote());
    assert_eq!(h.client.records().await, records);
}

#[tokio::test]
async fn test_update_after_delete_never_overwrites_another_row() {
    let h = harness(vec![
        row(&["First Name", "Last Name"]),
        row(&["Ada", "Lovelace"]),
        row(&["Grace", "Hopper"]),
        row(&["Alan", "Turing"]),
    ]);
    let fetched = h.client.fetch_and_reconcile(token()).await.unwrap();
    let mut grace = fetched[1].clone();

    h.client.delete_record(&fetched[0].id).await.unwrap();

    grace
        .fields
        .insert("last_name".into(), CellValue::Text("Hopper-Edited".into()));
    assert_eq!(
        h.client.update_record(grace.clone()).await,
        Err(SheetError::StaleRecord(grace.id.clone()))
    );
    assert_eq!(
        h.sheets.grid("Students"),
        vec![
            row(&["First Name", "Last Name"]),
            row(&["Grace", "Hopper"]),
            row(&["Alan", "Turing"]),
        ]
    );

    // The refreshed copy carries the new row and saves normally.
    let mut fresh = h
        .client
        .records()
        .await
        .into_iter()
        .find(|r| r.id == grace.id)
        .unwrap();
    assert_eq!(fresh.row_index, 2);
    fresh
        .fields
        .insert("last_name".into(), CellValue::Text("Hopper-Edited".into()));
    h.client.update_record(fresh).await.unwrap();
    assert_eq!(h.sheets.grid("Students")[1], row(&["Grace", "Hopper-Edited"]));
    assert_eq!(h.sheets.grid("Students")[2], row(&["Alan", "Turing"]));
}

#[tokio::test]
async fn test_refetch_keeps_ids_of_unchanged_rows() {
    let h = harness(roster());
    let first = h.client.fetch_and_reconcile(token()).await.unwrap();

    h.sheets.set_cell("Students", 3, 3, "retired");
    after_cooldown(&h);
    let second = h.client.fetch_and_reconcile(token()).await.unwrap();

    assert_eq!(second[0].id, first[0].id);
    assert_ne!(second[1].id, first[1].id);
    assert_ne!(second[1].id, second[0].id);
}

#[tokio::test]
async fn test_subscribers_receive_snapshots() {
    let h = harness(roster());
    let mut rx = h.client.subscribe();

    h.client.fetch_and_reconcile(token()).await.unwrap();
    rx.changed().await.unwrap();
    assert_eq!(rx.borrow_and_update().len(), 2);

    let first = rx.borrow_and_update()[0].id.clone();
    h.client.delete_record(&first).await.unwrap();
    rx.changed().await.unwrap();
    assert_eq!(rx.borrow().len(), 1);
}

#[tokio::test]
async fn test_push_column_settings() {
    let h = harness(vec![row(&["First Name", "Last Name", "Scratch"])]);
    h.client.sign_in("ada").await.unwrap();

    let mut saved = ColumnSettings::defaults(&STUDENTS);
    saved
        .columns
        .push(ColumnDescriptor::custom("custom_bus_route_x1", "Bus Route", ColumnType::String).with_order(20));
    h.client.store().save("ada", &saved).unwrap();
    h.client.sign_in("ada").await.unwrap();

    // Needs a credential, which the first fetch stores.
    assert!(h.client.push_column_settings().await.is_err());
    h.sheets.set_offline(true);
    let _ = h.client.fetch_and_reconcile(token()).await;
    h.sheets.set_offline(false);

    let report = h.client.push_column_settings().await.unwrap();
    assert_eq!(report.added, vec!["Bus Route".to_string()]);
    assert_eq!(report.removed, vec!["Scratch".to_string()]);
    assert_eq!(
        h.sheets.headers("Students"),
        row(&["First Name", "Last Name", "Bus Route"])
    );
}

#[tokio::test(start_paused = true)]
async fn test_auto_sync_waits_then_fetches() {
    let h = harness(roster());

    let started = tokio::time::Instant::now();
    h.client.auto_sync(token()).await;

    assert!(started.elapsed() >= h.client.auto_sync_delay());
    assert_eq!(h.client.records().await.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_auto_sync_swallows_failures() {
    let h = harness(roster());
    h.sheets.set_offline(true);

    h.client.auto_sync(token()).await;

    assert!(h.client.records().await.is_empty());
}

#[tokio::test]
async fn test_custom_values_typed_by_column() {
    let h = harness(vec![
        row(&["First Name", "Last Name", "Locker"]),
        row(&["Ada", "Lovelace", "12"]),
    ]);
    h.client.fetch_and_reconcile(token()).await.unwrap();
    let records = h.client.records().await;
    // Discovered columns are text until the user says otherwise.
    assert_eq!(records[0].custom_fields["locker"], CellValue::Text("12".into()));

    let values: BTreeMap<String, String> = custom_field_texts(&records[0]);
    assert_eq!(values["locker"], "12");
}
