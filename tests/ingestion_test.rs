use csvql::ingest::{IngestMode, IngestOptions, IngestionOrchestrator};
use csvql::storage::{MemoryStore, TableStore};
use csvql::value::ColumnType;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// Write a CSV fixture to a unique temp path and return it.
fn write_csv(contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("csvql_it_{}.csv", Uuid::new_v4()));
    fs::write(&path, contents).expect("write fixture");
    path
}

/// A 3-column file with 100 data rows: id (integer), amount (real), note (text).
fn large_fixture() -> PathBuf {
    let mut body = String::from("id,amount,note\n");
    for i in 0..100 {
        body.push_str(&format!("{},{}.5,row number {}\n", i, i, i));
    }
    write_csv(&body)
}

fn orchestrator(store: &Arc<MemoryStore>) -> IngestionOrchestrator {
    IngestionOrchestrator::new(
        store.clone() as Arc<dyn TableStore>,
        IngestOptions::default(),
    )
}

#[tokio::test]
async fn fresh_ingest_creates_typed_table() {
    let store = Arc::new(MemoryStore::new());
    let path = large_fixture();

    let result = orchestrator(&store)
        .ingest(&path, "Sales Data", IngestMode::Append)
        .await;

    assert!(result.success, "error: {:?}", result.error);
    assert_eq!(result.table_name, "sales_data");
    assert_eq!(result.rows_inserted, 100);
    assert_eq!(result.rows_skipped, 0);
    assert_eq!(result.columns, vec!["id", "amount", "note"]);

    let schema = store
        .table_schema("sales_data")
        .await
        .unwrap()
        .expect("table should exist");
    assert_eq!(schema.columns[0].column_type, ColumnType::Integer);
    assert_eq!(schema.columns[1].column_type, ColumnType::Real);
    assert_eq!(schema.columns[2].column_type, ColumnType::Text);
    assert_eq!(store.row_count("sales_data"), Some(100));

    fs::remove_file(path).ok();
}

#[tokio::test]
async fn append_accumulates_rows() {
    let store = Arc::new(MemoryStore::new());
    let path = large_fixture();
    let orch = orchestrator(&store);

    let first = orch.ingest(&path, "sales", IngestMode::Append).await;
    assert!(first.success);
    let second = orch.ingest(&path, "sales", IngestMode::Append).await;
    assert!(second.success, "error: {:?}", second.error);

    assert_eq!(second.rows_inserted, 100);
    assert_eq!(store.row_count("sales"), Some(200));

    fs::remove_file(path).ok();
}

#[tokio::test]
async fn replace_rebuilds_schema_and_resets_rows() {
    let store = Arc::new(MemoryStore::new());
    let orch = orchestrator(&store);

    let first = large_fixture();
    assert!(orch.ingest(&first, "sales", IngestMode::Append).await.success);
    assert_eq!(store.row_count("sales"), Some(100));

    // Different columns entirely; replace must not carry the old schema over.
    let second = write_csv("region,total\nnorth,10\nsouth,20\n");
    let result = orch.ingest(&second, "sales", IngestMode::Replace).await;

    assert!(result.success, "error: {:?}", result.error);
    assert_eq!(result.columns, vec!["region", "total"]);
    assert_eq!(store.row_count("sales"), Some(2));

    let schema = store.table_schema("sales").await.unwrap().unwrap();
    assert_eq!(schema.columns.len(), 2);
    assert_eq!(schema.columns[1].column_type, ColumnType::Integer);

    fs::remove_file(first).ok();
    fs::remove_file(second).ok();
}

#[tokio::test]
async fn replace_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    let orch = orchestrator(&store);
    let path = large_fixture();

    for _ in 0..3 {
        let result = orch.ingest(&path, "sales", IngestMode::Replace).await;
        assert!(result.success, "error: {:?}", result.error);
        assert_eq!(store.row_count("sales"), Some(100));
    }

    fs::remove_file(path).ok();
}

#[tokio::test]
async fn short_rows_are_skipped_and_counted() {
    let store = Arc::new(MemoryStore::new());
    let path = write_csv("a,b,c\n1,2,3\n4,5\n6,7,8\n9\n");

    let result = orchestrator(&store)
        .ingest(&path, "ragged", IngestMode::Append)
        .await;

    assert!(result.success, "error: {:?}", result.error);
    assert_eq!(result.rows_inserted, 2);
    assert_eq!(result.rows_skipped, 2);
    assert_eq!(store.row_count("ragged"), Some(2));

    fs::remove_file(path).ok();
}

#[tokio::test]
async fn append_with_unknown_column_fails_whole_call() {
    let store = Arc::new(MemoryStore::new());
    let orch = orchestrator(&store);

    let first = write_csv("id,name\n1,alice\n");
    assert!(orch.ingest(&first, "people", IngestMode::Append).await.success);

    let second = write_csv("id,name,email\n2,bob,bob@example.com\n");
    let result = orch.ingest(&second, "people", IngestMode::Append).await;

    assert!(!result.success);
    assert!(result.error.as_deref().unwrap().contains("email"));
    // The existing table is untouched.
    assert_eq!(store.row_count("people"), Some(1));

    fs::remove_file(first).ok();
    fs::remove_file(second).ok();
}

#[tokio::test]
async fn append_with_missing_nullable_column_fills_null() {
    let store = Arc::new(MemoryStore::new());
    let orch = orchestrator(&store);

    // note gets at least one empty value, so it is created nullable.
    let first = write_csv("id,note\n1,hello\n2,\n");
    assert!(orch.ingest(&first, "notes", IngestMode::Append).await.success);

    let second = write_csv("id\n3\n");
    let result = orch.ingest(&second, "notes", IngestMode::Append).await;

    assert!(result.success, "error: {:?}", result.error);
    assert_eq!(store.row_count("notes"), Some(3));

    let preview = store.preview("notes", 10).await.unwrap();
    let last = preview.rows.last().unwrap();
    assert_eq!(last[0], serde_json::json!(3));
    assert!(last[1].is_null());

    fs::remove_file(first).ok();
    fs::remove_file(second).ok();
}

#[tokio::test]
async fn inference_covers_all_column_types() {
    let store = Arc::new(MemoryStore::new());
    let path = write_csv(
        "count,ratio,active,seen_at,label\n\
         1,0.5,true,2024-01-15T10:30:00,alpha\n\
         -42,1e3,no,2024-02-20 08:00:00,beta\n",
    );

    let result = orchestrator(&store)
        .ingest(&path, "typed", IngestMode::Append)
        .await;
    assert!(result.success, "error: {:?}", result.error);

    let schema = store.table_schema("typed").await.unwrap().unwrap();
    let types: Vec<_> = schema.columns.iter().map(|c| c.column_type).collect();
    assert_eq!(
        types,
        vec![
            ColumnType::Integer,
            ColumnType::Real,
            ColumnType::Boolean,
            ColumnType::Timestamp,
            ColumnType::Text,
        ]
    );

    fs::remove_file(path).ok();
}

#[tokio::test]
async fn messy_headers_are_normalized_and_deduplicated() {
    let store = Arc::new(MemoryStore::new());
    let path = write_csv("First Name,first name,2024 Total,,--\nalice,bob,10,x,y\n");

    let result = orchestrator(&store)
        .ingest(&path, "messy", IngestMode::Append)
        .await;

    assert!(result.success, "error: {:?}", result.error);
    assert_eq!(
        result.columns,
        vec!["first_name", "first_name_2", "_2024_total", "column_3", "column_4"]
    );

    fs::remove_file(path).ok();
}

#[tokio::test]
async fn empty_file_fails_without_creating_table() {
    let store = Arc::new(MemoryStore::new());
    let path = write_csv("");

    let result = orchestrator(&store)
        .ingest(&path, "empty", IngestMode::Append)
        .await;

    assert!(!result.success);
    assert!(!store.table_exists("empty").await.unwrap());

    fs::remove_file(path).ok();
}

#[tokio::test]
async fn header_only_file_creates_empty_text_table() {
    let store = Arc::new(MemoryStore::new());
    let path = write_csv("a,b\n");

    let result = orchestrator(&store)
        .ingest(&path, "header_only", IngestMode::Append)
        .await;

    assert!(result.success, "error: {:?}", result.error);
    assert_eq!(result.rows_inserted, 0);

    // Columns with no observed values default to nullable text.
    let schema = store.table_schema("header_only").await.unwrap().unwrap();
    assert!(schema
        .columns
        .iter()
        .all(|c| c.column_type == ColumnType::Text && c.nullable));

    fs::remove_file(path).ok();
}
