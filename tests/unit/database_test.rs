//! Unit tests for the storage database layer (connection + migrations).

use mark_as_read::database::migrations::CURRENT_SCHEMA_VERSION;
use mark_as_read::database::Database;
use tempfile::TempDir;

#[test]
fn test_open_in_memory_succeeds() {
    let db = Database::open_in_memory();
    assert!(db.is_ok(), "open_in_memory should succeed");
}

#[test]
fn test_migrations_create_storage_table() {
    let db = Database::open_in_memory().expect("open_in_memory failed");
    let conn = db.connection();

    let exists: bool = conn
        .query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name=?1",
            ["storage"],
            |row| row.get(0),
        )
        .unwrap_or(false);
    assert!(exists, "Table 'storage' should exist after migrations");
}

#[test]
fn test_schema_version_recorded() {
    let db = Database::open_in_memory().expect("open_in_memory failed");
    let version: i32 = db
        .connection()
        .query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))
        .expect("schema_version should be readable");
    assert_eq!(version, CURRENT_SCHEMA_VERSION);
}

#[test]
fn test_reopen_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("nested").join("store.db");

    {
        let db = Database::open(&path).expect("first open failed");
        db.connection()
            .execute(
                "INSERT INTO storage (key, value, updated_at) VALUES ('k', '1', 0)",
                [],
            )
            .unwrap();
    }

    let db = Database::open(&path).expect("second open failed");
    let value: String = db
        .connection()
        .query_row("SELECT value FROM storage WHERE key = 'k'", [], |row| row.get(0))
        .unwrap();
    assert_eq!(value, "1");
}
