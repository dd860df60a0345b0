use notetaker_core::db::migrations::latest_version;
use notetaker_core::db::{open_db, open_db_in_memory, DbError};
use notetaker_core::{SqliteStore, StoreError};
use rusqlite::Connection;

#[test]
fn open_db_in_memory_creates_kv_table() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert_eq!(table_names(&conn), vec!["kv_entries"]);
}

#[test]
fn reopening_database_keeps_schema_and_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notetaker.sqlite3");

    let conn_first = open_db(&path).unwrap();
    conn_first
        .execute(
            "INSERT INTO kv_entries (key, value, updated_at) VALUES ('notes', '[]', 1);",
            [],
        )
        .unwrap();
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    let value: String = conn_second
        .query_row(
            "SELECT value FROM kv_entries WHERE key = 'notes';",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(value, "[]");
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.sqlite3");

    Connection::open(&path)
        .unwrap()
        .pragma_update(None, "user_version", 999)
        .unwrap();

    let err = open_db(&path).unwrap_err();
    assert!(
        matches!(
            err,
            DbError::UnsupportedSchemaVersion { db_version: 999, latest_supported }
                if latest_supported == latest_version()
        ),
        "unexpected error: {err}"
    );
}

#[test]
fn store_rejects_connection_without_kv_table() {
    let conn = Connection::open_in_memory().unwrap();

    let err = SqliteStore::try_new(conn)
        .err()
        .expect("unmigrated connection must be rejected");
    assert!(matches!(
        err,
        StoreError::Db(DbError::MissingRequiredTable("kv_entries"))
    ));
}

fn schema_version(conn: &Connection) -> u32 {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
        .unwrap()
}

fn table_names(conn: &Connection) -> Vec<String> {
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name;")
        .unwrap();
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    names
}
