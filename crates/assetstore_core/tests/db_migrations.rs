use assetstore_core::db::migrations::latest_version;
use assetstore_core::db::{open_db, open_db_in_memory, DbError};
use assetstore_core::{AssetStore, MediaPackageId, SnapshotPayload, StoreConfig, StoreError};
use rusqlite::Connection;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "snapshots");
    assert_table_exists(&conn, "version_counters");
    assert_table_exists(&conn, "properties");
}

#[test]
fn reopening_file_store_keeps_snapshots() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("assets.db");
    let id = MediaPackageId::new("persisted");

    let store = AssetStore::open(StoreConfig::with_path(&path)).unwrap();
    store
        .take_snapshot(&id, "owner", &SnapshotPayload::new("file:///p.xml"))
        .unwrap();
    store.close().unwrap();

    let conn = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn), latest_version());
    drop(conn);

    let reopened = AssetStore::open(StoreConfig::with_path(&path)).unwrap();
    let next = reopened
        .take_snapshot(&id, "owner", &SnapshotPayload::new("file:///p2.xml"))
        .unwrap();
    assert_eq!(next.version, 2);
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    match open_db(&path).unwrap_err() {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }

    assert!(matches!(
        AssetStore::open(StoreConfig::with_path(&path)),
        Err(StoreError::Repo(_))
    ));
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
