use rusqlite::Connection;
use userbase_core::db::migrations::latest_version;
use userbase_core::db::{open_db, open_db_in_memory, DbError};
use userbase_core::{SqliteUserRepository, User, UserRepository};

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert!(object_exists(&conn, "table", "users"));
    assert!(object_exists(&conn, "index", "idx_users_created_at"));
}

#[test]
fn reopening_file_database_keeps_schema_and_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("userbase.db");

    let first = open_db(&path).unwrap();
    let mut user = User::new("John Smith", "john.smith@x.com", "secret");
    SqliteUserRepository::try_new(&first)
        .unwrap()
        .store(&mut user)
        .unwrap();
    drop(first);

    let second = open_db(&path).unwrap();
    assert_eq!(schema_version(&second), latest_version());
    let loaded = SqliteUserRepository::try_new(&second)
        .unwrap()
        .get_by_id(user.id)
        .unwrap();
    assert_eq!(loaded, user);
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
}

#[test]
fn partially_migrated_database_is_upgraded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("v1.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(include_str!("../src/db/migrations/0001_init.sql"))
        .unwrap();
    conn.execute_batch("PRAGMA user_version = 1;").unwrap();
    drop(conn);

    let conn = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn), latest_version());
    assert!(object_exists(&conn, "index", "idx_users_created_at"));
}

#[test]
fn failing_migration_names_version_and_keeps_previous_schema() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.db");

    // Claims v1 but has no users table, so the v2 index script cannot run.
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 1;").unwrap();
    drop(conn);

    match open_db(&path).unwrap_err() {
        DbError::MigrationFailed {
            version, script, ..
        } => {
            assert_eq!(version, 2);
            assert_eq!(script, "0002_users_created_at_index.sql");
        }
        other => panic!("unexpected error: {other}"),
    }

    let conn = Connection::open(&path).unwrap();
    assert_eq!(schema_version(&conn), 1);
    assert!(!object_exists(&conn, "index", "idx_users_created_at"));
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn object_exists(conn: &Connection, kind: &str, name: &str) -> bool {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = ?1 AND name = ?2
            );",
            [kind, name],
            |row| row.get(0),
        )
        .unwrap();
    exists == 1
}
