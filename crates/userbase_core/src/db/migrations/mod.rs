//! Embedded `users` schema migrations.
//!
//! # Responsibility
//! - Keep the ordered list of schema scripts compiled into the binary.
//! - Bring a connection from its recorded version to `latest_version()`.
//!
//! # Invariants
//! - Versions start at 1 and increase by exactly one per script.
//! - All pending scripts run in one transaction; `PRAGMA user_version` is
//!   bumped after each script inside that transaction.

use crate::db::{DbError, DbResult};
use log::{debug, error, info};
use rusqlite::{Connection, Transaction};

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    script: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        script: "0001_init.sql",
        sql: include_str!("0001_init.sql"),
    },
    Migration {
        version: 2,
        script: "0002_users_created_at_index.sql",
        sql: include_str!("0002_users_created_at_index.sql"),
    },
];

/// Returns the latest migration version known by this binary.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Reads the schema version recorded in `PRAGMA user_version`.
pub fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}

/// Applies all pending migrations on the provided connection.
///
/// # Errors
/// - `UnsupportedSchemaVersion` when the database is newer than this binary.
/// - `MigrationFailed` naming the first script SQLite rejected. Nothing from
///   this call is committed in that case.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let from_version = current_user_version(conn)?;
    let latest = latest_version();

    if from_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: from_version,
            latest_supported: latest,
        });
    }

    let pending: Vec<&Migration> = MIGRATIONS
        .iter()
        .filter(|migration| migration.version > from_version)
        .collect();
    if pending.is_empty() {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in pending {
        if let Err(err) = run_migration(&tx, migration) {
            error!(
                "event=db_migrate module=db status=error version={} script={} error={}",
                migration.version, migration.script, err
            );
            return Err(err);
        }
    }
    tx.commit()?;

    info!(
        "event=db_migrate module=db status=ok from_version={} to_version={}",
        from_version, latest
    );
    Ok(())
}

fn run_migration(tx: &Transaction<'_>, migration: &Migration) -> DbResult<()> {
    tx.execute_batch(migration.sql)
        .and_then(|()| {
            tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))
        })
        .map_err(|source| DbError::MigrationFailed {
            version: migration.version,
            script: migration.script,
            source,
        })?;

    debug!(
        "event=db_migrate_step module=db status=ok version={} script={}",
        migration.version, migration.script
    );
    Ok(())
}
