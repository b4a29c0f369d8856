//! Schema migrations for the task/activity store.
//!
//! # Responsibility
//! - List the compiled-in migrations with their version and name.
//! - Bring a store up to [`latest_version`] in one transaction.
//!
//! # Invariants
//! - Versions start at 1 and grow by exactly 1.
//! - `PRAGMA user_version` equals the last applied version; a failed
//!   step leaves it where it was.

use crate::db::{DbError, DbResult};
use log::{error, info};
use rusqlite::Connection;

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "projects_tasks",
        sql: include_str!("0001_projects_tasks.sql"),
    },
    Migration {
        version: 2,
        name: "activity",
        sql: include_str!("0002_activity.sql"),
    },
];

pub fn latest_version() -> u32 {
    MIGRATIONS.len() as u32
}

/// Applies every migration newer than the store's `user_version`.
///
/// # Errors
/// - [`DbError::UnsupportedSchemaVersion`] for a store written by a newer binary.
/// - [`DbError::Migration`] naming the step that failed; nothing is applied.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let from_version = schema_version(conn)?;
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
        let step = format!("{}\nPRAGMA user_version = {};", migration.sql, migration.version);
        if let Err(source) = tx.execute_batch(&step) {
            error!(
                "event=db_migrate module=db status=error version={} name={}",
                migration.version, migration.name
            );
            return Err(DbError::Migration {
                version: migration.version,
                name: migration.name,
                source,
            });
        }
    }
    tx.commit()?;

    info!("event=db_migrate module=db status=ok from_version={from_version} to_version={latest}");
    Ok(())
}

/// Applied schema version (`PRAGMA user_version`).
pub fn schema_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?)
}
