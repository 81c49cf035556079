//! Migration runner — version tracking, forward-only, transactional per migration.
//!
//! Covers the two tables this crate owns: proposals and retrieval outcomes.

mod v001_proposals;
mod v002_outcomes;

use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::to_storage_err;
use mnemos_core::EvolutionResult;

pub const LATEST_VERSION: u32 = 2;

type MigrationFn = fn(&Connection) -> rusqlite::Result<()>;

const MIGRATIONS: [(u32, &str, MigrationFn); 2] = [
    (1, "proposals", v001_proposals::migrate),
    (2, "outcomes", v002_outcomes::migrate),
];

fn current_version(conn: &Connection) -> EvolutionResult<u32> {
    let exists: bool = conn
        .prepare("SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version'")
        .and_then(|mut stmt| stmt.exists([]))
        .map_err(|e| to_storage_err("check schema_version", e.to_string()))?;

    if !exists {
        conn.execute_batch(
            "CREATE TABLE schema_version (version INTEGER PRIMARY KEY, applied_at TEXT NOT NULL DEFAULT (datetime('now')))",
        )
        .map_err(|e| to_storage_err("create schema_version", e.to_string()))?;
        return Ok(0);
    }

    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .map_err(|e| to_storage_err("read schema_version", e.to_string()))
}

/// Run all pending migrations. Forward-only, each wrapped in a transaction.
pub fn run_migrations(conn: &Connection) -> EvolutionResult<u32> {
    let current = current_version(conn)?;
    let mut applied = 0;

    if current >= LATEST_VERSION {
        debug!("mnemos-storage schema is up to date (v{current})");
        return Ok(0);
    }

    info!("running migrations: v{current} -> v{LATEST_VERSION}");

    for &(version, name, migrate_fn) in &MIGRATIONS {
        if version <= current {
            continue;
        }

        conn.execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| to_storage_err(format!("begin transaction v{version:03}"), e.to_string()))?;

        match migrate_fn(conn) {
            Ok(()) => {
                conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])
                    .map_err(|e| to_storage_err(format!("record version v{version:03}"), e.to_string()))?;
                conn.execute_batch("COMMIT")
                    .map_err(|e| to_storage_err(format!("commit v{version:03}"), e.to_string()))?;
                info!("applied migration v{version:03}: {name}");
                applied += 1;
            }
            Err(e) => {
                warn!("migration v{version:03} failed: {e}, rolling back");
                let _ = conn.execute_batch("ROLLBACK");
                return Err(to_storage_err(format!("migration v{version:03}"), e.to_string()));
            }
        }
    }

    info!("applied {applied} migration(s), now at v{LATEST_VERSION}");
    Ok(applied)
}
