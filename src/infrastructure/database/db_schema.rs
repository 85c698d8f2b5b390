use super::connection::Database;
use crate::errors::StemError;
use anyhow::Result;
use rusqlite::{OptionalExtension, params};

pub const SCHEMA_VERSION: &str = "1";

pub mod meta_keys {
    pub const SCHEMA_VERSION: &str = "schema_version";
    pub const CURRENT_BRANCH_ID: &str = "current_branch_id";
    pub const BRANCH_SEQ: &str = "branch_seq";
    pub const BRANCH_COUNT: &str = "branch_count";
}

/// Create all tables if missing and seed the schema version. Safe to call on
/// every open; never migrates an existing incompatible store.
pub fn initialize_schema(db: &Database) -> Result<()> {
    let conn = db.get_conn()?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS branches (
            branch_id TEXT PRIMARY KEY,
            slug TEXT NOT NULL,
            user TEXT NOT NULL,
            prompt TEXT NOT NULL,
            summary TEXT NOT NULL,
            git_branch TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS leaves (
            branch_id TEXT NOT NULL,
            leaf_id TEXT NOT NULL,
            seq INTEGER NOT NULL,
            prompt TEXT NOT NULL,
            summary TEXT NOT NULL,
            git_commit TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (branch_id, leaf_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_leaves_leaf_id ON leaves(leaf_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS jumps (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            branch_id TEXT NOT NULL,
            leaf_id TEXT NOT NULL,
            prompt TEXT NOT NULL,
            summary TEXT NOT NULL,
            ancestry TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS command_exec (
            nonce TEXT PRIMARY KEY,
            command TEXT NOT NULL,
            source_file TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO meta (key, value) VALUES (?1, ?2)",
        params![meta_keys::SCHEMA_VERSION, SCHEMA_VERSION],
    )?;

    Ok(())
}

/// Fail loudly when the store was written by an incompatible version.
pub fn verify_schema(db: &Database) -> Result<()> {
    let conn = db.get_conn()?;
    let found: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = ?1",
            params![meta_keys::SCHEMA_VERSION],
            |row| row.get(0),
        )
        .optional()?;
    match found {
        Some(version) if version == SCHEMA_VERSION => Ok(()),
        Some(version) => Err(StemError::SchemaMismatch {
            found: version,
            expected: SCHEMA_VERSION.to_string(),
        }
        .into()),
        None => Err(StemError::SchemaMismatch {
            found: "missing".to_string(),
            expected: SCHEMA_VERSION.to_string(),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StemError;

    #[test]
    fn initialize_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        initialize_schema(&db).unwrap();
        initialize_schema(&db).unwrap();
        verify_schema(&db).unwrap();
    }

    #[test]
    fn mismatched_schema_version_is_fatal() {
        let db = Database::open_in_memory().unwrap();
        initialize_schema(&db).unwrap();
        {
            let conn = db.get_conn().unwrap();
            conn.execute(
                "UPDATE meta SET value = '99' WHERE key = 'schema_version'",
                [],
            )
            .unwrap();
        }
        let err = verify_schema(&db).unwrap_err();
        let stem_err = err.downcast_ref::<StemError>().unwrap();
        assert!(matches!(stem_err, StemError::SchemaMismatch { .. }));
    }

    #[test]
    fn missing_schema_version_is_fatal() {
        let db = Database::open_in_memory().unwrap();
        initialize_schema(&db).unwrap();
        {
            let conn = db.get_conn().unwrap();
            conn.execute("DELETE FROM meta WHERE key = 'schema_version'", [])
                .unwrap();
        }
        assert!(verify_schema(&db).is_err());
    }
}
