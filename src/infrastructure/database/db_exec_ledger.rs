use super::connection::Database;
use anyhow::Result;
use chrono::Utc;
use rusqlite::{OptionalExtension, params};

/// Replay ledger for agent commands. A nonce that is already recorded means
/// the command was applied once and must not be applied again.
pub trait ExecLedgerMethods {
    fn has_exec_nonce(&self, nonce: &str) -> Result<bool>;
    fn insert_exec_nonce(&self, nonce: &str, command: &str, source_file: &str) -> Result<()>;
    fn last_exec_nonce(&self) -> Result<Option<String>>;
}

impl ExecLedgerMethods for Database {
    fn has_exec_nonce(&self, nonce: &str) -> Result<bool> {
        let conn = self.get_conn()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM command_exec WHERE nonce = ?1",
                params![nonce],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn insert_exec_nonce(&self, nonce: &str, command: &str, source_file: &str) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO command_exec (nonce, command, source_file, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![nonce, command, source_file, Utc::now().timestamp()],
        )?;
        Ok(())
    }

    fn last_exec_nonce(&self) -> Result<Option<String>> {
        let conn = self.get_conn()?;
        let nonce = conn
            .query_row(
                "SELECT nonce FROM command_exec
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(nonce)
    }
}
