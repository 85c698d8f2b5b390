use super::connection::Database;
use super::db_schema::meta_keys;
use crate::domains::checkpoints::ids::format_branch_id;
use anyhow::Result;
use rusqlite::{OptionalExtension, Transaction, params};

/// Upsert a meta key inside an already-open transaction, so counter and
/// pointer updates commit atomically with the row insert that implies them.
pub(super) fn set_meta_tx(tx: &Transaction, key: &str, value: &str) -> rusqlite::Result<()> {
    tx.execute(
        "INSERT INTO meta (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

pub trait MetaMethods {
    fn get_meta(&self, key: &str) -> Result<Option<String>>;
    fn set_meta(&self, key: &str, value: &str) -> Result<()>;
    fn current_branch_id(&self) -> Result<Option<String>>;
    fn branch_count(&self) -> Result<i64>;
    /// Read-increment-write of the branch sequence in one transaction;
    /// concurrent callers can never be handed the same id.
    fn next_branch_id(&self) -> Result<String>;
}

impl MetaMethods for Database {
    fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let conn = self.get_conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        set_meta_tx(&tx, key, value)?;
        tx.commit()?;
        Ok(())
    }

    fn current_branch_id(&self) -> Result<Option<String>> {
        let current = self.get_meta(meta_keys::CURRENT_BRANCH_ID)?;
        Ok(current.filter(|id| !id.is_empty()))
    }

    fn branch_count(&self) -> Result<i64> {
        let value = self.get_meta(meta_keys::BRANCH_COUNT)?;
        Ok(value.and_then(|v| v.parse().ok()).unwrap_or(0))
    }

    fn next_branch_id(&self) -> Result<String> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let seq: i64 = tx
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![meta_keys::BRANCH_SEQ],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .and_then(|v| v.parse().ok())
            .unwrap_or(1);
        set_meta_tx(&tx, meta_keys::BRANCH_SEQ, &(seq + 1).to_string())?;
        tx.commit()?;
        Ok(format_branch_id(seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::db_schema::initialize_schema;

    #[test]
    fn branch_ids_are_sequential_without_gaps() {
        let db = Database::open_in_memory().unwrap();
        initialize_schema(&db).unwrap();
        let ids: Vec<String> = (0..12).map(|_| db.next_branch_id().unwrap()).collect();
        let expected: Vec<String> = (1..=12).map(|n| format!("b{n:04}")).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn current_branch_ignores_blank_pointer() {
        let db = Database::open_in_memory().unwrap();
        initialize_schema(&db).unwrap();
        assert_eq!(db.current_branch_id().unwrap(), None);
        db.set_meta("current_branch_id", "").unwrap();
        assert_eq!(db.current_branch_id().unwrap(), None);
        db.set_meta("current_branch_id", "b0001").unwrap();
        assert_eq!(db.current_branch_id().unwrap().as_deref(), Some("b0001"));
    }
}
