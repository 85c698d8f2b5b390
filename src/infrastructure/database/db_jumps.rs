use super::connection::Database;
use super::db_meta::set_meta_tx;
use super::db_schema::meta_keys;
use super::timestamps::utc_from_epoch_seconds_lossy;
use crate::domains::checkpoints::entity::Jump;
use anyhow::Result;
use rusqlite::{Row, params};

pub trait JumpMethods {
    /// Append the audit row and move the current pointer in one transaction.
    fn record_jump(&self, jump: &Jump) -> Result<()>;
    fn list_jumps(&self, limit: usize) -> Result<Vec<Jump>>;
}

impl JumpMethods for Database {
    fn record_jump(&self, jump: &Jump) -> Result<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO jumps (branch_id, leaf_id, prompt, summary, ancestry, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                jump.branch_id,
                jump.leaf_id,
                jump.prompt,
                jump.summary,
                jump.ancestry,
                jump.created_at.timestamp(),
            ],
        )?;
        set_meta_tx(&tx, meta_keys::CURRENT_BRANCH_ID, &jump.branch_id)?;
        tx.commit()?;
        Ok(())
    }

    fn list_jumps(&self, limit: usize) -> Result<Vec<Jump>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT branch_id, leaf_id, prompt, summary, ancestry, created_at
             FROM jumps
             ORDER BY id DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], row_to_jump)?;
        let mut jumps = Vec::new();
        for row in rows {
            jumps.push(row?);
        }
        Ok(jumps)
    }
}

fn row_to_jump(row: &Row) -> rusqlite::Result<Jump> {
    Ok(Jump {
        branch_id: row.get(0)?,
        leaf_id: row.get(1)?,
        prompt: row.get(2)?,
        summary: row.get(3)?,
        ancestry: row.get(4)?,
        created_at: utc_from_epoch_seconds_lossy(row.get(5)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::db_meta::MetaMethods;
    use crate::infrastructure::database::db_schema::initialize_schema;
    use chrono::Utc;

    #[test]
    fn record_jump_moves_pointer_with_audit_row() {
        let db = Database::open_in_memory().unwrap();
        initialize_schema(&db).unwrap();
        db.record_jump(&Jump {
            branch_id: "b0002".to_string(),
            leaf_id: "001a".to_string(),
            prompt: "p".to_string(),
            summary: "s".to_string(),
            ancestry: "001a: p".to_string(),
            created_at: Utc::now(),
        })
        .unwrap();
        assert_eq!(db.current_branch_id().unwrap().as_deref(), Some("b0002"));
        let jumps = db.list_jumps(5).unwrap();
        assert_eq!(jumps.len(), 1);
        assert_eq!(jumps[0].branch_id, "b0002");
    }
}
