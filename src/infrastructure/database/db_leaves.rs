use super::connection::Database;
use super::timestamps::utc_from_epoch_seconds_lossy;
use crate::domains::checkpoints::entity::Leaf;
use crate::domains::checkpoints::ids::leaf_id_for_seq;
use anyhow::Result;
use chrono::Utc;
use rusqlite::{OptionalExtension, Row, params};

pub trait LeafMethods {
    /// Derive the next leaf id from the branch's row count and insert the
    /// leaf in the same transaction, so two racing writers cannot mint the
    /// same id.
    fn append_leaf(
        &self,
        branch_id: &str,
        prompt: &str,
        summary: &str,
        git_commit: &str,
    ) -> Result<Leaf>;
    /// Leaves of one branch, newest first.
    fn list_leaves(&self, branch_id: &str, limit: usize) -> Result<Vec<Leaf>>;
    /// Global cross-branch lookup by leaf id.
    fn find_leaves_by_id(&self, leaf_id: &str) -> Result<Vec<Leaf>>;
    fn get_leaf_on_branch(&self, branch_id: &str, leaf_id: &str) -> Result<Option<Leaf>>;
    fn latest_leaf_for_branch(&self, branch_id: &str) -> Result<Option<Leaf>>;
    fn first_leaf_for_branch(&self, branch_id: &str) -> Result<Option<Leaf>>;
}

impl LeafMethods for Database {
    fn append_leaf(
        &self,
        branch_id: &str,
        prompt: &str,
        summary: &str,
        git_commit: &str,
    ) -> Result<Leaf> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let seq: i64 = tx.query_row(
            "SELECT COUNT(*) FROM leaves WHERE branch_id = ?1",
            params![branch_id],
            |row| row.get(0),
        )?;
        let leaf = Leaf {
            branch_id: branch_id.to_string(),
            leaf_id: leaf_id_for_seq(seq),
            seq,
            prompt: prompt.to_string(),
            summary: summary.to_string(),
            git_commit: git_commit.to_string(),
            created_at: Utc::now(),
        };
        tx.execute(
            "INSERT INTO leaves (branch_id, leaf_id, seq, prompt, summary, git_commit, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                leaf.branch_id,
                leaf.leaf_id,
                leaf.seq,
                leaf.prompt,
                leaf.summary,
                leaf.git_commit,
                leaf.created_at.timestamp(),
            ],
        )?;
        tx.commit()?;
        Ok(leaf)
    }

    fn list_leaves(&self, branch_id: &str, limit: usize) -> Result<Vec<Leaf>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT branch_id, leaf_id, seq, prompt, summary, git_commit, created_at
             FROM leaves WHERE branch_id = ?1
             ORDER BY seq DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![branch_id, limit as i64], row_to_leaf)?;
        let mut leaves = Vec::new();
        for row in rows {
            leaves.push(row?);
        }
        Ok(leaves)
    }

    fn find_leaves_by_id(&self, leaf_id: &str) -> Result<Vec<Leaf>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT branch_id, leaf_id, seq, prompt, summary, git_commit, created_at
             FROM leaves WHERE leaf_id = ?1
             ORDER BY branch_id ASC",
        )?;
        let rows = stmt.query_map(params![leaf_id], row_to_leaf)?;
        let mut leaves = Vec::new();
        for row in rows {
            leaves.push(row?);
        }
        Ok(leaves)
    }

    fn get_leaf_on_branch(&self, branch_id: &str, leaf_id: &str) -> Result<Option<Leaf>> {
        let conn = self.get_conn()?;
        let leaf = conn
            .query_row(
                "SELECT branch_id, leaf_id, seq, prompt, summary, git_commit, created_at
                 FROM leaves WHERE branch_id = ?1 AND leaf_id = ?2",
                params![branch_id, leaf_id],
                row_to_leaf,
            )
            .optional()?;
        Ok(leaf)
    }

    fn latest_leaf_for_branch(&self, branch_id: &str) -> Result<Option<Leaf>> {
        let conn = self.get_conn()?;
        let leaf = conn
            .query_row(
                "SELECT branch_id, leaf_id, seq, prompt, summary, git_commit, created_at
                 FROM leaves WHERE branch_id = ?1
                 ORDER BY seq DESC LIMIT 1",
                params![branch_id],
                row_to_leaf,
            )
            .optional()?;
        Ok(leaf)
    }

    fn first_leaf_for_branch(&self, branch_id: &str) -> Result<Option<Leaf>> {
        let conn = self.get_conn()?;
        let leaf = conn
            .query_row(
                "SELECT branch_id, leaf_id, seq, prompt, summary, git_commit, created_at
                 FROM leaves WHERE branch_id = ?1
                 ORDER BY seq ASC LIMIT 1",
                params![branch_id],
                row_to_leaf,
            )
            .optional()?;
        Ok(leaf)
    }
}

fn row_to_leaf(row: &Row) -> rusqlite::Result<Leaf> {
    Ok(Leaf {
        branch_id: row.get(0)?,
        leaf_id: row.get(1)?,
        seq: row.get(2)?,
        prompt: row.get(3)?,
        summary: row.get(4)?,
        git_commit: row.get(5)?,
        created_at: utc_from_epoch_seconds_lossy(row.get(6)?),
    })
}
