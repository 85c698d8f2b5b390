use super::connection::Database;
use super::db_meta::set_meta_tx;
use super::db_schema::meta_keys;
use super::timestamps::utc_from_epoch_seconds_lossy;
use crate::domains::checkpoints::entity::{Branch, Leaf};
use crate::domains::checkpoints::ids::leaf_id_for_seq;
use anyhow::Result;
use chrono::Utc;
use rusqlite::{OptionalExtension, Row, params};

pub trait BranchMethods {
    /// Insert the branch together with its first leaf, advance the branch
    /// count and move the current pointer, all in one transaction, so a
    /// reader can never observe a branch without its opening snapshot.
    fn insert_branch_with_first_leaf(
        &self,
        branch: &Branch,
        leaf_prompt: &str,
        leaf_summary: &str,
        git_commit: &str,
    ) -> Result<Leaf>;
    fn get_branch(&self, branch_id: &str) -> Result<Option<Branch>>;
    fn list_branches(&self, limit: usize) -> Result<Vec<Branch>>;
}

impl BranchMethods for Database {
    fn insert_branch_with_first_leaf(
        &self,
        branch: &Branch,
        leaf_prompt: &str,
        leaf_summary: &str,
        git_commit: &str,
    ) -> Result<Leaf> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO branches (branch_id, slug, user, prompt, summary, git_branch, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                branch.branch_id,
                branch.slug,
                branch.user,
                branch.prompt,
                branch.summary,
                branch.git_branch,
                branch.created_at.timestamp(),
            ],
        )?;

        let leaf = Leaf {
            branch_id: branch.branch_id.clone(),
            leaf_id: leaf_id_for_seq(0),
            seq: 0,
            prompt: leaf_prompt.to_string(),
            summary: leaf_summary.to_string(),
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

        let count: i64 = tx
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![meta_keys::BRANCH_COUNT],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        set_meta_tx(&tx, meta_keys::BRANCH_COUNT, &(count + 1).to_string())?;
        set_meta_tx(&tx, meta_keys::CURRENT_BRANCH_ID, &branch.branch_id)?;

        tx.commit()?;
        Ok(leaf)
    }

    fn get_branch(&self, branch_id: &str) -> Result<Option<Branch>> {
        let conn = self.get_conn()?;
        let branch = conn
            .query_row(
                "SELECT branch_id, slug, user, prompt, summary, git_branch, created_at
                 FROM branches WHERE branch_id = ?1",
                params![branch_id],
                row_to_branch,
            )
            .optional()?;
        Ok(branch)
    }

    fn list_branches(&self, limit: usize) -> Result<Vec<Branch>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT branch_id, slug, user, prompt, summary, git_branch, created_at
             FROM branches
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], row_to_branch)?;
        let mut branches = Vec::new();
        for row in rows {
            branches.push(row?);
        }
        Ok(branches)
    }
}

fn row_to_branch(row: &Row) -> rusqlite::Result<Branch> {
    Ok(Branch {
        branch_id: row.get(0)?,
        slug: row.get(1)?,
        user: row.get(2)?,
        prompt: row.get(3)?,
        summary: row.get(4)?,
        git_branch: row.get(5)?,
        created_at: utc_from_epoch_seconds_lossy(row.get(6)?),
    })
}
