use chrono::{DateTime, Utc};

/// A line of work. Every branch owns a git branch and an ordered run of
/// leaves; the first leaf is created together with the branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    pub branch_id: String,
    pub slug: String,
    pub user: String,
    pub prompt: String,
    pub summary: String,
    pub git_branch: String,
    pub created_at: DateTime<Utc>,
}

/// One checkpoint on a branch. `seq` is the zero-based ordinal the leaf id
/// is derived from; it orders leaves even when timestamps collide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leaf {
    pub branch_id: String,
    pub leaf_id: String,
    pub seq: i64,
    pub prompt: String,
    pub summary: String,
    pub git_commit: String,
    pub created_at: DateTime<Utc>,
}

/// Audit record of a context switch. `ancestry` is the rendered trail of the
/// most recent leaves at the moment of the jump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Jump {
    pub branch_id: String,
    pub leaf_id: String,
    pub prompt: String,
    pub summary: String,
    pub ancestry: String,
    pub created_at: DateTime<Utc>,
}
