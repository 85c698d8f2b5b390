use super::entity::{Branch, Jump, Leaf};
use super::ids::ancestry_summary;
use crate::domains::git;
use crate::domains::git::safe_checkout::{CheckoutOutcome, safe_checkout};
use crate::errors::StemError;
use crate::infrastructure::database::{
    BranchMethods, Database, JumpMethods, LeafMethods, MetaMethods,
};
use crate::shared::paths::StemPaths;
use crate::shared::text::{normalize_prompt, slugify};
use anyhow::Result;
use chrono::Utc;

const SLUG_MAX_LEN: usize = 40;
const ANCESTRY_WINDOW: usize = 3;

/// What a jump should resolve to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JumpSpec {
    /// Branch head by explicit branch id.
    Head(String),
    /// Specific leaf, optionally scoped to a branch.
    Leaf {
        leaf_id: String,
        branch_id: Option<String>,
    },
    /// Unqualified identifier: try leaf ids globally, fall back to branch.
    Bare(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JumpOutcome {
    pub branch_id: String,
    pub leaf_id: String,
    pub prompt: String,
    pub stashed: bool,
    pub detached: bool,
}

/// Orchestrates checkpoint mutations: always the VCS first, the store
/// second, so every stored row points at a commit that exists.
pub struct CheckpointService {
    db: Database,
    paths: StemPaths,
}

impl CheckpointService {
    pub fn new(db: Database, paths: StemPaths) -> Self {
        Self { db, paths }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn paths(&self) -> &StemPaths {
        &self.paths
    }

    /// Open a new branch: mint an id, create-and-checkout the git branch,
    /// snapshot the tree, then insert branch + first leaf in one
    /// transaction.
    pub fn create_branch(&self, prompt: &str, summary: &str) -> Result<(Branch, Leaf)> {
        let prompt = normalize_prompt(prompt);
        let summary = normalize_prompt(summary);
        let branch_id = self.db.next_branch_id()?;
        let user = git::current_user(self.paths.repo_root());
        let slug = slugify(&prompt, SLUG_MAX_LEN);
        let git_branch = format!("stem/{user}/{branch_id}-{slug}");

        git::create_branch(self.paths.repo_root(), &git_branch)?;
        git::add_all(self.paths.repo_root());
        let commit = git::commit(self.paths.repo_root(), &format!("stem: {prompt}"))?;

        let branch = Branch {
            branch_id,
            slug,
            user,
            prompt: prompt.clone(),
            summary: summary.clone(),
            git_branch,
            created_at: Utc::now(),
        };
        let leaf = self
            .db
            .insert_branch_with_first_leaf(&branch, &prompt, &summary, &commit)?;
        Ok((branch, leaf))
    }

    /// Append a leaf recording the work just finished. `branch_id` scopes
    /// the append explicitly; otherwise the current branch is used. An
    /// explicit scope that is not checked out is checked out first, so the
    /// snapshot commit always lands on the branch that owns the leaf.
    pub fn append_update(
        &self,
        prev_prompt: &str,
        prev_summary: &str,
        branch_id: Option<&str>,
    ) -> Result<Leaf> {
        let explicit = branch_id.is_some();
        let branch = self.resolve_branch(branch_id)?;
        let prompt = normalize_prompt(prev_prompt);
        let summary = normalize_prompt(prev_summary);

        if explicit && git::current_branch(self.paths.repo_root())? != branch.git_branch {
            safe_checkout(self.paths.repo_root(), &branch.git_branch)?;
        }
        git::add_all(self.paths.repo_root());
        let commit = git::commit(self.paths.repo_root(), &format!("stem: {prompt}"))?;
        let leaf = self
            .db
            .append_leaf(&branch.branch_id, &prompt, &summary, &commit)?;
        Ok(leaf)
    }

    /// Close out the current branch with a final leaf, then open a new one.
    pub fn update_and_branch(
        &self,
        prev_prompt: &str,
        prev_summary: &str,
        prompt: &str,
        summary: &str,
        branch_id: Option<&str>,
    ) -> Result<(Leaf, Branch, Leaf)> {
        let closing = self.append_update(prev_prompt, prev_summary, branch_id)?;
        let (branch, opening) = self.create_branch(prompt, summary)?;
        Ok((closing, branch, opening))
    }

    /// Move the working tree to the requested checkpoint and record the
    /// jump. Ambiguity fails before any checkout happens.
    pub fn jump(&self, spec: &JumpSpec) -> Result<JumpOutcome> {
        let (branch, leaf, detached) = self.resolve_jump(spec)?;

        let target_ref = if detached {
            leaf.git_commit.clone()
        } else {
            branch.git_branch.clone()
        };
        let outcome = safe_checkout(self.paths.repo_root(), &target_ref)?;

        let recent = self.db.list_leaves(&branch.branch_id, ANCESTRY_WINDOW)?;
        self.db.record_jump(&Jump {
            branch_id: branch.branch_id.clone(),
            leaf_id: leaf.leaf_id.clone(),
            prompt: leaf.prompt.clone(),
            summary: leaf.summary.clone(),
            ancestry: ancestry_summary(&recent),
            created_at: Utc::now(),
        })?;

        Ok(JumpOutcome {
            branch_id: branch.branch_id,
            leaf_id: leaf.leaf_id,
            prompt: leaf.prompt,
            stashed: outcome == CheckoutOutcome::Stashed,
            detached,
        })
    }

    fn resolve_branch(&self, branch_id: Option<&str>) -> Result<Branch> {
        let id = match branch_id {
            Some(id) => id.to_string(),
            None => self
                .db
                .current_branch_id()?
                .ok_or(StemError::NoCurrentBranch)?,
        };
        let branch = self
            .db
            .get_branch(&id)?
            .ok_or(StemError::BranchNotFound { branch_id: id })?;
        Ok(branch)
    }

    /// Resolution returns the target branch, the leaf the jump lands on,
    /// and whether the checkout is detached (a leaf commit rather than the
    /// branch head).
    fn resolve_jump(&self, spec: &JumpSpec) -> Result<(Branch, Leaf, bool)> {
        match spec {
            JumpSpec::Head(branch_id) => self.resolve_head(branch_id),
            JumpSpec::Leaf { leaf_id, branch_id } => match branch_id {
                Some(branch_id) => {
                    let leaf = self
                        .db
                        .get_leaf_on_branch(branch_id, leaf_id)?
                        .ok_or_else(|| StemError::LeafNotFound {
                            target: format!("{branch_id}/{leaf_id}"),
                        })?;
                    self.leaf_target(leaf)
                }
                None => self.resolve_leaf_globally(leaf_id),
            },
            JumpSpec::Bare(target) => match self.resolve_leaf_globally(target) {
                Ok(resolved) => Ok(resolved),
                Err(err) => match err.downcast_ref::<StemError>() {
                    Some(StemError::LeafNotFound { .. }) => self.resolve_head(target),
                    _ => Err(err),
                },
            },
        }
    }

    fn resolve_head(&self, branch_id: &str) -> Result<(Branch, Leaf, bool)> {
        let branch = self
            .db
            .get_branch(branch_id)?
            .ok_or_else(|| StemError::BranchNotFound {
                branch_id: branch_id.to_string(),
            })?;
        let leaf = self
            .db
            .latest_leaf_for_branch(branch_id)?
            .ok_or_else(|| StemError::LeafNotFound {
                target: branch_id.to_string(),
            })?;
        Ok((branch, leaf, false))
    }

    fn resolve_leaf_globally(&self, leaf_id: &str) -> Result<(Branch, Leaf, bool)> {
        let mut matches = self.db.find_leaves_by_id(leaf_id)?;
        match matches.len() {
            0 => Err(StemError::LeafNotFound {
                target: leaf_id.to_string(),
            }
            .into()),
            1 => {
                let leaf = matches.remove(0);
                self.leaf_target(leaf)
            }
            _ => Err(StemError::AmbiguousLeaf {
                leaf_id: leaf_id.to_string(),
                branches: matches.into_iter().map(|l| l.branch_id).collect(),
            }
            .into()),
        }
    }

    fn leaf_target(&self, leaf: Leaf) -> Result<(Branch, Leaf, bool)> {
        let branch =
            self.db
                .get_branch(&leaf.branch_id)?
                .ok_or_else(|| StemError::BranchNotFound {
                    branch_id: leaf.branch_id.clone(),
                })?;
        // landing on the newest leaf is a head checkout, not a detached one
        let latest = self.db.latest_leaf_for_branch(&leaf.branch_id)?;
        let detached = latest.as_ref().map(|l| l.leaf_id != leaf.leaf_id) == Some(true);
        Ok((branch, leaf, detached))
    }
}
