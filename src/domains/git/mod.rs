pub mod safe_checkout;

use crate::shared::text::slugify;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

const USER_SLUG_MAX_LEN: usize = 32;

/// Failure of a single git invocation, carrying the verb and whatever the
/// subprocess printed to stderr.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitError {
    pub operation: String,
    pub message: String,
}

impl fmt::Display for GitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "git {} failed: {}", self.operation, self.message)
    }
}

impl std::error::Error for GitError {}

fn run_git(repo: &Path, args: &[&str]) -> Result<String, GitError> {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo)
        .output()
        .map_err(|e| GitError {
            operation: args.first().copied().unwrap_or("?").to_string(),
            message: e.to_string(),
        })?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(GitError {
            operation: args.join(" "),
            message: stderr.trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Absolute path of the working tree root, or an error when `path` is not
/// inside a git repository.
pub fn toplevel(path: &Path) -> Result<PathBuf, GitError> {
    let out = run_git(path, &["rev-parse", "--show-toplevel"])?;
    Ok(PathBuf::from(out))
}

/// Initialize a repository at `path` unless one is already there.
pub fn ensure_repo(path: &Path) -> Result<(), GitError> {
    if toplevel(path).is_ok() {
        return Ok(());
    }
    run_git(path, &["init"])?;
    Ok(())
}

pub fn current_branch(repo: &Path) -> Result<String, GitError> {
    run_git(repo, &["rev-parse", "--abbrev-ref", "HEAD"])
}

pub fn create_branch(repo: &Path, name: &str) -> Result<(), GitError> {
    run_git(repo, &["checkout", "-b", name])?;
    Ok(())
}

pub fn checkout(repo: &Path, target: &str) -> Result<(), GitError> {
    run_git(repo, &["checkout", target])?;
    Ok(())
}

pub fn checkout_force(repo: &Path, target: &str) -> Result<(), GitError> {
    run_git(repo, &["checkout", "-f", target])?;
    Ok(())
}

/// Stash everything including untracked files. Callers treat failure here
/// as fatal: a failed stash before a forced checkout would destroy work.
pub fn stash_push(repo: &Path, message: &str) -> Result<(), GitError> {
    run_git(repo, &["stash", "push", "-u", "-m", message])?;
    Ok(())
}

/// Stage the whole tree. Staging failures (for example an unreadable file)
/// are logged and swallowed; the subsequent commit still records whatever
/// was staged.
pub fn add_all(repo: &Path) {
    if let Err(e) = run_git(repo, &["add", "-A"]) {
        log::warn!("Staging failed, committing what was staged: {e}");
    }
}

/// Commit the index, allowing an empty commit so every checkpoint maps to a
/// commit even when nothing changed. Returns the new HEAD hash.
pub fn commit(repo: &Path, message: &str) -> Result<String, GitError> {
    run_git(repo, &["commit", "-m", message, "--allow-empty"])?;
    run_git(repo, &["rev-parse", "HEAD"])
}

pub fn status_porcelain(repo: &Path) -> Result<String, GitError> {
    run_git(repo, &["status", "--porcelain"])
}

/// One-line summary plus diffstat of a checkpoint commit.
pub fn show_stat(repo: &Path, commit: &str) -> Result<String, GitError> {
    run_git(repo, &["show", "--stat", "--oneline", "-1", commit])
}

/// Identity used in branch names: git's user.name, else $USER, else a fixed
/// fallback, slugified either way.
pub fn current_user(repo: &Path) -> String {
    let raw = run_git(repo, &["config", "user.name"])
        .ok()
        .filter(|name| !name.is_empty())
        .or_else(|| std::env::var("USER").ok().filter(|u| !u.is_empty()))
        .unwrap_or_else(|| "user".to_string());
    slugify(&raw, USER_SLUG_MAX_LEN)
}
