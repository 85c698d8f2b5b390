use super::{GitError, checkout, checkout_force, stash_push, status_porcelain};
use crate::shared::paths::is_private_path;
use std::path::Path;

/// How a checkout ultimately succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutOutcome {
    /// Plain checkout went through.
    Clean,
    /// Forced, discarding only bookkeeping files.
    Forced,
    /// User changes were stashed first, then forced.
    Stashed,
}

/// Move the working tree to `target` without ever losing user work.
///
/// Three rungs: a plain checkout first; if git refuses, force only when the
/// dirty paths are all private bookkeeping; otherwise stash everything and
/// force. A stash failure aborts, because forcing past it would drop edits.
pub fn safe_checkout(repo: &Path, target: &str) -> Result<CheckoutOutcome, GitError> {
    if checkout(repo, target).is_ok() {
        return Ok(CheckoutOutcome::Clean);
    }

    let status = status_porcelain(repo)?;
    let dirty: Vec<&str> = status.lines().filter(|l| !l.trim().is_empty()).collect();
    let only_private = dirty.iter().all(|line| is_private_path(entry_path(line)));

    if dirty.is_empty() || only_private {
        checkout_force(repo, target)?;
        return Ok(CheckoutOutcome::Forced);
    }

    stash_push(repo, &format!("stem: auto-stash before jump to {target}"))?;
    checkout_force(repo, target)?;
    Ok(CheckoutOutcome::Stashed)
}

/// Extract the path from a `git status --porcelain` line. The first two
/// columns plus a space are status; renames report `old -> new` and the new
/// path is the one that matters for the working tree.
fn entry_path(line: &str) -> &str {
    let path = if line.len() > 3 { &line[3..] } else { line };
    match path.rsplit_once(" -> ") {
        Some((_, new_path)) => new_path,
        None => path,
    }
}
