use crate::shared::paths::StemPaths;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::SystemTime;

use crate::shared::text::normalize_prompt;

/// Content of a live note file once it is ready: both fields non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentNote {
    pub prompt: String,
    pub summary: String,
}

/// What the pair of live note files asks for this cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotePlan {
    None,
    /// Only the branch note is ready: open a new branch.
    BranchOnly(AgentNote),
    /// Only the leaf note is ready: append a leaf.
    LeafOnly(AgentNote),
    /// Both ready, branch note edited last: one combined close-and-open.
    Collapse { leaf: AgentNote, branch: AgentNote },
    /// Both ready, leaf note edited last: apply as two separate commands.
    Sequential { leaf: AgentNote, branch: AgentNote },
}

#[derive(Debug, Default, Deserialize)]
struct NoteFile {
    #[serde(default, alias = "prev_prompt", alias = "old_prompt")]
    prompt: Option<String>,
    #[serde(default, alias = "prev_summary", alias = "old_summary")]
    summary: Option<String>,
}

/// Read both live note files and decide how this cycle should apply them.
/// When both are ready, the file touched more recently wins: a fresher
/// branch note means the leaf describes the work that branch closes out,
/// so the pair collapses; a fresher leaf note means two independent edits.
pub fn plan_notes(paths: &StemPaths) -> Result<NotePlan> {
    let branch_path = paths.branch_note_path();
    let leaf_path = paths.leaf_note_path();
    let branch = load_note(&branch_path)?;
    let leaf = load_note(&leaf_path)?;

    Ok(match (leaf, branch) {
        (None, None) => NotePlan::None,
        (None, Some(branch)) => NotePlan::BranchOnly(branch),
        (Some(leaf), None) => NotePlan::LeafOnly(leaf),
        (Some(leaf), Some(branch)) => {
            if mtime(&branch_path) >= mtime(&leaf_path) {
                NotePlan::Collapse { leaf, branch }
            } else {
                NotePlan::Sequential { leaf, branch }
            }
        }
    })
}

/// A ready note, or None when the file is missing, blanked, incomplete, or
/// unreadable. Malformed content is logged and skipped; an agent may be
/// mid-edit.
fn load_note(path: &Path) -> Result<Option<AgentNote>> {
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading note file {}", path.display()))?;
    let parsed: NoteFile = match serde_json::from_str(&text) {
        Ok(parsed) => parsed,
        Err(e) => {
            log::warn!("Ignoring malformed note file {}: {e}", path.display());
            return Ok(None);
        }
    };
    let prompt = normalize_prompt(parsed.prompt.as_deref().unwrap_or_default());
    let summary = normalize_prompt(parsed.summary.as_deref().unwrap_or_default());
    if prompt.is_empty() || summary.is_empty() {
        return Ok(None);
    }
    Ok(Some(AgentNote { prompt, summary }))
}

fn mtime(path: &Path) -> SystemTime {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

/// Reset a consumed note file to its reusable blank shape. Only called
/// after the command it carried was applied.
pub fn blank_note(path: &Path) -> Result<()> {
    fs::write(path, "{\"prompt\": \"\", \"summary\": \"\"}\n")
        .with_context(|| format!("blanking note file {}", path.display()))?;
    Ok(())
}
