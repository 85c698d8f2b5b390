use super::notes::{self, AgentNote, NotePlan};
use super::protocol::{Command, JumpMode, ParsedCommand, parse_command};
use super::queue::{ArchiveMark, archive_file, list_queue_files};
use crate::domains::checkpoints::service::{CheckpointService, JumpSpec};
use crate::infrastructure::database::ExecLedgerMethods;
use anyhow::{Context, Result};
use chrono::Utc;
use std::fs;
use std::path::Path;

/// How one command artifact was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    Applied,
    Duplicate,
    Invalid,
}

/// Tally of one drain pass, reported by `exec` and the watch heartbeat.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DrainStats {
    pub applied: usize,
    pub duplicates: usize,
    pub invalid: usize,
    /// Artifacts whose apply failed; left in place for the next cycle.
    pub failed: usize,
}

/// Applies agent commands exactly once, whatever their source. Every apply
/// goes through the same path: ledger check, checkpoint mutation, nonce
/// record, artifact disposal.
pub struct Executor {
    service: CheckpointService,
}

impl Executor {
    pub fn new(service: CheckpointService) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &CheckpointService {
        &self.service
    }

    /// One full pass: queue files oldest-first, then the live note files.
    /// A failing artifact is logged and skipped, never allowed to block the
    /// ones behind it.
    pub fn drain(&self) -> Result<DrainStats> {
        let mut stats = DrainStats::default();
        for file in list_queue_files(&self.service.paths().queue_dir())? {
            match self.process_queue_file(&file) {
                Ok(ExecOutcome::Applied) => stats.applied += 1,
                Ok(ExecOutcome::Duplicate) => stats.duplicates += 1,
                Ok(ExecOutcome::Invalid) => stats.invalid += 1,
                Err(e) => {
                    stats.failed += 1;
                    log::warn!("Leaving {} in the queue for retry: {e:#}", file.display());
                }
            }
        }
        match self.process_notes() {
            Ok(applied) => stats.applied += applied,
            Err(e) => {
                stats.failed += 1;
                log::warn!("Live note command failed, note left intact: {e:#}");
            }
        }
        Ok(stats)
    }

    /// Consume one queue file. Validation failures archive the file as
    /// invalid; an apply failure leaves the file in place for the next
    /// cycle to retry.
    pub fn process_queue_file(&self, file: &Path) -> Result<ExecOutcome> {
        let archive_dir = self.service.paths().archive_dir();
        let text =
            fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
        let parsed = match parse_command(&text) {
            Ok(parsed) => parsed,
            Err(e) => {
                log::warn!("Rejecting command file {}: {e}", file.display());
                archive_file(file, &archive_dir, ArchiveMark::Invalid)?;
                return Ok(ExecOutcome::Invalid);
            }
        };

        let source = file
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("queue")
            .to_string();
        let outcome = self.apply(parsed, &source)?;
        let mark = match outcome {
            ExecOutcome::Applied => ArchiveMark::Done,
            ExecOutcome::Duplicate => ArchiveMark::Duplicate,
            ExecOutcome::Invalid => ArchiveMark::Invalid,
        };
        archive_file(file, &archive_dir, mark)?;
        Ok(outcome)
    }

    /// Apply the live note files according to this cycle's plan. Notes are
    /// blanked only after their command applied, so a crash mid-apply
    /// re-offers the note next cycle.
    fn process_notes(&self) -> Result<usize> {
        let paths = self.service.paths().clone();
        let plan = notes::plan_notes(&paths)?;
        let applied = match plan {
            NotePlan::None => 0,
            NotePlan::BranchOnly(branch) => {
                self.apply_note(branch_command(&branch), "branch.json")?;
                notes::blank_note(&paths.branch_note_path())?;
                1
            }
            NotePlan::LeafOnly(leaf) => {
                self.apply_note(update_command(&leaf), "leaf.json")?;
                notes::blank_note(&paths.leaf_note_path())?;
                1
            }
            NotePlan::Collapse { leaf, branch } => {
                self.apply_note(
                    Command::UpdateBranch {
                        prev_prompt: leaf.prompt,
                        prev_summary: leaf.summary,
                        prompt: branch.prompt,
                        summary: branch.summary,
                        branch_id: None,
                    },
                    "branch.json",
                )?;
                notes::blank_note(&paths.leaf_note_path())?;
                notes::blank_note(&paths.branch_note_path())?;
                1
            }
            NotePlan::Sequential { leaf, branch } => {
                self.apply_note(update_command(&leaf), "leaf.json")?;
                notes::blank_note(&paths.leaf_note_path())?;
                self.apply_note(branch_command(&branch), "branch.json")?;
                notes::blank_note(&paths.branch_note_path())?;
                2
            }
        };
        Ok(applied)
    }

    fn apply_note(&self, command: Command, source: &str) -> Result<()> {
        let parsed = ParsedCommand {
            command,
            nonce: String::new(),
        };
        self.apply(parsed, source)?;
        Ok(())
    }

    /// The idempotence gate: look up the nonce, apply, record the nonce.
    pub fn apply(&self, parsed: ParsedCommand, source: &str) -> Result<ExecOutcome> {
        let nonce = if parsed.nonce.is_empty() {
            derive_nonce(parsed.command.kind())
        } else {
            parsed.nonce.clone()
        };
        let db = self.service.db();
        if db.has_exec_nonce(&nonce)? {
            log::info!("Skipping replayed command (nonce {nonce})");
            return Ok(ExecOutcome::Duplicate);
        }

        let kind = parsed.command.kind();
        self.run_command(parsed.command)?;
        db.insert_exec_nonce(&nonce, kind, source)?;
        Ok(ExecOutcome::Applied)
    }

    fn run_command(&self, command: Command) -> Result<()> {
        match command {
            Command::Branch { prompt, summary } => {
                let (branch, _leaf) = self.service.create_branch(&prompt, &summary)?;
                log::info!("Opened branch {} ({})", branch.branch_id, branch.git_branch);
            }
            Command::Update {
                prev_prompt,
                prev_summary,
                branch_id,
            } => {
                let leaf =
                    self.service
                        .append_update(&prev_prompt, &prev_summary, branch_id.as_deref())?;
                log::info!("Appended leaf {} to {}", leaf.leaf_id, leaf.branch_id);
            }
            Command::UpdateBranch {
                prev_prompt,
                prev_summary,
                prompt,
                summary,
                branch_id,
            } => {
                let (closing, branch, _opening) = self.service.update_and_branch(
                    &prev_prompt,
                    &prev_summary,
                    &prompt,
                    &summary,
                    branch_id.as_deref(),
                )?;
                log::info!(
                    "Closed {} with leaf {}, opened {}",
                    closing.branch_id,
                    closing.leaf_id,
                    branch.branch_id
                );
            }
            Command::Jump { target, mode } => {
                let spec = match mode {
                    JumpMode::Head => JumpSpec::Head(target),
                    JumpMode::Leaf => JumpSpec::Leaf {
                        leaf_id: target,
                        branch_id: None,
                    },
                    JumpMode::Bare => JumpSpec::Bare(target),
                };
                let outcome = self.service.jump(&spec)?;
                log::info!(
                    "Jumped to {}/{}{}",
                    outcome.branch_id,
                    outcome.leaf_id,
                    if outcome.stashed { " (stashed)" } else { "" }
                );
            }
        }
        Ok(())
    }
}

fn branch_command(note: &AgentNote) -> Command {
    Command::Branch {
        prompt: note.prompt.clone(),
        summary: note.summary.clone(),
    }
}

fn update_command(note: &AgentNote) -> Command {
    Command::Update {
        prev_prompt: note.prompt.clone(),
        prev_summary: note.summary.clone(),
        branch_id: None,
    }
}

/// Fallback nonce for artifacts that did not carry one. Millisecond
/// granularity dedupes accidental double delivery within the same instant,
/// nothing stronger.
fn derive_nonce(kind: &str) -> String {
    format!("{kind}-{}", Utc::now().timestamp_millis())
}
