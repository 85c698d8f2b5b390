use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Archive marker appended to a consumed queue file's name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveMark {
    /// Applied successfully.
    Done,
    /// Nonce already in the ledger.
    Duplicate,
    /// Failed validation, never applied.
    Invalid,
}

impl ArchiveMark {
    fn suffix(self) -> &'static str {
        match self {
            ArchiveMark::Done => "done",
            ArchiveMark::Duplicate => "dup",
            ArchiveMark::Invalid => "invalid",
        }
    }
}

/// Pending command files, oldest modification first, so commands are
/// applied in the order agents dropped them.
pub fn list_queue_files(queue_dir: &Path) -> Result<Vec<PathBuf>> {
    if !queue_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files: Vec<(SystemTime, PathBuf)> = Vec::new();
    for entry in fs::read_dir(queue_dir)
        .with_context(|| format!("reading queue directory {}", queue_dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let mtime = entry
            .metadata()?
            .modified()
            .unwrap_or(SystemTime::UNIX_EPOCH);
        files.push((mtime, path));
    }
    files.sort();
    Ok(files.into_iter().map(|(_, path)| path).collect())
}

/// Move a consumed queue file into the archive with its outcome marker.
/// If the rename fails the file is removed instead, so a consumed command
/// can never be picked up again.
pub fn archive_file(file: &Path, archive_dir: &Path, mark: ArchiveMark) -> Result<()> {
    fs::create_dir_all(archive_dir)?;
    let name = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("command.json");
    let target = archive_dir.join(format!("{name}.{}", mark.suffix()));
    if let Err(e) = fs::rename(file, &target) {
        log::warn!(
            "Could not archive {} to {}: {e}; removing instead",
            file.display(),
            target.display()
        );
        fs::remove_file(file)
            .with_context(|| format!("removing consumed command {}", file.display()))?;
    }
    Ok(())
}
