use std::path::{Path, PathBuf};

/// Name of the tool's private state directory at the repository root.
/// Dirty paths under this directory never block navigation (see safe checkout).
pub const PRIVATE_DIR: &str = ".stem";

/// Resolved filesystem layout for one checkpointed repository.
#[derive(Debug, Clone)]
pub struct StemPaths {
    root: PathBuf,
}

impl StemPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn repo_root(&self) -> &Path {
        &self.root
    }

    pub fn stem_dir(&self) -> PathBuf {
        self.root.join(PRIVATE_DIR)
    }

    pub fn db_path(&self) -> PathBuf {
        self.stem_dir().join("stem.db")
    }

    pub fn agent_dir(&self) -> PathBuf {
        self.stem_dir().join("agent")
    }

    pub fn queue_dir(&self) -> PathBuf {
        self.agent_dir().join("queue")
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.agent_dir().join("archive")
    }

    pub fn branch_note_path(&self) -> PathBuf {
        self.agent_dir().join("branch.json")
    }

    pub fn leaf_note_path(&self) -> PathBuf {
        self.agent_dir().join("leaf.json")
    }

    pub fn heartbeat_path(&self) -> PathBuf {
        self.agent_dir().join("heartbeat.json")
    }

    pub fn pid_path(&self) -> PathBuf {
        self.agent_dir().join("watch.pid")
    }

    pub fn is_initialized(&self) -> bool {
        self.db_path().exists()
    }
}

/// True when a repo-relative path lives inside the private state directory.
pub fn is_private_path(rel_path: &str) -> bool {
    let trimmed = rel_path.trim_matches('"');
    trimmed == PRIVATE_DIR || trimmed.starts_with(&format!("{PRIVATE_DIR}/"))
}
