use crate::cli::{Cli, Commands};
use crate::domains::agent::executor::Executor;
use crate::domains::agent::notes::blank_note;
use crate::domains::agent::queue::list_queue_files;
use crate::domains::checkpoints::service::{CheckpointService, JumpSpec};
use crate::domains::{git, watch};
use crate::errors::StemError;
use crate::infrastructure::database::{
    BranchMethods, Database, LeafMethods, MetaMethods, initialize_schema, verify_schema,
};
use crate::shared::paths::StemPaths;
use anyhow::{Context, Result};
use chrono::Utc;
use std::fs;

/// Everything a command against an initialized repository needs.
struct RepoContext {
    paths: StemPaths,
    executor: Executor,
}

impl RepoContext {
    /// Resolve the repository from the working directory and open its
    /// store. Fails when `create` has not been run here.
    fn discover() -> Result<Self> {
        let cwd = std::env::current_dir().context("resolving working directory")?;
        let root = git::toplevel(&cwd)?;
        let paths = StemPaths::new(root);
        if !paths.is_initialized() {
            return Err(StemError::NotInitialized {
                path: paths.repo_root().display().to_string(),
            }
            .into());
        }
        let db = Database::open(&paths.db_path())?;
        verify_schema(&db)?;
        let service = CheckpointService::new(db, paths.clone());
        Ok(Self {
            paths,
            executor: Executor::new(service),
        })
    }

    fn service(&self) -> &CheckpointService {
        self.executor.service()
    }
}

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Create { agent, force } => create(agent, force),
        Commands::Branch { prompt, summary } => branch(&prompt, summary.as_deref()),
        Commands::Update {
            prompt,
            summary,
            final_prompt,
        } => update(&prompt, summary.as_deref(), final_prompt.as_deref()),
        Commands::Jump {
            target,
            leaf_id,
            head,
            leaf,
        } => jump(target, leaf_id, head, leaf),
        Commands::Exec => exec(),
        Commands::Watch {
            interval,
            daemon,
            stop,
        } => watch_cmd(interval, daemon, stop),
        Commands::Status => status(),
        Commands::List { limit, leaves } => list(limit, leaves),
    }
}

fn create(agent: bool, force: bool) -> Result<()> {
    let cwd = std::env::current_dir().context("resolving working directory")?;
    git::ensure_repo(&cwd)?;
    let root = git::toplevel(&cwd)?;
    let paths = StemPaths::new(root);

    fs::create_dir_all(paths.stem_dir())
        .with_context(|| format!("creating {}", paths.stem_dir().display()))?;
    if force && paths.db_path().exists() {
        fs::remove_file(paths.db_path())
            .with_context(|| format!("resetting {}", paths.db_path().display()))?;
        log::warn!("Discarded existing checkpoint store at {}", paths.db_path().display());
    }
    let db = Database::open(&paths.db_path())?;
    initialize_schema(&db)?;
    verify_schema(&db)?;

    if agent {
        fs::create_dir_all(paths.queue_dir())?;
        fs::create_dir_all(paths.archive_dir())?;
        for note in [paths.branch_note_path(), paths.leaf_note_path()] {
            if force || !note.exists() {
                blank_note(&note)?;
            }
        }
        println!(
            "Initialized {} with agent queue at {}",
            paths.stem_dir().display(),
            paths.queue_dir().display()
        );
    } else {
        println!("Initialized {}", paths.stem_dir().display());
    }
    Ok(())
}

fn branch(prompt: &str, summary: Option<&str>) -> Result<()> {
    let ctx = RepoContext::discover()?;
    let summary = summary.unwrap_or(prompt);
    let (branch, leaf) = ctx.service().create_branch(prompt, summary)?;
    println!(
        "Opened {} ({}) at leaf {}",
        branch.branch_id, branch.git_branch, leaf.leaf_id
    );
    Ok(())
}

fn update(prompt: &str, summary: Option<&str>, final_prompt: Option<&str>) -> Result<()> {
    let ctx = RepoContext::discover()?;
    let summary = summary.unwrap_or(prompt);
    match final_prompt {
        Some(final_prompt) => {
            let (closing, branch, _) = ctx.service().update_and_branch(
                final_prompt,
                final_prompt,
                prompt,
                summary,
                None,
            )?;
            println!(
                "Closed {} with leaf {}, opened {}",
                closing.branch_id, closing.leaf_id, branch.branch_id
            );
        }
        None => {
            let leaf = ctx.service().append_update(prompt, summary, None)?;
            println!("Checkpointed leaf {} on {}", leaf.leaf_id, leaf.branch_id);
        }
    }
    Ok(())
}

fn jump(target: String, leaf_id: Option<String>, head: bool, leaf: bool) -> Result<()> {
    let ctx = RepoContext::discover()?;
    let spec = match (leaf_id, head, leaf) {
        (Some(leaf_id), _, _) => JumpSpec::Leaf {
            leaf_id,
            branch_id: Some(target),
        },
        (None, true, _) => JumpSpec::Head(target),
        (None, _, true) => JumpSpec::Leaf {
            leaf_id: target,
            branch_id: None,
        },
        (None, false, false) => JumpSpec::Bare(target),
    };
    let outcome = ctx.service().jump(&spec)?;
    print!("Now at {}/{}", outcome.branch_id, outcome.leaf_id);
    if outcome.detached {
        print!(" (detached)");
    }
    if outcome.stashed {
        print!(" (local changes stashed)");
    }
    println!();
    Ok(())
}

fn exec() -> Result<()> {
    let ctx = RepoContext::discover()?;
    let stats = ctx.executor.drain()?;
    println!(
        "Applied {} command(s), {} duplicate(s), {} invalid, {} failed",
        stats.applied, stats.duplicates, stats.invalid, stats.failed
    );
    Ok(())
}

fn watch_cmd(interval: u64, daemon: bool, stop: bool) -> Result<()> {
    let ctx = RepoContext::discover()?;
    fs::create_dir_all(ctx.paths.queue_dir())?;
    fs::create_dir_all(ctx.paths.archive_dir())?;

    if stop {
        let pid = watch::stop_daemon(&ctx.paths)?;
        println!("Stopped watcher (pid {pid})");
        return Ok(());
    }
    if daemon {
        let pid = watch::spawn_daemon(&ctx.paths, interval)?;
        println!("Watcher running in background (pid {pid})");
        return Ok(());
    }
    watch::run_foreground(&ctx.executor, interval, true)
}

fn status() -> Result<()> {
    let ctx = RepoContext::discover()?;
    let db = ctx.service().db();

    match db.current_branch_id()? {
        Some(branch_id) => {
            let branch = db.get_branch(&branch_id)?;
            let name = branch
                .as_ref()
                .map(|b| b.git_branch.as_str())
                .unwrap_or("?");
            println!("Current branch: {branch_id} ({name})");
            let leaves = db.list_leaves(&branch_id, 3)?;
            for leaf in &leaves {
                println!("  {}  {}", leaf.leaf_id, leaf.prompt);
            }
            if let Some(latest) = leaves.first()
                && let Ok(stat) = git::show_stat(ctx.paths.repo_root(), &latest.git_commit)
                && let Some(line) = stat.lines().last()
            {
                println!("Last checkpoint:{line}");
            }
        }
        None => println!("Current branch: none"),
    }
    println!("Branches: {}", db.branch_count()?);
    println!(
        "Queue: {} pending",
        list_queue_files(&ctx.paths.queue_dir())?.len()
    );

    match watch::read_heartbeat(&ctx.paths)? {
        Some(hb) => {
            let age = (Utc::now().timestamp() - hb.timestamp).max(0) as u64;
            if watch::is_stale(age, hb.interval) {
                println!("Watcher: stale (last heartbeat {age}s ago, pid {})", hb.pid);
            } else {
                println!(
                    "Watcher: alive (pid {}, queue depth {}, every {}s)",
                    hb.pid, hb.queue, hb.interval
                );
            }
        }
        None => println!("Watcher: not running"),
    }
    Ok(())
}

fn list(limit: usize, leaves: usize) -> Result<()> {
    let ctx = RepoContext::discover()?;
    let db = ctx.service().db();
    let current = db.current_branch_id()?;

    let branches = db.list_branches(limit)?;
    if branches.is_empty() {
        println!("No branches yet, run 'stem branch <prompt>' to start one");
        return Ok(());
    }
    for branch in branches {
        let marker = if current.as_deref() == Some(branch.branch_id.as_str()) {
            "*"
        } else {
            " "
        };
        println!(
            "{marker} {}  {}  {}",
            branch.branch_id,
            branch.created_at.format("%Y-%m-%d %H:%M"),
            branch.prompt
        );
        for leaf in db.list_leaves(&branch.branch_id, leaves)? {
            println!("    {}  {}", leaf.leaf_id, leaf.prompt);
        }
    }
    Ok(())
}
