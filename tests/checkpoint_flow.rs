use std::fs;
use std::path::Path;
use std::process::Command;
use std::thread;
use std::time::Duration;

use stem::domains::agent::executor::Executor;
use stem::domains::checkpoints::service::{CheckpointService, JumpSpec};
use stem::domains::watch;
use stem::errors::StemError;
use stem::infrastructure::database::{
    BranchMethods, Database, ExecLedgerMethods, LeafMethods, MetaMethods, initialize_schema,
};
use stem::shared::paths::StemPaths;
use tempfile::TempDir;

fn git(repo: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Fresh repo with an initial commit, store schema and agent directories.
fn setup() -> (TempDir, Executor) {
    let dir = TempDir::new().unwrap();
    let repo = dir.path();
    git(repo, &["init"]);
    git(repo, &["config", "user.email", "dev@example.com"]);
    git(repo, &["config", "user.name", "dev"]);
    fs::write(repo.join("README.md"), "hello\n").unwrap();
    git(repo, &["add", "-A"]);
    git(repo, &["commit", "-m", "initial"]);

    let paths = StemPaths::new(repo);
    fs::create_dir_all(paths.queue_dir()).unwrap();
    fs::create_dir_all(paths.archive_dir()).unwrap();
    let db = Database::open(&paths.db_path()).unwrap();
    initialize_schema(&db).unwrap();
    let service = CheckpointService::new(db, paths);
    (dir, Executor::new(service))
}

fn tree_hash(repo: &Path) -> String {
    git(repo, &["rev-parse", "HEAD^{tree}"])
}

#[test]
fn branch_update_jump_round_trip() {
    let (dir, executor) = setup();
    let repo = dir.path();
    let service = executor.service();

    let (branch, first) = service.create_branch("add login", "login form").unwrap();
    assert_eq!(branch.branch_id, "b0001");
    assert_eq!(first.leaf_id, "001a");
    assert_eq!(git(repo, &["rev-parse", "--abbrev-ref", "HEAD"]), branch.git_branch);

    fs::write(repo.join("login.rs"), "fn login() {}\n").unwrap();
    let second = service
        .append_update("fix validation", "validation done", None)
        .unwrap();
    assert_eq!(second.leaf_id, "001b");
    let after_update = tree_hash(repo);

    let outcome = service.jump(&JumpSpec::Bare("b0001".to_string())).unwrap();
    assert_eq!(outcome.branch_id, "b0001");
    assert_eq!(outcome.leaf_id, "001b");
    assert!(!outcome.detached);
    assert_eq!(tree_hash(repo), after_update);
    assert_eq!(
        service.db().current_branch_id().unwrap().as_deref(),
        Some("b0001")
    );
}

#[test]
fn jump_to_old_leaf_detaches_and_records_ancestry() {
    let (dir, executor) = setup();
    let repo = dir.path();
    let service = executor.service();

    service.create_branch("first topic", "s").unwrap();
    fs::write(repo.join("a.txt"), "a\n").unwrap();
    service.append_update("step one", "s", None).unwrap();
    fs::write(repo.join("b.txt"), "b\n").unwrap();
    service.append_update("step two", "s", None).unwrap();

    let outcome = service
        .jump(&JumpSpec::Leaf {
            leaf_id: "001b".to_string(),
            branch_id: None,
        })
        .unwrap();
    assert!(outcome.detached);
    assert_eq!(outcome.leaf_id, "001b");
    // the tree at 001b has a.txt but not yet b.txt
    assert!(repo.join("a.txt").exists());
    assert!(!repo.join("b.txt").exists());
}

#[test]
fn private_only_dirt_forces_without_stash() {
    let (dir, executor) = setup();
    let repo = dir.path();
    let service = executor.service();

    service.create_branch("one", "s").unwrap();
    service.create_branch("two", "s").unwrap();

    // bookkeeping write that would normally block a checkout
    fs::write(repo.join(".stem/agent/scratch.json"), "{}").unwrap();
    let outcome = service.jump(&JumpSpec::Head("b0001".to_string())).unwrap();
    assert!(!outcome.stashed);
    assert_eq!(git(repo, &["stash", "list"]), "");
}

#[test]
fn user_dirt_is_stashed_exactly_once() {
    let (dir, executor) = setup();
    let repo = dir.path();
    let service = executor.service();

    service.create_branch("one", "s").unwrap();
    service.create_branch("two", "s").unwrap();

    fs::write(repo.join("README.md"), "edited but not committed\n").unwrap();
    let outcome = service.jump(&JumpSpec::Head("b0001".to_string())).unwrap();
    assert!(outcome.stashed);

    let stashes = git(repo, &["stash", "list"]);
    let lines: Vec<&str> = stashes.lines().collect();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("stem: auto-stash"));
}

#[test]
fn ambiguous_bare_jump_fails_without_checkout() {
    let (dir, executor) = setup();
    let repo = dir.path();
    let service = executor.service();

    // two branches, each with a leaf named 001a
    service.create_branch("one", "s").unwrap();
    service.create_branch("two", "s").unwrap();
    let head_before = git(repo, &["rev-parse", "HEAD"]);

    let err = service
        .jump(&JumpSpec::Bare("001a".to_string()))
        .unwrap_err();
    assert!(
        matches!(
            err.downcast_ref::<StemError>(),
            Some(StemError::AmbiguousLeaf { .. })
        ),
        "got: {err}"
    );
    assert_eq!(git(repo, &["rev-parse", "HEAD"]), head_before);
}

#[test]
fn replayed_queue_command_is_archived_as_duplicate() {
    let (dir, executor) = setup();
    let service = executor.service();
    let paths = service.paths().clone();

    let body = r#"{"command":"branch","prompt":"agent work","summary":"from queue","nonce":"agent-1"}"#;
    fs::write(paths.queue_dir().join("cmd-1.json"), body).unwrap();
    let stats = executor.drain().unwrap();
    assert_eq!(stats.applied, 1);
    assert!(paths.archive_dir().join("cmd-1.json.done").exists());
    assert_eq!(service.db().branch_count().unwrap(), 1);

    // same nonce again: no new rows, duplicate marker
    fs::write(paths.queue_dir().join("cmd-2.json"), body).unwrap();
    let stats = executor.drain().unwrap();
    assert_eq!(stats.applied, 0);
    assert_eq!(stats.duplicates, 1);
    assert!(paths.archive_dir().join("cmd-2.json.dup").exists());
    assert_eq!(service.db().branch_count().unwrap(), 1);
    assert_eq!(service.db().list_branches(10).unwrap().len(), 1);
}

#[test]
fn malformed_queue_file_is_archived_as_invalid() {
    let (_dir, executor) = setup();
    let paths = executor.service().paths().clone();

    fs::write(
        paths.queue_dir().join("bad.json"),
        r#"{"command":"branch","prompt":"p","summary":"s","surprise":true}"#,
    )
    .unwrap();
    let stats = executor.drain().unwrap();
    assert_eq!(stats.invalid, 1);
    assert!(paths.archive_dir().join("bad.json.invalid").exists());
    assert_eq!(executor.service().db().branch_count().unwrap(), 0);
}

#[test]
fn ready_note_files_collapse_by_modification_time() {
    let (_dir, executor) = setup();
    let service = executor.service();
    let paths = service.paths().clone();

    service.create_branch("first", "s").unwrap();

    fs::write(
        paths.leaf_note_path(),
        r#"{"prompt": "wrap up auth", "summary": "auth finished"}"#,
    )
    .unwrap();
    fs::write(
        paths.branch_note_path(),
        r#"{"prompt": "start payments", "summary": "new topic"}"#,
    )
    .unwrap();
    filetime::set_file_mtime(paths.leaf_note_path(), filetime::FileTime::from_unix_time(1_000, 0))
        .unwrap();
    filetime::set_file_mtime(
        paths.branch_note_path(),
        filetime::FileTime::from_unix_time(2_000, 0),
    )
    .unwrap();

    let stats = executor.drain().unwrap();
    assert_eq!(stats.applied, 1);

    // b0001 got its closing leaf, b0002 opened with the payments prompt
    let closing = service.db().list_leaves("b0001", 1).unwrap();
    assert_eq!(closing[0].prompt, "wrap up auth");
    let opened = service.db().get_branch("b0002").unwrap().unwrap();
    assert_eq!(opened.prompt, "start payments");

    // both notes blanked for reuse
    let leaf_note = fs::read_to_string(paths.leaf_note_path()).unwrap();
    assert!(leaf_note.contains("\"prompt\": \"\""));
    let stats = executor.drain().unwrap();
    assert_eq!(stats.applied, 0);
}

#[test]
fn scoped_update_commits_on_the_scoped_branch() {
    let (dir, executor) = setup();
    let repo = dir.path();
    let service = executor.service();

    let (b1, _) = service.create_branch("one", "s").unwrap();
    let (b2, _) = service.create_branch("two", "s").unwrap();
    assert_eq!(git(repo, &["rev-parse", "--abbrev-ref", "HEAD"]), b2.git_branch);

    let leaf = service
        .append_update("backport fix", "s", Some("b0001"))
        .unwrap();

    // the snapshot commit is the new head of b0001's git branch, not b0002's
    assert_eq!(leaf.git_commit, git(repo, &["rev-parse", &b1.git_branch]));
    assert_ne!(leaf.git_commit, git(repo, &["rev-parse", &b2.git_branch]));

    // jumping to the branch head materializes exactly that leaf's tree
    let outcome = service.jump(&JumpSpec::Head("b0001".to_string())).unwrap();
    assert_eq!(outcome.leaf_id, leaf.leaf_id);
    assert_eq!(git(repo, &["rev-parse", "HEAD"]), leaf.git_commit);
}

#[test]
fn failing_command_is_left_for_retry_and_does_not_block_the_queue() {
    let (_dir, executor) = setup();
    let paths = executor.service().paths().clone();

    let stuck = paths.queue_dir().join("stuck.json");
    fs::write(&stuck, r#"{"command":"jump","target":"b9999"}"#).unwrap();
    let later = paths.queue_dir().join("later.json");
    fs::write(&later, r#"{"command":"branch","prompt":"p","summary":"s"}"#).unwrap();
    filetime::set_file_mtime(&stuck, filetime::FileTime::from_unix_time(1_000, 0)).unwrap();
    filetime::set_file_mtime(&later, filetime::FileTime::from_unix_time(2_000, 0)).unwrap();

    let stats = executor.drain().unwrap();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.applied, 1);
    // the failing artifact is still pending, the one behind it went through
    assert!(stuck.exists());
    assert!(paths.archive_dir().join("later.json.done").exists());
}

#[test]
fn heartbeat_continues_while_a_command_keeps_failing() {
    let (dir, executor) = setup();
    let paths = executor.service().paths().clone();
    fs::write(
        paths.queue_dir().join("stuck.json"),
        r#"{"command":"jump","target":"b9999"}"#,
    )
    .unwrap();

    thread::spawn(move || {
        let _ = watch::run_foreground(&executor, 1, false);
    });

    let heartbeat = paths.heartbeat_path();
    let mut seen = false;
    for _ in 0..50 {
        if heartbeat.exists() {
            seen = true;
            break;
        }
        thread::sleep(Duration::from_millis(100));
    }
    assert!(seen, "no heartbeat while a failing command sat in the queue");
    assert!(paths.queue_dir().join("stuck.json").exists());
    drop(dir);
}

#[test]
fn failing_note_command_leaves_the_note_intact() {
    let (_dir, executor) = setup();
    let paths = executor.service().paths().clone();

    // the leaf note is ready but there is no branch to update yet
    let body = r#"{"prompt": "wrap up", "summary": "done"}"#;
    fs::write(paths.leaf_note_path(), body).unwrap();

    let stats = executor.drain().unwrap();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.applied, 0);
    assert_eq!(fs::read_to_string(paths.leaf_note_path()).unwrap(), body);
}

#[test]
fn missing_nonce_is_derived_and_still_gates_replays() {
    let (_dir, executor) = setup();
    let paths = executor.service().paths().clone();

    fs::write(
        paths.queue_dir().join("cmd.json"),
        r#"{"command":"branch","prompt":"p","summary":"s"}"#,
    )
    .unwrap();
    let stats = executor.drain().unwrap();
    assert_eq!(stats.applied, 1);

    let db = executor.service().db();
    let nonce = db.last_exec_nonce().unwrap().unwrap();
    assert!(nonce.starts_with("branch-"), "got nonce {nonce}");

    // redelivery carrying the recorded nonce is deduplicated
    let replay = format!(r#"{{"command":"branch","prompt":"p","summary":"s","nonce":"{nonce}"}}"#);
    fs::write(paths.queue_dir().join("replay.json"), replay).unwrap();
    let stats = executor.drain().unwrap();
    assert_eq!(stats.duplicates, 1);
    assert_eq!(db.branch_count().unwrap(), 1);
}
