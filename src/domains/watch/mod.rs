use crate::domains::agent::executor::{DrainStats, Executor};
use crate::domains::agent::queue::list_queue_files;
use crate::infrastructure::database::ExecLedgerMethods;
use crate::shared::paths::StemPaths;
use anyhow::{Context, Result, anyhow, bail};
use chrono::Utc;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use std::fs;
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

/// Floor on the polling interval to keep a mistyped `--interval 0` from
/// busy-looping.
pub const MIN_INTERVAL_SECS: u64 = 1;

const STALE_FLOOR_SECS: u64 = 5;
const STALE_INTERVAL_FACTOR: u64 = 3;

/// Written each cycle so `status` can see the daemon without talking to it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Heartbeat {
    pub queue: usize,
    pub last_nonce: Option<String>,
    pub timestamp: i64,
    pub pid: u32,
    pub interval: u64,
}

/// A heartbeat older than max(5s, 3x interval) counts as dead even if the
/// file is still on disk.
pub fn is_stale(age_secs: u64, interval: u64) -> bool {
    age_secs > STALE_FLOOR_SECS.max(STALE_INTERVAL_FACTOR * interval)
}

pub fn read_heartbeat(paths: &StemPaths) -> Result<Option<Heartbeat>> {
    let path = paths.heartbeat_path();
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(&path)
        .with_context(|| format!("reading heartbeat {}", path.display()))?;
    let heartbeat = serde_json::from_str(&text)
        .with_context(|| format!("decoding heartbeat {}", path.display()))?;
    Ok(Some(heartbeat))
}

fn write_heartbeat(paths: &StemPaths, heartbeat: &Heartbeat) -> Result<()> {
    let body = serde_json::to_string_pretty(heartbeat)?;
    fs::write(paths.heartbeat_path(), body)
        .with_context(|| "writing heartbeat".to_string())?;
    Ok(())
}

/// Blocking poll loop. One cycle drains all pending artifacts, writes the
/// heartbeat and sleeps. Cycle errors are logged and the loop keeps going;
/// a wedged repository should not kill the daemon.
pub fn run_foreground(executor: &Executor, interval: u64, print_heartbeat: bool) -> Result<()> {
    let interval = interval.max(MIN_INTERVAL_SECS);
    let paths = executor.service().paths().clone();
    log::info!("Watching {} every {interval}s", paths.repo_root().display());

    loop {
        if let Err(e) = cycle(executor, &paths, interval, print_heartbeat) {
            log::error!("Watch cycle failed: {e:#}");
        }
        thread::sleep(Duration::from_secs(interval));
    }
}

fn cycle(
    executor: &Executor,
    paths: &StemPaths,
    interval: u64,
    print_heartbeat: bool,
) -> Result<()> {
    // a failing drain must not starve the heartbeat: monitors need to be
    // able to tell a dead daemon from a failing command
    let stats = match executor.drain() {
        Ok(stats) => stats,
        Err(e) => {
            log::error!("Drain failed: {e:#}");
            DrainStats::default()
        }
    };
    if stats.applied > 0 || stats.duplicates > 0 || stats.invalid > 0 || stats.failed > 0 {
        log::info!(
            "Cycle applied {} command(s), {} duplicate(s), {} invalid, {} failed",
            stats.applied,
            stats.duplicates,
            stats.invalid,
            stats.failed
        );
    }

    let heartbeat = Heartbeat {
        queue: list_queue_files(&paths.queue_dir())?.len(),
        last_nonce: executor.service().db().last_exec_nonce()?,
        timestamp: Utc::now().timestamp(),
        pid: std::process::id(),
        interval,
    };
    write_heartbeat(paths, &heartbeat)?;
    if print_heartbeat {
        println!(
            "[watch] queue={} applied={} last_nonce={}",
            heartbeat.queue,
            stats.applied,
            heartbeat.last_nonce.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

/// Re-invoke this binary as a detached `watch` child and record its PID.
pub fn spawn_daemon(paths: &StemPaths, interval: u64) -> Result<u32> {
    let interval = interval.max(MIN_INTERVAL_SECS);
    let exe = std::env::current_exe().context("resolving current executable")?;
    let child = Command::new(exe)
        .arg("watch")
        .arg("--interval")
        .arg(interval.to_string())
        .current_dir(paths.repo_root())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .process_group(0)
        .spawn()
        .context("spawning watch daemon")?;
    let pid = child.id();
    fs::write(paths.pid_path(), pid.to_string())
        .with_context(|| format!("writing pid file {}", paths.pid_path().display()))?;
    Ok(pid)
}

/// Terminate the recorded daemon and clear its files. Falls back to the
/// heartbeat's PID when the pid file is gone; a PID that no longer exists
/// still counts as stopped.
pub fn stop_daemon(paths: &StemPaths) -> Result<u32> {
    let pid = recorded_pid(paths)?
        .ok_or_else(|| anyhow!("no watch daemon recorded (no pid file or heartbeat)"))?;

    match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        Ok(()) => {}
        Err(nix::errno::Errno::ESRCH) => {
            log::warn!("Watch daemon pid {pid} was already gone");
        }
        Err(e) => bail!("could not signal watch daemon pid {pid}: {e}"),
    }

    let _ = fs::remove_file(paths.pid_path());
    let _ = fs::remove_file(paths.heartbeat_path());
    Ok(pid)
}

fn recorded_pid(paths: &StemPaths) -> Result<Option<u32>> {
    let pid_path = paths.pid_path();
    if pid_path.exists() {
        let text = fs::read_to_string(&pid_path)
            .with_context(|| format!("reading pid file {}", pid_path.display()))?;
        let pid = text
            .trim()
            .parse()
            .with_context(|| format!("pid file {} is not a number", pid_path.display()))?;
        return Ok(Some(pid));
    }
    Ok(read_heartbeat(paths)?.map(|hb| hb.pid))
}
