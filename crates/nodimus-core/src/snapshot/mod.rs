//! Snapshot Scheduler
//!
//! Recurring online snapshots of the relational store into
//! `<data_dir>/snapshots/YYYY-MM-DD.db`.
//!
//! State machine: `Idle -> Scheduled -> Running -> Idle`. Each attempt copies
//! into a `.tmp` file and renames it into place only after the copy
//! succeeded, so a file with the final name is always complete. A failed
//! attempt is logged and the next tick tries again; it never stops the
//! scheduler or reaches request-serving paths.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Local;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::storage::{Repository, Result, StorageError};

/// Default cadence: once a day
pub const DEFAULT_SNAPSHOT_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Subdirectory of the data directory holding snapshots
pub const SNAPSHOT_DIR: &str = "snapshots";

/// Anything that can write a consistent copy of itself to a path
pub trait SnapshotSource: Send + Sync + 'static {
    /// Write a complete copy to `path`, which does not exist yet
    fn snapshot_to(&self, path: &Path) -> Result<()>;
}

impl SnapshotSource for Repository {
    fn snapshot_to(&self, path: &Path) -> Result<()> {
        Repository::snapshot_to(self, path)
    }
}

/// Scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotState {
    /// Not armed: never started, or stopped
    Idle,
    /// Waiting for the next trigger
    Scheduled,
    /// Copy in progress
    Running,
}

struct Shared {
    state: Mutex<SnapshotState>,
    last_snapshot: Mutex<Option<PathBuf>>,
    /// Serializes scheduled runs with `run_once`
    run_lock: tokio::sync::Mutex<()>,
}

impl Shared {
    fn set_state(&self, state: SnapshotState) {
        if let Ok(mut s) = self.state.lock() {
            *s = state;
        }
    }

    /// Set `state`, returning the one it replaced
    fn replace_state(&self, state: SnapshotState) -> SnapshotState {
        match self.state.lock() {
            Ok(mut s) => std::mem::replace(&mut *s, state),
            Err(_) => SnapshotState::Idle,
        }
    }
}

/// Recurring snapshot job
pub struct SnapshotScheduler {
    source: Arc<dyn SnapshotSource>,
    snapshot_dir: PathBuf,
    interval: Duration,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl SnapshotScheduler {
    /// Create a scheduler writing under `<data_dir>/snapshots`
    pub fn new(source: Arc<dyn SnapshotSource>, data_dir: &Path, interval: Duration) -> Self {
        Self {
            source,
            snapshot_dir: data_dir.join(SNAPSHOT_DIR),
            interval,
            shared: Arc::new(Shared {
                state: Mutex::new(SnapshotState::Idle),
                last_snapshot: Mutex::new(None),
                run_lock: tokio::sync::Mutex::new(()),
            }),
            cancel: CancellationToken::new(),
            handle: None,
        }
    }

    pub fn snapshot_dir(&self) -> &Path {
        &self.snapshot_dir
    }

    pub fn state(&self) -> SnapshotState {
        self.shared
            .state
            .lock()
            .map(|s| *s)
            .unwrap_or(SnapshotState::Idle)
    }

    /// Path of the most recent successful snapshot
    pub fn last_snapshot(&self) -> Option<PathBuf> {
        self.shared
            .last_snapshot
            .lock()
            .ok()
            .and_then(|p| p.clone())
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Spawn the recurring job on the current tokio runtime
    ///
    /// The first snapshot fires one interval after start. Calling `start` on
    /// a running scheduler is a no-op.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }
        if self.interval.is_zero() {
            return Err(StorageError::Snapshot("snapshot interval must be non-zero".into()));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| StorageError::Snapshot(format!("no tokio runtime: {}", e)))?;

        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }

        let source = Arc::clone(&self.source);
        let shared = Arc::clone(&self.shared);
        let dir = self.snapshot_dir.clone();
        let cancel = self.cancel.clone();
        let period = self.interval;

        shared.set_state(SnapshotState::Scheduled);
        self.handle = Some(runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                shared.set_state(SnapshotState::Scheduled);
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                // Not cancellable once started: a copy always finishes or fails on its own
                if let Err(e) = run_snapshot(&source, &shared, &dir).await {
                    error!("Scheduled snapshot failed: {}", e);
                }
            }

            shared.set_state(SnapshotState::Idle);
            info!("Snapshot scheduler stopped");
        }));

        info!(
            dir = %self.snapshot_dir.display(),
            interval_secs = self.interval.as_secs(),
            "Snapshot scheduler started"
        );
        Ok(())
    }

    /// Take a snapshot now, independent of the schedule
    pub async fn run_once(&self) -> Result<PathBuf> {
        run_snapshot(&self.source, &self.shared, &self.snapshot_dir).await
    }

    /// Stop future triggers and wait for an in-flight snapshot to finish
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!("Snapshot task ended abnormally: {}", e);
            }
        }
        self.shared.set_state(SnapshotState::Idle);
    }
}

impl Drop for SnapshotScheduler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Snapshot file path for `date` (`YYYY-MM-DD.db`)
pub fn snapshot_path(dir: &Path, date: chrono::NaiveDate) -> PathBuf {
    dir.join(format!("{}.db", date.format("%Y-%m-%d")))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

async fn run_snapshot(
    source: &Arc<dyn SnapshotSource>,
    shared: &Arc<Shared>,
    dir: &Path,
) -> Result<PathBuf> {
    let _guard = shared.run_lock.lock().await;
    // A manual run on an armed scheduler returns it to Scheduled
    let previous = shared.replace_state(SnapshotState::Running);

    let result = write_snapshot(source, dir).await;

    shared.set_state(previous);
    if let Ok(path) = &result {
        info!(path = %path.display(), "Created snapshot");
        if let Ok(mut last) = shared.last_snapshot.lock() {
            *last = Some(path.clone());
        }
    }
    result
}

async fn write_snapshot(source: &Arc<dyn SnapshotSource>, dir: &Path) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await.map_err(|e| {
        StorageError::Snapshot(format!("failed to create {}: {}", dir.display(), e))
    })?;

    let path = snapshot_path(dir, Local::now().date_naive());
    let tmp = temp_path(&path);

    // Left behind by a crashed attempt; VACUUM INTO refuses existing files
    if tokio::fs::try_exists(&tmp).await.unwrap_or(false) {
        tokio::fs::remove_file(&tmp).await?;
    }

    let copy_source = Arc::clone(source);
    let copy_target = tmp.clone();
    let copied = tokio::task::spawn_blocking(move || copy_source.snapshot_to(&copy_target))
        .await
        .map_err(|e| StorageError::Snapshot(format!("snapshot task panicked: {}", e)))?;

    if let Err(e) = copied {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(match e {
            StorageError::Snapshot(_) => e,
            other => StorageError::Snapshot(other.to_string()),
        });
    }

    tokio::fs::rename(&tmp, &path).await.map_err(|e| {
        StorageError::Snapshot(format!("failed to move snapshot into place: {}", e))
    })?;

    Ok(path)
}

// ============================================================================
// TESTS
// ============================================================================
