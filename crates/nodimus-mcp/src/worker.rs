//! Background Worker
//!
//! Work that must not sit on the request path: regenerating the knowledge
//! graph after writes and retrying index writes that failed after commit.
//! Requests are fire-and-forget. Each kind of job coalesces: the queue holds
//! at most one graph regeneration and one index retry at a time.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nodimus_core::{graph, Repository};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Queue depth; a full queue already holds the work a new request would add
const QUEUE_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Job {
    RegenerateGraph,
    RetryIndex,
}

/// What to do with queued jobs at shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Run every job already queued
    Drain,
    /// Drop queued jobs
    Discard,
}

/// Set while a job of that kind sits in the queue, not yet started
#[derive(Default)]
struct Queued {
    graph: AtomicBool,
    retry: AtomicBool,
}

impl Queued {
    fn flag(&self, job: Job) -> &AtomicBool {
        match job {
            Job::RegenerateGraph => &self.graph,
            Job::RetryIndex => &self.retry,
        }
    }
}

/// Cloneable submission side of the worker
#[derive(Clone)]
pub struct WorkerHandle {
    tx: mpsc::Sender<Job>,
    queued: Arc<Queued>,
}

impl WorkerHandle {
    /// Ask for the knowledge graph to be rewritten
    pub fn request_graph_regeneration(&self) {
        self.submit(Job::RegenerateGraph);
    }

    /// Ask for pending index writes to be retried
    pub fn request_index_retry(&self) {
        self.submit(Job::RetryIndex);
    }

    fn submit(&self, job: Job) {
        let flag = self.queued.flag(job);
        // Already queued and not yet started: the queued run will see this write
        if flag.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(e) = self.tx.try_send(job) {
            flag.store(false, Ordering::Release);
            debug!(?job, "Job not queued: {}", e);
        }
    }
}

/// Single background task consuming a bounded job queue
pub struct BackgroundWorker {
    handle: WorkerHandle,
    cancel: CancellationToken,
    mode: Arc<std::sync::Mutex<ShutdownMode>>,
    task: JoinHandle<()>,
}

impl BackgroundWorker {
    /// Spawn the worker on the current runtime
    pub fn spawn(repo: Arc<Repository>, graph_path: PathBuf) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let queued = Arc::new(Queued::default());
        let cancel = CancellationToken::new();
        let mode = Arc::new(std::sync::Mutex::new(ShutdownMode::Drain));

        let task = tokio::spawn(run(
            repo,
            graph_path,
            rx,
            queued.clone(),
            cancel.clone(),
            mode.clone(),
        ));

        Self {
            handle: WorkerHandle { tx, queued },
            cancel,
            mode,
            task,
        }
    }

    pub fn handle(&self) -> WorkerHandle {
        self.handle.clone()
    }

    /// Stop the worker and wait for it to exit
    pub async fn shutdown(self, mode: ShutdownMode) {
        if let Ok(mut m) = self.mode.lock() {
            *m = mode;
        }
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!("Background worker ended abnormally: {}", e);
        }
    }
}

async fn run(
    repo: Arc<Repository>,
    graph_path: PathBuf,
    mut rx: mpsc::Receiver<Job>,
    queued: Arc<Queued>,
    cancel: CancellationToken,
    mode: Arc<std::sync::Mutex<ShutdownMode>>,
) {
    debug!("Background worker started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            job = rx.recv() => match job {
                Some(job) => process(&repo, &graph_path, &queued, job).await,
                None => break,
            },
        }
    }

    let mode = mode.lock().map(|m| *m).unwrap_or(ShutdownMode::Drain);
    rx.close();
    let mut drained = 0usize;
    while let Ok(job) = rx.try_recv() {
        if mode == ShutdownMode::Drain {
            process(&repo, &graph_path, &queued, job).await;
            drained += 1;
        }
    }
    info!(drained, "Background worker stopped");
}

async fn process(repo: &Arc<Repository>, graph_path: &Path, queued: &Queued, job: Job) {
    // Clear first so requests landing mid-job queue another run
    queued.flag(job).store(false, Ordering::Release);
    match job {
        Job::RegenerateGraph => {
            let source = repo.clone();
            let path = graph_path.to_path_buf();
            match tokio::task::spawn_blocking(move || graph::generate(source.as_ref(), &path)).await {
                Ok(Ok(nodes)) => debug!(nodes, "Knowledge graph regenerated"),
                Ok(Err(e)) => warn!("Failed to regenerate knowledge graph: {}", e),
                Err(e) => warn!("Graph task panicked: {}", e),
            }
            if repo.pending_index_count() > 0 {
                retry_index(repo).await;
            }
        }
        Job::RetryIndex => retry_index(repo).await,
    }
}

async fn retry_index(repo: &Arc<Repository>) {
    let repo = repo.clone();
    match tokio::task::spawn_blocking(move || repo.retry_pending_index()).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => warn!("Index retry failed: {}", e),
        Err(e) => warn!("Index retry task panicked: {}", e),
    }
}
