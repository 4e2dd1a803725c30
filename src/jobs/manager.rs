use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::orchestrator::{Orchestrator, StartOptions, StopOptions};

use super::types::{Job, JobHandle, JobStatus, JobType};

/// Number of concurrent workers when none is requested.
const DEFAULT_WORKER_COUNT: usize = 3;

/// Capacity of the pending-job queue.
const JOB_QUEUE_CAPACITY: usize = 100;

/// Minimum time a terminal job is kept before it becomes evictable.
const MIN_JOB_RETENTION_SECS: i64 = 3600;

/// Hard ceiling on retained jobs.
const MAX_JOB_COUNT: usize = 1000;

/// How often the retention sweep runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

type JobRegistry = Arc<RwLock<HashMap<Uuid, Arc<JobHandle>>>>;

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("job manager is shutting down")]
    ShuttingDown,
}

/// Owns the job registry and the worker pool that executes jobs against the
/// orchestrator.
pub struct JobManager {
    jobs: JobRegistry,
    queue_tx: Mutex<Option<mpsc::Sender<Arc<JobHandle>>>>,
    shutdown: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
    cleanup_task: Mutex<Option<JoinHandle<()>>>,
}

impl JobManager {
    pub fn new(orchestrator: Arc<Orchestrator>, workers: usize) -> Self {
        let workers = if workers == 0 {
            DEFAULT_WORKER_COUNT
        } else {
            workers
        };

        let (queue_tx, queue_rx) = mpsc::channel(JOB_QUEUE_CAPACITY);
        let queue_rx = Arc::new(tokio::sync::Mutex::new(queue_rx));
        let jobs: JobRegistry = Arc::new(RwLock::new(HashMap::new()));
        let shutdown = CancellationToken::new();

        let worker_handles = (0..workers)
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    queue_rx.clone(),
                    orchestrator.clone(),
                ))
            })
            .collect();

        let cleanup_task = tokio::spawn(cleanup_loop(jobs.clone(), shutdown.clone()));

        info!(
            workers,
            cleanup_interval_secs = CLEANUP_INTERVAL.as_secs(),
            "Job manager started"
        );

        Self {
            jobs,
            queue_tx: Mutex::new(Some(queue_tx)),
            shutdown,
            workers: Mutex::new(worker_handles),
            cleanup_task: Mutex::new(Some(cleanup_task)),
        }
    }

    /// Registers the job and enqueues it for a worker. Blocks while the
    /// queue is full; refused once shutdown has begun.
    pub async fn submit(&self, job: Arc<JobHandle>) -> Result<(), SubmitError> {
        if self.shutdown.is_cancelled() {
            return Err(SubmitError::ShuttingDown);
        }

        let queue_tx = self
            .queue_tx
            .lock()
            .unwrap()
            .clone()
            .ok_or(SubmitError::ShuttingDown)?;

        self.jobs.write().unwrap().insert(job.id(), job.clone());

        info!(job_id = %job.id(), r#type = %job.job_type(), "Job submitted");

        tokio::select! {
            result = queue_tx.send(job) => result.map_err(|_| SubmitError::ShuttingDown),
            _ = self.shutdown.cancelled() => Err(SubmitError::ShuttingDown),
        }
    }

    /// Snapshot of one job, if it exists.
    pub fn get(&self, id: &Uuid) -> Option<Job> {
        self.jobs.read().unwrap().get(id).map(|job| job.snapshot())
    }

    /// Snapshots of every retained job.
    #[allow(dead_code)]
    pub fn list(&self) -> Vec<Job> {
        self.jobs
            .read()
            .unwrap()
            .values()
            .map(|job| job.snapshot())
            .collect()
    }

    /// Removes a job from the registry. Returns false if it was unknown.
    #[allow(dead_code)]
    pub fn delete(&self, id: &Uuid) -> bool {
        let removed = self.jobs.write().unwrap().remove(id).is_some();
        if removed {
            debug!(job_id = %id, "Job deleted");
        }
        removed
    }

    /// Stops accepting submissions, then waits up to `timeout` for workers
    /// to drain the queue before reaping the cleanup task.
    pub async fn shutdown(&self, timeout: Duration) {
        info!("Shutting down job manager");

        // Dropping the sender closes the queue; workers exit after draining.
        self.queue_tx.lock().unwrap().take();
        self.shutdown.cancel();

        let workers = std::mem::take(&mut *self.workers.lock().unwrap());
        match tokio::time::timeout(timeout, futures::future::join_all(workers)).await {
            Ok(_) => info!("All workers stopped gracefully"),
            Err(_) => {
                warn!("Worker shutdown timeout exceeded");
                return;
            }
        }

        let cleanup_task = self.cleanup_task.lock().unwrap().take();
        if let Some(cleanup_task) = cleanup_task {
            let _ = cleanup_task.await;
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<tokio::sync::Mutex<mpsc::Receiver<Arc<JobHandle>>>>,
    orchestrator: Arc<Orchestrator>,
) {
    debug!(worker_id, "Worker started");

    loop {
        let job = queue.lock().await.recv().await;
        let Some(job) = job else { break };
        process_job(&orchestrator, &job).await;
    }

    debug!(worker_id, "Worker stopped");
}

async fn process_job(orchestrator: &Orchestrator, job: &JobHandle) {
    job.set_status(JobStatus::Running);

    info!(job_id = %job.id(), r#type = %job.job_type(), "Processing job");

    let snapshot = job.snapshot();
    match snapshot.job_type {
        JobType::Start => {
            let opts = StartOptions {
                timeout: snapshot.timeout,
                ignore: snapshot.ignore,
            };

            match orchestrator.start_containers(opts).await {
                Ok(result) => {
                    info!(
                        job_id = %job.id(),
                        started = result.started.len(),
                        skipped = result.skipped.len(),
                        failed = result.failed.len(),
                        "Start job completed"
                    );
                    job.set_results(
                        Some(result.started),
                        None,
                        Some(result.skipped),
                        Some(result.failed),
                    );
                    job.set_status(JobStatus::Completed);
                }
                Err(err) => {
                    error!(job_id = %job.id(), error = %err, "Start job failed");
                    job.set_error(&err);
                }
            }
        }
        JobType::Stop => {
            let opts = StopOptions {
                timeout: snapshot.timeout,
                ignore: snapshot.ignore,
            };

            match orchestrator.stop_containers(opts).await {
                Ok(result) => {
                    info!(
                        job_id = %job.id(),
                        stopped = result.stopped.len(),
                        skipped = result.skipped.len(),
                        failed = result.failed.len(),
                        "Stop job completed"
                    );
                    job.set_results(
                        None,
                        Some(result.stopped),
                        Some(result.skipped),
                        Some(result.failed),
                    );
                    job.set_status(JobStatus::Completed);
                }
                Err(err) => {
                    error!(job_id = %job.id(), error = %err, "Stop job failed");
                    job.set_error(&err);
                }
            }
        }
    }

    info!(
        job_id = %job.id(),
        status = %job.status(),
        duration_ms = job.duration().num_milliseconds(),
        "Job finished"
    );
}

async fn cleanup_loop(jobs: JobRegistry, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(CLEANUP_INTERVAL);
    // The first interval tick fires immediately; the sweep starts one
    // interval in.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("Cleanup loop stopping");
                return;
            }
            _ = ticker.tick() => cleanup(&jobs),
        }
    }
}

/// Retention sweep: terminal jobs older than the minimum retention are
/// eligible; when the registry exceeds the ceiling, the oldest eligibles go
/// first until the count fits. Non-terminal jobs are never removed.
fn cleanup(jobs: &JobRegistry) {
    let mut jobs = jobs.write().unwrap();
    let total = jobs.len();
    if total == 0 {
        return;
    }

    let retention = ChronoDuration::seconds(MIN_JOB_RETENTION_SECS);
    let mut eligible: Vec<(Uuid, ChronoDuration)> = jobs
        .iter()
        .filter(|(_, job)| job.status().is_terminal())
        .filter_map(|(id, job)| {
            let age = job.age();
            (age > retention).then_some((*id, age))
        })
        .collect();

    if eligible.is_empty() && total <= MAX_JOB_COUNT {
        return;
    }

    if total > MAX_JOB_COUNT {
        // Oldest first
        eligible.sort_by(|a, b| b.1.cmp(&a.1));

        let to_remove = (total - MAX_JOB_COUNT).min(eligible.len());
        for (id, _) in eligible.iter().take(to_remove) {
            jobs.remove(id);
        }

        info!(
            removed = to_remove,
            remaining = jobs.len(),
            "Cleaned up old jobs (count eviction)"
        );
    } else if !eligible.is_empty() {
        let removed = eligible.len();
        for (id, _) in &eligible {
            jobs.remove(id);
        }

        info!(
            removed,
            remaining = jobs.len(),
            "Cleaned up old jobs (age-based)"
        );
    }
}
