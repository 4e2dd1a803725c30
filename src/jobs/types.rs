use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

/// The kind of orchestration a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Start,
    Stop,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One container orchestration operation. This is the observable record;
/// every copy handed out of the manager is a deep clone.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub timeout: u64,
    pub ignore: Vec<String>,
    pub started: Vec<String>,
    pub stopped: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Shared, mutable handle to a job. All state lives behind one mutex;
/// readers get consistent snapshots, never references into the record.
#[derive(Debug)]
pub struct JobHandle {
    id: Uuid,
    inner: Mutex<Job>,
}

impl JobHandle {
    pub fn new(job_type: JobType, timeout: u64, ignore: Vec<String>) -> Arc<Self> {
        let id = Uuid::new_v4();

        Arc::new(Self {
            id,
            inner: Mutex::new(Job {
                id,
                job_type,
                status: JobStatus::Pending,
                created_at: Utc::now(),
                started_at: None,
                ended_at: None,
                timeout,
                ignore,
                started: Vec::new(),
                stopped: Vec::new(),
                skipped: Vec::new(),
                failed: Vec::new(),
                error: None,
            }),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn job_type(&self) -> JobType {
        self.inner.lock().unwrap().job_type
    }

    pub fn status(&self) -> JobStatus {
        self.inner.lock().unwrap().status
    }

    /// Deep copy of the current state.
    pub fn snapshot(&self) -> Job {
        self.inner.lock().unwrap().clone()
    }

    /// Updates the status, latching `started_at` on the first transition to
    /// Running and `ended_at` on the first terminal transition.
    pub fn set_status(&self, status: JobStatus) {
        let mut job = self.inner.lock().unwrap();
        job.status = status;

        let now = Utc::now();
        match status {
            JobStatus::Running => {
                if job.started_at.is_none() {
                    job.started_at = Some(now);
                }
            }
            JobStatus::Completed | JobStatus::Failed => {
                if job.ended_at.is_none() {
                    job.ended_at = Some(now);
                }
            }
            JobStatus::Pending => {}
        }
    }

    /// Records the error message and marks the job failed in one step.
    pub fn set_error(&self, error: impl fmt::Display) {
        let mut job = self.inner.lock().unwrap();
        job.error = Some(error.to_string());
        job.status = JobStatus::Failed;
        if job.ended_at.is_none() {
            job.ended_at = Some(Utc::now());
        }
    }

    /// Writes result buckets; `None` leaves a bucket untouched.
    pub fn set_results(
        &self,
        started: Option<Vec<String>>,
        stopped: Option<Vec<String>>,
        skipped: Option<Vec<String>>,
        failed: Option<Vec<String>>,
    ) {
        let mut job = self.inner.lock().unwrap();
        if let Some(started) = started {
            job.started = started;
        }
        if let Some(stopped) = stopped {
            job.stopped = stopped;
        }
        if let Some(skipped) = skipped {
            job.skipped = skipped;
        }
        if let Some(failed) = failed {
            job.failed = failed;
        }
    }

    /// How long the job ran, or has been running.
    pub fn duration(&self) -> Duration {
        let job = self.inner.lock().unwrap();
        match (job.started_at, job.ended_at) {
            (None, _) => Duration::zero(),
            (Some(started), None) => Utc::now() - started,
            (Some(started), Some(ended)) => ended - started,
        }
    }

    /// How long ago the job was created.
    pub fn age(&self) -> Duration {
        Utc::now() - self.inner.lock().unwrap().created_at
    }

    #[cfg(test)]
    pub(crate) fn backdate(&self, by: Duration) {
        self.inner.lock().unwrap().created_at -= by;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_job_is_pending_with_empty_buckets() {
        let job = JobHandle::new(JobType::Start, 600, vec!["traefik".to_string()]);
        let snapshot = job.snapshot();

        assert_eq!(snapshot.status, JobStatus::Pending);
        assert_eq!(snapshot.job_type, JobType::Start);
        assert_eq!(snapshot.timeout, 600);
        assert_eq!(snapshot.ignore, vec!["traefik"]);
        assert!(snapshot.started_at.is_none());
        assert!(snapshot.ended_at.is_none());
        assert!(snapshot.started.is_empty());
        assert!(snapshot.error.is_none());
    }

    #[test]
    fn running_latches_started_at_once() {
        let job = JobHandle::new(JobType::Start, 600, vec![]);

        job.set_status(JobStatus::Running);
        let first = job.snapshot().started_at.unwrap();

        job.set_status(JobStatus::Running);
        assert_eq!(job.snapshot().started_at.unwrap(), first);
    }

    #[test]
    fn terminal_transition_latches_ended_at() {
        let job = JobHandle::new(JobType::Stop, 300, vec![]);

        job.set_status(JobStatus::Running);
        job.set_status(JobStatus::Completed);

        let snapshot = job.snapshot();
        assert!(snapshot.status.is_terminal());
        let ended = snapshot.ended_at.unwrap();
        assert!(snapshot.created_at <= snapshot.started_at.unwrap());
        assert!(snapshot.started_at.unwrap() <= ended);

        job.set_status(JobStatus::Failed);
        assert_eq!(job.snapshot().ended_at.unwrap(), ended);
    }

    #[test]
    fn set_error_fails_the_job_atomically() {
        let job = JobHandle::new(JobType::Start, 600, vec![]);
        job.set_status(JobStatus::Running);

        job.set_error("circular dependency detected: a -> b -> a");

        let snapshot = job.snapshot();
        assert_eq!(snapshot.status, JobStatus::Failed);
        assert_eq!(
            snapshot.error.as_deref(),
            Some("circular dependency detected: a -> b -> a")
        );
        assert!(snapshot.ended_at.is_some());
    }

    #[test]
    fn set_results_only_touches_given_buckets() {
        let job = JobHandle::new(JobType::Stop, 300, vec![]);

        job.set_results(
            None,
            Some(vec!["a".to_string()]),
            Some(vec!["b".to_string()]),
            None,
        );

        let snapshot = job.snapshot();
        assert!(snapshot.started.is_empty());
        assert_eq!(snapshot.stopped, vec!["a"]);
        assert_eq!(snapshot.skipped, vec!["b"]);
        assert!(snapshot.failed.is_empty());
    }

    #[test]
    fn snapshots_are_isolated_from_the_handle() {
        let job = JobHandle::new(JobType::Start, 600, vec![]);
        job.set_results(Some(vec!["a".to_string()]), None, None, None);

        let mut snapshot = job.snapshot();
        snapshot.started.push("intruder".to_string());
        snapshot.ignore.push("intruder".to_string());

        let fresh = job.snapshot();
        assert_eq!(fresh.started, vec!["a"]);
        assert!(fresh.ignore.is_empty());
    }

    #[test]
    fn status_strings_match_the_wire_format() {
        assert_eq!(JobStatus::Pending.to_string(), "pending");
        assert_eq!(JobStatus::Running.to_string(), "running");
        assert_eq!(JobStatus::Completed.to_string(), "completed");
        assert_eq!(JobStatus::Failed.to_string(), "failed");
        assert_eq!(JobType::Start.to_string(), "start");
        assert_eq!(JobType::Stop.to_string(), "stop");
    }

    #[test]
    fn duration_is_zero_until_started() {
        let job = JobHandle::new(JobType::Start, 600, vec![]);
        assert_eq!(job.duration(), Duration::zero());

        job.set_status(JobStatus::Running);
        job.set_status(JobStatus::Completed);
        assert!(job.duration() >= Duration::zero());
    }
}
