use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

use crate::error::Result;
use crate::types::{ItemId, JobId, UserId};

use super::job_spec::JobSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Inactive,
    Queued,
    Running,
    Success,
    Error,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Error | JobStatus::Cancelled)
    }
}

/// Externally visible job record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    #[serde(rename = "_id")]
    pub id: JobId,
    pub title: String,
    #[serde(rename = "type")]
    pub job_type: String,
    pub item_id: ItemId,
    pub creator_id: UserId,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

struct JobEntry {
    job: Job,
    status_tx: watch::Sender<JobStatus>,
}

/// Process-wide table of jobs and their status channels.
#[derive(Default)]
pub struct JobRegistry {
    jobs: DashMap<JobId, JobEntry>,
}

impl fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRegistry")
            .field("jobs", &self.jobs.len())
            .finish()
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new job in `Queued` state.
    pub fn register(&self, spec: &JobSpec) -> JobHandle {
        let now = Utc::now();
        let job = Job {
            id: JobId::new(),
            title: spec.title.clone(),
            job_type: spec.job_type.clone(),
            item_id: spec.item_id,
            creator_id: spec.creator_id,
            status: JobStatus::Queued,
            error: None,
            created: now,
            updated: now,
        };
        let (status_tx, status_rx) = watch::channel(JobStatus::Queued);
        self.jobs.insert(
            job.id,
            JobEntry {
                job: job.clone(),
                status_tx,
            },
        );
        JobHandle {
            job,
            status: status_rx,
        }
    }

    pub fn update(&self, id: JobId, status: JobStatus, error: Option<String>) {
        let Some(mut entry) = self.jobs.get_mut(&id) else {
            debug!(job = %id, "status update for unknown job");
            return;
        };
        entry.job.status = status;
        entry.job.error = error;
        entry.job.updated = Utc::now();
        entry.status_tx.send_replace(status);
    }

    pub fn get(&self, id: JobId) -> Option<Job> {
        self.jobs.get(&id).map(|entry| entry.job.clone())
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Forget finished jobs last touched before `now - retain`.
    pub fn prune_finished(&self, now: DateTime<Utc>, retain: Duration) -> usize {
        let cutoff = now - retain;
        let before = self.jobs.len();
        self.jobs
            .retain(|_, entry| !(entry.job.status.is_terminal() && entry.job.updated < cutoff));
        before - self.jobs.len()
    }
}

/// Caller's view of a submitted job.
#[derive(Debug, Clone)]
pub struct JobHandle {
    job: Job,
    status: watch::Receiver<JobStatus>,
}

impl JobHandle {
    pub fn id(&self) -> JobId {
        self.job.id
    }

    /// The job as it was at submission, with the current status.
    pub fn snapshot(&self) -> Job {
        Job {
            status: *self.status.borrow(),
            ..self.job.clone()
        }
    }

    pub fn status(&self) -> JobStatus {
        *self.status.borrow()
    }

    /// Resolve once the job reaches a terminal status.
    pub async fn wait(&mut self) -> JobStatus {
        loop {
            let current = *self.status.borrow_and_update();
            if current.is_terminal() {
                return current;
            }
            if self.status.changed().await.is_err() {
                return *self.status.borrow();
            }
        }
    }
}

/// Where job specifications run.
#[async_trait]
pub trait ExecutionSubstrate: Send + Sync {
    /// Register and start the job, returning without waiting for it.
    async fn submit(&self, spec: JobSpec) -> Result<JobHandle>;

    fn registry(&self) -> &JobRegistry;
}
