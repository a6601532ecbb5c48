use super::job::{BackgroundJob, JobError};
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};

/// Scheduling state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Idle,
    Running,
}

/// Final or current status of a job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobRunStatus {
    Running,
    Completed,
    Failed,
}

/// Serializable job run information.
#[derive(Debug, Clone, Serialize)]
pub struct JobRunInfo {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: JobRunStatus,
    pub error_message: Option<String>,
    pub triggered_by: String,
}

/// Information about a registered job for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub schedule: String,
    pub state: JobState,
    pub next_run_at: Option<String>,
    pub last_run: Option<JobRunInfo>,
}

/// Command sent to the scheduler.
pub enum SchedulerCommand {
    TriggerJob {
        job_id: String,
        response: oneshot::Sender<Result<(), JobError>>,
    },
}

/// Shared state between scheduler and handle.
#[derive(Default)]
pub struct SharedJobState {
    /// Static job info (set at registration, never changes)
    pub jobs: HashMap<String, Arc<dyn BackgroundJob>>,
    /// Currently running job IDs
    pub running_jobs: HashSet<String>,
    /// Next scheduled run of each job
    pub next_runs: HashMap<String, DateTime<Local>>,
    /// Most recent run of each job, finished or not
    pub last_runs: HashMap<String, JobRunInfo>,
}

impl SharedJobState {
    fn job_info(&self, job_id: &str) -> Option<JobInfo> {
        let job = self.jobs.get(job_id)?;
        let state = if self.running_jobs.contains(job_id) {
            JobState::Running
        } else {
            JobState::Idle
        };
        Some(JobInfo {
            id: job_id.to_string(),
            name: job.name().to_string(),
            description: job.description().to_string(),
            schedule: job.schedule().to_string(),
            state,
            next_run_at: self.next_runs.get(job_id).map(|t| t.to_rfc3339()),
            last_run: self.last_runs.get(job_id).cloned(),
        })
    }
}

/// Handle to interact with the job scheduler from other components.
#[derive(Clone)]
pub struct SchedulerHandle {
    /// Channel to send commands to the scheduler
    command_tx: mpsc::Sender<SchedulerCommand>,
    /// Shared state for reading job info
    shared_state: Arc<RwLock<SharedJobState>>,
}

impl SchedulerHandle {
    pub fn new(
        command_tx: mpsc::Sender<SchedulerCommand>,
        shared_state: Arc<RwLock<SharedJobState>>,
    ) -> Self {
        Self {
            command_tx,
            shared_state,
        }
    }

    /// Get information about all registered jobs, sorted by ID.
    pub async fn list_jobs(&self) -> Vec<JobInfo> {
        let state = self.shared_state.read().await;
        let mut jobs: Vec<JobInfo> = state
            .jobs
            .keys()
            .filter_map(|job_id| state.job_info(job_id))
            .collect();
        jobs.sort_by(|a, b| a.id.cmp(&b.id));
        jobs
    }

    /// Get information about a specific job.
    pub async fn get_job(&self, job_id: &str) -> Option<JobInfo> {
        self.shared_state.read().await.job_info(job_id)
    }

    /// Trigger a job immediately.
    ///
    /// Returns once the run has been started, not when it finishes.
    pub async fn trigger_job(&self, job_id: &str) -> Result<(), JobError> {
        let (response_tx, response_rx) = oneshot::channel();

        self.command_tx
            .send(SchedulerCommand::TriggerJob {
                job_id: job_id.to_string(),
                response: response_tx,
            })
            .await
            .map_err(|_| JobError::ExecutionFailed("Scheduler not available".to_string()))?;

        response_rx
            .await
            .map_err(|_| JobError::ExecutionFailed("Scheduler did not respond".to_string()))?
    }

    /// Check if a job is currently running.
    pub async fn is_job_running(&self, job_id: &str) -> bool {
        let state = self.shared_state.read().await;
        state.running_jobs.contains(job_id)
    }
}
