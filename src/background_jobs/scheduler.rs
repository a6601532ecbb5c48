use super::context::JobContext;
use super::handle::{JobRunInfo, JobRunStatus, SchedulerCommand, SchedulerHandle, SharedJobState};
use super::job::{BackgroundJob, JobError, JobFailureListener, ShutdownBehavior};
use crate::server::metrics;
use chrono::{Local, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Longest the scheduler sleeps before re-checking due jobs.
const MAX_SLEEP: Duration = Duration::from_secs(60);

/// How long shutdown waits for running jobs.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Manages background job scheduling and execution.
///
/// Nothing runs until [`JobScheduler::run`] is awaited; cancelling the
/// shutdown token stops the loop.
pub struct JobScheduler {
    /// Shared state accessible by SchedulerHandle
    shared_state: Arc<RwLock<SharedJobState>>,

    /// Currently running jobs with their task handles (not shared, managed by scheduler loop)
    running_handles: HashMap<String, JoinHandle<()>>,

    /// Cancellation tokens for each running job.
    job_cancel_tokens: HashMap<String, CancellationToken>,

    /// Notified whenever a run fails.
    failure_listeners: Vec<Arc<dyn JobFailureListener>>,

    /// Receiver for commands from SchedulerHandle
    command_receiver: mpsc::Receiver<SchedulerCommand>,

    /// Token to signal scheduler shutdown.
    shutdown_token: CancellationToken,
}

impl JobScheduler {
    pub fn new(
        command_receiver: mpsc::Receiver<SchedulerCommand>,
        shutdown_token: CancellationToken,
        shared_state: Arc<RwLock<SharedJobState>>,
    ) -> Self {
        Self {
            shared_state,
            running_handles: HashMap::new(),
            job_cancel_tokens: HashMap::new(),
            failure_listeners: Vec::new(),
            command_receiver,
            shutdown_token,
        }
    }

    /// Register a job with the scheduler.
    pub async fn register_job(&mut self, job: Arc<dyn BackgroundJob>) {
        let job_id = job.id().to_string();
        let next_run = job.schedule().next_run_after(Local::now());
        info!(
            "Registering job: {} - {} ({}, next run at {})",
            job_id,
            job.description(),
            job.schedule(),
            next_run.to_rfc3339()
        );
        let mut state = self.shared_state.write().await;
        state.next_runs.insert(job_id.clone(), next_run);
        state.jobs.insert(job_id, job);
    }

    /// Register a listener for failed job runs.
    pub fn add_failure_listener(&mut self, listener: Arc<dyn JobFailureListener>) {
        self.failure_listeners.push(listener);
    }

    /// Get the number of registered jobs.
    pub async fn job_count(&self) -> usize {
        self.shared_state.read().await.jobs.len()
    }

    /// Main scheduler loop.
    pub async fn run(&mut self) {
        let job_count = self.job_count().await;
        info!("Starting job scheduler with {} registered jobs", job_count);

        loop {
            // Clean up completed job handles
            self.cleanup_completed_jobs().await;

            let sleep_duration = self.time_until_next_scheduled_job().await;
            debug!(
                "Scheduler sleeping for {:?} until next scheduled job",
                sleep_duration
            );

            tokio::select! {
                _ = tokio::time::sleep(sleep_duration) => {
                    self.run_due_jobs().await;
                }
                Some(cmd) = self.command_receiver.recv() => {
                    self.handle_command(cmd).await;
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Scheduler received shutdown signal");
                    self.shutdown().await;
                    break;
                }
            }
        }

        info!("Job scheduler stopped");
    }

    /// Handle a command from the SchedulerHandle.
    async fn handle_command(&mut self, cmd: SchedulerCommand) {
        match cmd {
            SchedulerCommand::TriggerJob { job_id, response } => {
                let result = self.trigger_job(&job_id).await;
                let _ = response.send(result);
            }
        }
    }

    /// Manually trigger a job by ID.
    async fn trigger_job(&mut self, job_id: &str) -> Result<(), JobError> {
        let state = self.shared_state.read().await;
        if !state.jobs.contains_key(job_id) {
            return Err(JobError::NotFound);
        }

        if state.running_jobs.contains(job_id) {
            return Err(JobError::AlreadyRunning);
        }
        drop(state);

        self.spawn_job(job_id, "manual").await;
        Ok(())
    }

    /// Calculate time until the next scheduled job should run.
    async fn time_until_next_scheduled_job(&self) -> Duration {
        let now = Local::now();
        let state = self.shared_state.read().await;

        state
            .next_runs
            .values()
            .map(|next_run| (*next_run - now).to_std().unwrap_or(Duration::ZERO))
            .min()
            .map_or(MAX_SLEEP, |d| d.min(MAX_SLEEP))
    }

    /// Run all jobs that are due for scheduled execution.
    ///
    /// A job still running when its slot comes up skips that slot.
    async fn run_due_jobs(&mut self) {
        let now = Local::now();
        let mut jobs_to_run = Vec::new();

        {
            let mut state = self.shared_state.write().await;
            let due: Vec<String> = state
                .next_runs
                .iter()
                .filter(|(_, next_run)| **next_run <= now)
                .map(|(job_id, _)| job_id.clone())
                .collect();

            for job_id in due {
                let Some(job) = state.jobs.get(&job_id).cloned() else {
                    continue;
                };
                let next_run = job.schedule().next_run_after(now);
                state.next_runs.insert(job_id.clone(), next_run);

                if state.running_jobs.contains(&job_id) {
                    warn!(
                        "Job {} is still running, skipping scheduled run (next at {})",
                        job_id,
                        next_run.to_rfc3339()
                    );
                    continue;
                }
                jobs_to_run.push(job_id);
            }
        }

        for job_id in jobs_to_run {
            self.spawn_job(&job_id, "schedule").await;
        }
    }

    /// Spawn a job execution task.
    async fn spawn_job(&mut self, job_id: &str, triggered_by: &str) {
        let run_id = Uuid::new_v4().to_string();

        // Mark job as running in shared state
        let job = {
            let mut state = self.shared_state.write().await;
            let job = match state.jobs.get(job_id) {
                Some(job) => Arc::clone(job),
                None => {
                    error!("Attempted to spawn unknown job: {}", job_id);
                    return;
                }
            };
            state.running_jobs.insert(job_id.to_string());
            state.last_runs.insert(
                job_id.to_string(),
                JobRunInfo {
                    run_id: run_id.clone(),
                    started_at: Utc::now(),
                    finished_at: None,
                    status: JobRunStatus::Running,
                    error_message: None,
                    triggered_by: triggered_by.to_string(),
                },
            );
            job
        };

        info!(
            "Starting job: {} (run_id: {}, triggered_by: {})",
            job_id, run_id, triggered_by
        );

        // Set metric indicating job is running
        metrics::set_background_job_running(job_id, true);

        // Independent of the shutdown token; shutdown() cancels only Cancellable jobs
        let cancel_token = CancellationToken::new();
        self.job_cancel_tokens
            .insert(job_id.to_string(), cancel_token.clone());

        let ctx = JobContext::new(cancel_token, triggered_by);
        let listeners = self.failure_listeners.clone();
        let shared_state = Arc::clone(&self.shared_state);
        let job_id_owned = job_id.to_string();

        let handle = tokio::spawn(async move {
            let start_time = Instant::now();
            // Inner task so a panicking job is recorded instead of lost
            let result = tokio::spawn(async move { job.execute(&ctx).await }).await;
            let elapsed = start_time.elapsed();

            let failure = match result {
                Ok(Ok(())) => {
                    info!(
                        "Job {} completed successfully in {:?}",
                        job_id_owned, elapsed
                    );
                    metrics::record_background_job_execution(&job_id_owned, "success", elapsed);
                    None
                }
                Ok(Err(JobError::Cancelled)) => {
                    info!("Job {} was cancelled after {:?}", job_id_owned, elapsed);
                    metrics::record_background_job_execution(&job_id_owned, "cancelled", elapsed);
                    Some(JobError::Cancelled)
                }
                Ok(Err(e)) => {
                    error!("Job {} failed after {:?}: {}", job_id_owned, elapsed, e);
                    metrics::record_background_job_execution(&job_id_owned, "failed", elapsed);
                    Some(e)
                }
                Err(e) => {
                    error!("Job {} panicked after {:?}: {}", job_id_owned, elapsed, e);
                    metrics::record_background_job_execution(&job_id_owned, "panic", elapsed);
                    Some(JobError::ExecutionFailed(format!("Task panic: {}", e)))
                }
            };
            metrics::set_background_job_running(&job_id_owned, false);

            if let Some(err) = &failure {
                if *err != JobError::Cancelled {
                    for listener in &listeners {
                        listener.on_job_failed(&job_id_owned, err);
                    }
                }
            }

            // Record completion and mark job as not running in shared state
            let mut state = shared_state.write().await;
            state.running_jobs.remove(&job_id_owned);
            if let Some(run) = state.last_runs.get_mut(&job_id_owned) {
                if run.run_id == run_id {
                    run.finished_at = Some(Utc::now());
                    run.status = if failure.is_some() {
                        JobRunStatus::Failed
                    } else {
                        JobRunStatus::Completed
                    };
                    run.error_message = failure.map(|e| e.to_string());
                }
            }
        });

        self.running_handles.insert(job_id.to_string(), handle);
    }

    /// Clean up handles for completed jobs.
    async fn cleanup_completed_jobs(&mut self) {
        let completed: Vec<String> = self
            .running_handles
            .iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(job_id, _)| job_id.clone())
            .collect();

        for job_id in completed {
            if let Some(handle) = self.running_handles.remove(&job_id) {
                let _ = handle.await;
            }
            self.job_cancel_tokens.remove(&job_id);
        }
    }

    /// Gracefully shut down the scheduler.
    async fn shutdown(&mut self) {
        info!("Shutting down scheduler...");

        // Cancel cancellable jobs
        {
            let state = self.shared_state.read().await;
            for job_id in &state.running_jobs {
                if let Some(job) = state.jobs.get(job_id) {
                    if job.shutdown_behavior() == ShutdownBehavior::Cancellable {
                        if let Some(token) = self.job_cancel_tokens.get(job_id) {
                            debug!("Cancelling job: {}", job_id);
                            token.cancel();
                        }
                    }
                }
            }
        }

        // Wait for all jobs to complete
        let handles: Vec<(String, JoinHandle<()>)> = self.running_handles.drain().collect();
        for (job_id, handle) in handles {
            if !handle.is_finished() {
                info!("Waiting for job {} to complete...", job_id);
            }
            if tokio::time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
                warn!(
                    "Job {} did not finish within {:?} of shutdown",
                    job_id, SHUTDOWN_GRACE
                );
            }
        }

        self.job_cancel_tokens.clear();
        info!("Scheduler shutdown complete");
    }
}

/// Create a scheduler and its handle.
pub fn create_scheduler(shutdown_token: CancellationToken) -> (JobScheduler, SchedulerHandle) {
    let (command_tx, command_rx) = mpsc::channel(100);
    let shared_state = Arc::new(RwLock::new(SharedJobState::default()));

    let scheduler = JobScheduler::new(command_rx, shutdown_token, Arc::clone(&shared_state));
    let handle = SchedulerHandle::new(command_tx, shared_state);

    (scheduler, handle)
}
