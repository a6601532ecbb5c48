//! End-to-end tests for the scheduled backup job
//!
//! Runs the real scheduler with the database backup job registered and
//! drives it through a [`SchedulerHandle`].

#![cfg(unix)]

mod common;

use chrono::NaiveTime;
use common::{TestBackupDir, DAY, FAILING_DUMP, SUCCESSFUL_DUMP};
use dialyhome_backup::background_jobs::jobs::DatabaseBackupJob;
use dialyhome_backup::background_jobs::{
    create_scheduler, JobError, JobFailureListener, JobRunStatus, SchedulerHandle,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct RecordingListener {
    failures: Mutex<Vec<String>>,
}

impl JobFailureListener for RecordingListener {
    fn on_job_failed(&self, job_id: &str, error: &JobError) {
        self.failures
            .lock()
            .unwrap()
            .push(format!("{}: {}", job_id, error));
    }
}

async fn wait_for_run(handle: &SchedulerHandle) -> JobRunStatus {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let job = handle.get_job("database_backup").await.unwrap();
            if let Some(run) = job.last_run {
                if run.status != JobRunStatus::Running {
                    return run.status;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("backup job did not finish in time")
}

#[tokio::test]
async fn test_triggered_backup_runs_pipeline() {
    let dir = TestBackupDir::new();
    dir.create_aged("dialyhome_backup_old.sql", 8 * DAY);
    let backup = Arc::new(dir.open(SUCCESSFUL_DUMP));

    let shutdown = CancellationToken::new();
    let (mut scheduler, handle) = create_scheduler(shutdown.clone());
    scheduler
        .register_job(Arc::new(DatabaseBackupJob::new(
            backup,
            NaiveTime::from_hms_opt(2, 0, 0).unwrap(),
        )))
        .await;
    let runner = tokio::spawn(async move { scheduler.run().await });

    handle.trigger_job("database_backup").await.unwrap();

    assert_eq!(wait_for_run(&handle).await, JobRunStatus::Completed);
    let files = dir.file_names();
    assert_eq!(files.len(), 1);
    assert_ne!(files[0], "dialyhome_backup_old.sql");

    shutdown.cancel();
    runner.await.unwrap();
}

#[tokio::test]
async fn test_failed_backup_notifies_listener_and_scheduler_survives() {
    let dir = TestBackupDir::new();
    let old = dir.create_aged("dialyhome_backup_old.sql", 8 * DAY);
    let backup = Arc::new(dir.open(FAILING_DUMP));
    let listener = Arc::new(RecordingListener::default());

    let shutdown = CancellationToken::new();
    let (mut scheduler, handle) = create_scheduler(shutdown.clone());
    scheduler.add_failure_listener(listener.clone());
    scheduler
        .register_job(Arc::new(DatabaseBackupJob::new(
            backup,
            NaiveTime::from_hms_opt(2, 0, 0).unwrap(),
        )))
        .await;
    let runner = tokio::spawn(async move { scheduler.run().await });

    handle.trigger_job("database_backup").await.unwrap();
    assert_eq!(wait_for_run(&handle).await, JobRunStatus::Failed);

    let failures = listener.failures.lock().unwrap().clone();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].starts_with("database_backup: "));
    assert!(failures[0].contains("Connection refused"));
    // Retention was skipped for this cycle
    assert!(old.exists());

    // Still accepting work
    assert!(!runner.is_finished());
    assert_eq!(
        handle.trigger_job("missing_job").await,
        Err(JobError::NotFound)
    );

    shutdown.cancel();
    runner.await.unwrap();
}
