//! Database backup background job.
//!
//! Runs the scheduled backup pipeline once a day: dump the database into a
//! new file, then delete backups older than the retention window.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, JobError, JobSchedule, ShutdownBehavior},
};
use crate::backup::DatabaseBackup;
use crate::config::ScheduleSettings;
use async_trait::async_trait;
use chrono::NaiveTime;
use std::sync::Arc;
use tracing::info;

/// Background job that dumps the database and applies retention.
pub struct DatabaseBackupJob {
    backup: Arc<DatabaseBackup>,
    daily_at: NaiveTime,
}

impl DatabaseBackupJob {
    pub fn new(backup: Arc<DatabaseBackup>, daily_at: NaiveTime) -> Self {
        Self { backup, daily_at }
    }

    pub fn from_settings(backup: Arc<DatabaseBackup>, settings: &ScheduleSettings) -> Self {
        Self::new(backup, settings.daily_at)
    }
}

#[async_trait]
impl BackgroundJob for DatabaseBackupJob {
    fn id(&self) -> &'static str {
        "database_backup"
    }

    fn name(&self) -> &'static str {
        "Database Backup"
    }

    fn description(&self) -> &'static str {
        "Dump the database to a timestamped file and delete expired backups"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Daily(self.daily_at)
    }

    fn shutdown_behavior(&self) -> ShutdownBehavior {
        // A half-written dump is useless
        ShutdownBehavior::WaitForCompletion
    }

    async fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        info!(
            "Starting database backup (triggered by {}) into {:?}",
            ctx.triggered_by,
            self.backup.backup_dir()
        );

        let report = self
            .backup
            .run_scheduled()
            .await
            .map_err(|e| JobError::ExecutionFailed(e.to_string()))?;

        info!(
            "Database backup finished: {:?}, {} expired backup(s) deleted",
            report.filepath,
            report.retention.deleted.len()
        );
        Ok(())
    }
}
