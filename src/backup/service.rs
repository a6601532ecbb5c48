use super::directory::{ensure_backup_dir, DirectoryStatus};
use super::dump::DumpExecutor;
use super::error::BackupError;
use super::naming::is_backup_file_name;
use super::retention::{enforce_retention, RetentionPolicy, RetentionReport};
use crate::config::BackupSettings;
use crate::server::metrics;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Result of a manual backup. Never an error: failures are carried in
/// `success: false` with the error message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManualBackupResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filepath: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ManualBackupResult {
    fn succeeded(filepath: PathBuf) -> Self {
        Self {
            success: true,
            filepath: Some(filepath),
            error: None,
        }
    }

    fn failed(error: &BackupError) -> Self {
        Self {
            success: false,
            filepath: None,
            error: Some(error.to_string()),
        }
    }
}

/// Outcome of a full scheduled run (dump followed by retention).
#[derive(Debug, Clone, Serialize)]
pub struct ScheduledRunReport {
    pub filepath: PathBuf,
    pub retention: RetentionReport,
}

/// A backup file currently present in the backup directory.
#[derive(Debug, Clone, Serialize)]
pub struct BackupFile {
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub modified_at: DateTime<Utc>,
}

/// The database backup service.
///
/// Opening it validates configuration and prepares the backup directory; it
/// does not schedule anything. Scheduling is done by registering a
/// [`DatabaseBackupJob`](crate::background_jobs::jobs::DatabaseBackupJob)
/// with the job scheduler.
pub struct DatabaseBackup {
    backup_dir: PathBuf,
    dumper: DumpExecutor,
    retention: RetentionPolicy,
}

impl DatabaseBackup {
    /// Build the service from settings and make sure the backup directory exists.
    ///
    /// A directory that cannot be created is fatal.
    pub fn open(settings: &BackupSettings) -> Result<Self, BackupError> {
        let retention = RetentionPolicy::new(settings.days_to_keep)?;
        let dumper = DumpExecutor::new(
            settings.backup_dir.clone(),
            settings.database_url.clone(),
            settings.dump_program.clone(),
            settings.dump_args.clone(),
        );
        let service = Self {
            backup_dir: settings.backup_dir.clone(),
            dumper,
            retention,
        };

        if service.ensure_backup_dir()? == DirectoryStatus::Existing {
            info!("Using backup directory {:?}", service.backup_dir);
        }
        Ok(service)
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// The configured retention window used by scheduled runs.
    pub fn retention_policy(&self) -> RetentionPolicy {
        self.retention
    }

    pub fn ensure_backup_dir(&self) -> Result<DirectoryStatus, BackupError> {
        ensure_backup_dir(&self.backup_dir)
    }

    /// Dump the database into a new backup file and return its path.
    pub async fn dump(&self) -> Result<PathBuf, BackupError> {
        match self.dumper.dump().await {
            Ok(path) => {
                let size = tokio::fs::metadata(&path)
                    .await
                    .map(|m| m.len())
                    .unwrap_or(0);
                metrics::record_backup_created(size);
                info!("Database backup created: {:?} ({} bytes)", path, size);
                Ok(path)
            }
            Err(e) => {
                let e = BackupError::from(e);
                error!("Database backup failed: {}", e);
                Err(e)
            }
        }
    }

    /// Delete backups older than `policy`.
    pub async fn enforce_retention(
        &self,
        policy: RetentionPolicy,
    ) -> Result<RetentionReport, BackupError> {
        match enforce_retention(&self.backup_dir, policy).await {
            Ok(report) => {
                metrics::record_backups_deleted(report.deleted.len());
                Ok(report)
            }
            Err(e) => {
                error!("Backup retention sweep failed: {}", e);
                Err(e)
            }
        }
    }

    /// Delete backups older than the configured retention window.
    pub async fn enforce_default_retention(&self) -> Result<RetentionReport, BackupError> {
        self.enforce_retention(self.retention).await
    }

    /// Run one dump on demand. Retention is not applied.
    pub async fn backup_now(&self) -> ManualBackupResult {
        info!("Manual database backup requested");
        match self.dump().await {
            Ok(path) => ManualBackupResult::succeeded(path),
            Err(e) => ManualBackupResult::failed(&e),
        }
    }

    /// The scheduled pipeline: dump, then retention. Retention is skipped when
    /// the dump fails.
    pub async fn run_scheduled(&self) -> Result<ScheduledRunReport, BackupError> {
        let filepath = self.dump().await?;
        let retention = self.enforce_default_retention().await?;
        Ok(ScheduledRunReport {
            filepath,
            retention,
        })
    }

    /// List backup files, newest first.
    pub async fn list_backups(&self) -> Result<Vec<BackupFile>, BackupError> {
        let listing_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| BackupError::Listing { path, source }
        };

        let mut backups = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.backup_dir)
            .await
            .map_err(listing_err(&self.backup_dir))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(listing_err(&self.backup_dir))?
        {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if !is_backup_file_name(&name) {
                continue;
            }
            let path = entry.path();
            let metadata = entry.metadata().await.map_err(listing_err(&path))?;
            if !metadata.is_file() {
                continue;
            }
            let modified = metadata.modified().map_err(listing_err(&path))?;
            backups.push(BackupFile {
                name,
                path,
                size_bytes: metadata.len(),
                modified_at: modified.into(),
            });
        }

        backups.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));
        Ok(backups)
    }
}
