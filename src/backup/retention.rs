//! Retention sweep over the backup directory.
//!
//! Only regular files whose name starts with the backup prefix are considered.
//! A file is deleted when its age (now - mtime) is strictly greater than the
//! retention window. Files that disappear mid-sweep are skipped, so sweeps
//! can overlap each other and running dumps. The sweep is not
//! transactional: a failure stops it and leaves earlier deletions in place.

use super::error::BackupError;
use super::naming::is_backup_file_name;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info};

/// Default number of days a backup is kept.
pub const DEFAULT_DAYS_TO_KEEP: u32 = 7;

const MILLIS_PER_DAY: u64 = 24 * 60 * 60 * 1000;

/// How long backup files are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    days_to_keep: u32,
}

impl RetentionPolicy {
    pub fn new(days_to_keep: u32) -> Result<Self, BackupError> {
        if days_to_keep == 0 {
            return Err(BackupError::InvalidRetention(days_to_keep));
        }
        Ok(Self { days_to_keep })
    }

    pub fn days_to_keep(&self) -> u32 {
        self.days_to_keep
    }

    /// Maximum age a backup may reach before it is deleted.
    pub fn max_age(&self) -> Duration {
        Duration::from_millis(self.days_to_keep as u64 * MILLIS_PER_DAY)
    }

    /// Whether a file last modified at `modified` has outlived the window at `now`.
    ///
    /// Files with a modification time in the future are never expired.
    pub fn is_expired(&self, modified: SystemTime, now: SystemTime) -> bool {
        match now.duration_since(modified) {
            Ok(age) => age > self.max_age(),
            Err(_) => false,
        }
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            days_to_keep: DEFAULT_DAYS_TO_KEEP,
        }
    }
}

/// Summary of one retention sweep.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetentionReport {
    pub days_to_keep: u32,
    /// Number of backup files inspected.
    pub scanned: usize,
    pub deleted: Vec<PathBuf>,
    pub retained: usize,
}

/// Delete expired backup files from `dir`, judged against the current time.
pub async fn enforce_retention(
    dir: &Path,
    policy: RetentionPolicy,
) -> Result<RetentionReport, BackupError> {
    enforce_retention_at(dir, policy, SystemTime::now()).await
}

/// Delete backup files from `dir` that are expired at `now`.
pub async fn enforce_retention_at(
    dir: &Path,
    policy: RetentionPolicy,
    now: SystemTime,
) -> Result<RetentionReport, BackupError> {
    let sweep_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| BackupError::RetentionSweep { path, source }
    };

    info!(
        "Enforcing backup retention in {:?}: keeping {} days",
        dir, policy.days_to_keep
    );

    let mut report = RetentionReport {
        days_to_keep: policy.days_to_keep,
        ..Default::default()
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(sweep_err(dir))?;
    while let Some(entry) = entries.next_entry().await.map_err(sweep_err(dir))? {
        let path = entry.path();
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        if !is_backup_file_name(name) {
            debug!("Ignoring non-backup entry {:?}", path);
            continue;
        }

        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Backup {:?} already gone", path);
                continue;
            }
            Err(e) => return Err(sweep_err(&path)(e)),
        };
        if !metadata.is_file() {
            debug!("Ignoring non-file entry {:?}", path);
            continue;
        }
        report.scanned += 1;

        let modified = metadata.modified().map_err(sweep_err(&path))?;
        if !policy.is_expired(modified, now) {
            report.retained += 1;
            continue;
        }

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted old backup: {}", name);
                report.deleted.push(path);
            }
            // Removed by a concurrent sweep or a failed dump's cleanup
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Backup {:?} already gone", path);
            }
            Err(e) => return Err(sweep_err(&path)(e)),
        }
    }

    info!(
        "Retention sweep complete: scanned={}, deleted={}, retained={}",
        report.scanned,
        report.deleted.len(),
        report.retained
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn create_file_aged(dir: &Path, name: &str, age: Duration, now: SystemTime) -> PathBuf {
        let path = dir.join(name);
        let file = File::create(&path).unwrap();
        file.set_modified(now - age).unwrap();
        path
    }

    #[test]
    fn test_zero_days_rejected() {
        assert!(matches!(
            RetentionPolicy::new(0),
            Err(BackupError::InvalidRetention(0))
        ));
        assert_eq!(RetentionPolicy::new(1).unwrap().days_to_keep(), 1);
    }

    #[test]
    fn test_default_policy_is_seven_days() {
        let policy = RetentionPolicy::default();
        assert_eq!(policy.days_to_keep(), 7);
        assert_eq!(policy.max_age(), Duration::from_millis(7 * 86_400_000));
    }

    #[test]
    fn test_expiry_is_strictly_greater_than_window() {
        let policy = RetentionPolicy::new(7).unwrap();
        let now = SystemTime::now();

        assert!(!policy.is_expired(now - 7 * DAY, now));
        assert!(policy.is_expired(now - 7 * DAY - Duration::from_millis(1), now));
        assert!(!policy.is_expired(now - 6 * DAY, now));
        assert!(!policy.is_expired(now + DAY, now));
    }

    #[tokio::test]
    async fn test_old_backup_deleted_recent_kept() {
        let temp_dir = TempDir::new().unwrap();
        let now = SystemTime::now();
        let old = create_file_aged(
            temp_dir.path(),
            "dialyhome_backup_old.sql",
            8 * DAY,
            now,
        );
        let recent = create_file_aged(
            temp_dir.path(),
            "dialyhome_backup_recent.sql",
            6 * DAY,
            now,
        );

        let report = enforce_retention_at(temp_dir.path(), RetentionPolicy::default(), now)
            .await
            .unwrap();

        assert!(!old.exists());
        assert!(recent.exists());
        assert_eq!(report.scanned, 2);
        assert_eq!(report.deleted, vec![old]);
        assert_eq!(report.retained, 1);
    }

    #[tokio::test]
    async fn test_unrelated_files_never_touched() {
        let temp_dir = TempDir::new().unwrap();
        let now = SystemTime::now();
        let backup = create_file_aged(
            temp_dir.path(),
            "dialyhome_backup_2024-01-01T00-00-00-000Z.sql",
            10 * DAY,
            now,
        );
        let unrelated = create_file_aged(temp_dir.path(), "patients_export.csv", 100 * DAY, now);

        let report = enforce_retention_at(temp_dir.path(), RetentionPolicy::default(), now)
            .await
            .unwrap();

        assert!(!backup.exists());
        assert!(unrelated.exists());
        assert_eq!(report.scanned, 1);
        assert_eq!(report.deleted.len(), 1);
    }

    #[tokio::test]
    async fn test_prefixed_directory_is_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("dialyhome_backup_archive");
        std::fs::create_dir(&dir).unwrap();

        let report = enforce_retention(temp_dir.path(), RetentionPolicy::new(1).unwrap())
            .await
            .unwrap();

        assert!(dir.is_dir());
        assert_eq!(report.scanned, 0);
    }

    #[tokio::test]
    async fn test_missing_directory_is_sweep_error() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing");

        let err = enforce_retention(&missing, RetentionPolicy::default())
            .await
            .unwrap_err();

        match err {
            BackupError::RetentionSweep { path, .. } => assert_eq!(path, missing),
            other => panic!("Expected RetentionSweep, got {:?}", other),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_overlapping_sweeps_both_succeed() {
        let temp_dir = TempDir::new().unwrap();
        let now = SystemTime::now();
        for i in 0..300 {
            create_file_aged(
                temp_dir.path(),
                &format!("dialyhome_backup_{}.sql", i),
                8 * DAY,
                now,
            );
        }

        let sweep = |dir: PathBuf| {
            tokio::spawn(async move {
                enforce_retention_at(&dir, RetentionPolicy::default(), now).await
            })
        };
        let first = sweep(temp_dir.path().to_path_buf());
        let second = sweep(temp_dir.path().to_path_buf());

        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();

        // Every file is deleted exactly once across the two sweeps
        assert_eq!(first.deleted.len() + second.deleted.len(), 300);
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_empty_directory() {
        let temp_dir = TempDir::new().unwrap();

        let report = enforce_retention(temp_dir.path(), RetentionPolicy::default())
            .await
            .unwrap();

        assert_eq!(report.scanned, 0);
        assert!(report.deleted.is_empty());
        assert_eq!(report.retained, 0);
    }
}
