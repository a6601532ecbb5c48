//! Database backups: dump to timestamped files and age-based retention.

mod directory;
mod dump;
mod error;
mod naming;
mod retention;
mod service;

pub use directory::{ensure_backup_dir, DirectoryStatus};
pub use dump::{DumpExecutor, DEFAULT_DUMP_PROGRAM};
pub use error::{BackupError, DumpError};
pub use naming::{backup_file_name, is_backup_file_name, BACKUP_FILE_EXTENSION, BACKUP_FILE_PREFIX};
pub use retention::{
    enforce_retention, enforce_retention_at, RetentionPolicy, RetentionReport,
    DEFAULT_DAYS_TO_KEEP,
};
pub use service::{BackupFile, DatabaseBackup, ManualBackupResult, ScheduledRunReport};
