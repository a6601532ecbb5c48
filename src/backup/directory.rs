use super::error::BackupError;
use std::path::Path;
use tracing::{debug, info};

/// Outcome of preparing the backup directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryStatus {
    /// The directory was already there, nothing was created.
    Existing,
    /// The directory (and any missing parents) was created.
    Created,
}

/// Make sure the backup directory exists, creating it and its parents if needed.
pub fn ensure_backup_dir(dir: &Path) -> Result<DirectoryStatus, BackupError> {
    if dir.is_dir() {
        debug!("Backup directory {:?} already exists", dir);
        return Ok(DirectoryStatus::Existing);
    }

    std::fs::create_dir_all(dir).map_err(|source| BackupError::DirectoryInit {
        path: dir.to_path_buf(),
        source,
    })?;
    info!("Created backup directory {:?}", dir);
    Ok(DirectoryStatus::Created)
}
