use super::constants::TEST_DATABASE_URL;
use dialyhome_backup::config::BackupSettings;
use dialyhome_backup::DatabaseBackup;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

/// A temporary backup directory that is removed when dropped.
pub struct TestBackupDir {
    temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestBackupDir {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Settings whose dump program is `sh -c <dump_script>`.
    pub fn settings(&self, dump_script: &str) -> BackupSettings {
        BackupSettings {
            backup_dir: self.path().to_path_buf(),
            database_url: Some(TEST_DATABASE_URL.to_string()),
            days_to_keep: 7,
            dump_program: "sh".to_string(),
            dump_args: vec!["-c".to_string(), dump_script.to_string()],
        }
    }

    pub fn open(&self, dump_script: &str) -> DatabaseBackup {
        DatabaseBackup::open(&self.settings(dump_script)).expect("Failed to open backup service")
    }

    /// Create an empty file whose mtime is `age` in the past.
    pub fn create_aged(&self, name: &str, age: Duration) -> PathBuf {
        let path = self.path().join(name);
        File::create(&path)
            .expect("Failed to create file")
            .set_modified(SystemTime::now() - age)
            .expect("Failed to set mtime");
        path
    }

    /// File names currently in the directory, sorted.
    pub fn file_names(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.path())
            .expect("Failed to read backup dir")
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        names
    }
}
