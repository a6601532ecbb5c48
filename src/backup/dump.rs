//! Database dump execution.
//!
//! Runs the external dump utility (`pg_dump` by default) as a subprocess with
//! the connection string as its last argument and its stdout redirected into a
//! freshly named backup file.

use super::error::DumpError;
use super::naming::backup_file_name;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Default dump utility.
pub const DEFAULT_DUMP_PROGRAM: &str = "pg_dump";

/// Runs one dump per call into the backup directory.
///
/// There is no locking: concurrent calls spawn concurrent dump processes,
/// each writing its own file.
#[derive(Debug, Clone)]
pub struct DumpExecutor {
    backup_dir: PathBuf,
    /// May carry credentials, never logged.
    database_url: Option<String>,
    program: String,
    extra_args: Vec<String>,
}

impl DumpExecutor {
    pub fn new(
        backup_dir: impl Into<PathBuf>,
        database_url: Option<String>,
        program: impl Into<String>,
        extra_args: Vec<String>,
    ) -> Self {
        Self {
            backup_dir: backup_dir.into(),
            database_url,
            program: program.into(),
            extra_args,
        }
    }

    /// Dump the database into a new backup file named after the current time.
    pub async fn dump(&self) -> Result<PathBuf, DumpError> {
        self.dump_at(Utc::now()).await
    }

    /// Dump the database into the backup file named after `taken_at`.
    ///
    /// Fails with [`DumpError::CreateFile`] if the file already exists. On
    /// failure the partially written file is removed.
    pub async fn dump_at(&self, taken_at: DateTime<Utc>) -> Result<PathBuf, DumpError> {
        let database_url = self
            .database_url
            .as_deref()
            .ok_or(DumpError::MissingDatabaseUrl)?;

        let file_path = self.backup_dir.join(backup_file_name(taken_at));
        info!("Starting database dump to {:?}", file_path);

        // Never reuse an existing file: a failed run must only remove its own output
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&file_path)
            .await
            .map_err(|source| DumpError::CreateFile {
                path: file_path.clone(),
                source,
            })?
            .into_std()
            .await;

        let start_time = Instant::now();
        match self.run(database_url, file).await {
            Ok(()) => {
                info!(
                    "Database dump written to {:?} in {:?}",
                    file_path,
                    start_time.elapsed()
                );
                Ok(file_path)
            }
            Err(e) => {
                warn!("Database dump failed after {:?}: {}", start_time.elapsed(), e);
                if let Err(rm_err) = tokio::fs::remove_file(&file_path).await {
                    if rm_err.kind() != std::io::ErrorKind::NotFound {
                        warn!(
                            "Failed to remove incomplete dump {:?}: {}",
                            file_path, rm_err
                        );
                    }
                }
                Err(e)
            }
        }
    }

    async fn run(&self, database_url: &str, output: std::fs::File) -> Result<(), DumpError> {
        debug!(
            "Spawning `{}` with {} extra argument(s)",
            self.program,
            self.extra_args.len()
        );

        let child = Command::new(&self.program)
            .args(&self.extra_args)
            .arg(database_url)
            .stdin(Stdio::null())
            .stdout(Stdio::from(output))
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| DumpError::Launch {
                program: self.program.clone(),
                source,
            })?;

        // stdout goes to the file, so only stderr is collected here
        let result = child
            .wait_with_output()
            .await
            .map_err(|source| DumpError::Launch {
                program: self.program.clone(),
                source,
            })?;

        if result.status.success() {
            Ok(())
        } else {
            Err(DumpError::NonZeroExit {
                program: self.program.clone(),
                status: result.status,
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            })
        }
    }
}
