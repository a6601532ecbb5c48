use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

/// Errors produced by the backup service.
#[derive(Debug, Error)]
pub enum BackupError {
    /// The backup directory could not be created. Fatal at startup.
    #[error("Failed to create backup directory {path:?}: {source}")]
    DirectoryInit {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Database dump failed: {0}")]
    DumpExecution(#[from] DumpError),

    /// Listing, inspecting or deleting a file during a retention sweep failed.
    /// Deletions performed before the failure are kept.
    #[error("Retention sweep failed on {path:?}: {source}")]
    RetentionSweep {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to list backups in {path:?}: {source}")]
    Listing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid retention window: {0} days (must be at least 1)")]
    InvalidRetention(u32),
}

/// Reasons a single dump invocation can fail.
#[derive(Debug, Error)]
pub enum DumpError {
    #[error("no database connection string configured")]
    MissingDatabaseUrl,

    #[error("failed to create dump file {path:?}: {source}")]
    CreateFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to launch `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` exited with {status}{}", format_stderr(.stderr))]
    NonZeroExit {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
}

fn format_stderr(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {}", stderr)
    }
}
