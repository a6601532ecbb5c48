//! DialyHome Backup Library
//!
//! Scheduled database dumps with age-based retention, exposed to the binary
//! and to integration tests.

pub mod background_jobs;
pub mod backup;
pub mod config;
pub mod server;

// Re-export commonly used types for convenience
pub use backup::{DatabaseBackup, ManualBackupResult};
pub use server::{run_ops_server, OpsState};
