//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{TestBackupDir, DAY};
//!
//! #[tokio::test]
//! async fn test_sweep() {
//!     let dir = TestBackupDir::new();
//!     dir.create_aged("dialyhome_backup_old.sql", 8 * DAY);
//!     let backup = dir.open(common::SUCCESSFUL_DUMP);
//!     backup.enforce_default_retention().await.unwrap();
//! }
//! ```

mod constants;
mod fixtures;

pub use constants::*;
pub use fixtures::TestBackupDir;
