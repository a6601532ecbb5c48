//! Backup file naming.
//!
//! Backup files are named `dialyhome_backup_<timestamp>.sql`, where the
//! timestamp is the UTC ISO-8601 time with millisecond precision and every
//! `:` and `.` replaced by `-`, e.g.
//! `dialyhome_backup_2025-01-15T14-30-00-000Z.sql`.

use chrono::{DateTime, SecondsFormat, Utc};

/// Prefix shared by every backup file. Retention only ever touches files
/// starting with it.
pub const BACKUP_FILE_PREFIX: &str = "dialyhome_backup_";

/// Extension of backup files.
pub const BACKUP_FILE_EXTENSION: &str = "sql";

/// Build the file name of a backup taken at `taken_at`.
pub fn backup_file_name(taken_at: DateTime<Utc>) -> String {
    let timestamp = taken_at
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    format!(
        "{}{}.{}",
        BACKUP_FILE_PREFIX, timestamp, BACKUP_FILE_EXTENSION
    )
}

/// Whether `file_name` belongs to the backup set.
pub fn is_backup_file_name(file_name: &str) -> bool {
    file_name.starts_with(BACKUP_FILE_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_file_name_replaces_separators() {
        let taken_at = Utc.with_ymd_and_hms(2025, 1, 15, 14, 30, 0).unwrap();
        assert_eq!(
            backup_file_name(taken_at),
            "dialyhome_backup_2025-01-15T14-30-00-000Z.sql"
        );
    }

    #[test]
    fn test_file_name_keeps_milliseconds() {
        let taken_at = Utc.timestamp_millis_opt(1_736_951_400_123).unwrap();
        assert_eq!(
            backup_file_name(taken_at),
            "dialyhome_backup_2025-01-15T14-30-00-123Z.sql"
        );
    }

    #[test]
    fn test_file_name_has_single_dot() {
        let name = backup_file_name(Utc::now());
        assert_eq!(name.matches('.').count(), 1);
        assert!(!name.contains(':'));
        assert!(name.ends_with(".sql"));
    }

    #[test]
    fn test_is_backup_file_name() {
        assert!(is_backup_file_name(
            "dialyhome_backup_2025-01-15T14-30-00-000Z.sql"
        ));
        assert!(is_backup_file_name("dialyhome_backup_manual.sql"));
        assert!(!is_backup_file_name("notes.txt"));
        assert!(!is_backup_file_name("old_dialyhome_backup_1.sql"));
    }
}
