use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub backup_dir: Option<String>,
    pub database_url: Option<String>,
    pub ops_port: Option<u16>,

    // Feature configs
    pub backup: Option<BackupFileConfig>,
    pub schedule: Option<ScheduleFileConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct BackupFileConfig {
    pub days_to_keep: Option<u32>,
    pub dump_program: Option<String>,
    /// Extra arguments for the dump program, placed before the connection string.
    pub dump_args: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ScheduleFileConfig {
    /// Local time of day of the daily backup, "HH:MM".
    pub daily_at: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::parse(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_file() {
        let config = FileConfig::parse(
            r#"
            backup_dir = "/var/backups/dialyhome"
            database_url = "postgres://dialy@db/dialyhome"
            ops_port = 9092

            [backup]
            days_to_keep = 14
            dump_program = "/usr/lib/postgresql/16/bin/pg_dump"
            dump_args = ["--no-owner", "--clean"]

            [schedule]
            daily_at = "03:15"
            "#,
        )
        .unwrap();

        assert_eq!(config.backup_dir.as_deref(), Some("/var/backups/dialyhome"));
        assert_eq!(config.ops_port, Some(9092));
        let backup = config.backup.unwrap();
        assert_eq!(backup.days_to_keep, Some(14));
        assert_eq!(
            backup.dump_args,
            Some(vec!["--no-owner".to_string(), "--clean".to_string()])
        );
        assert_eq!(config.schedule.unwrap().daily_at.as_deref(), Some("03:15"));
    }

    #[test]
    fn test_parse_empty_file() {
        let config = FileConfig::parse("").unwrap();
        assert!(config.backup_dir.is_none());
        assert!(config.backup.is_none());
        assert!(config.schedule.is_none());
    }

    #[test]
    fn test_parse_rejects_wrong_types() {
        assert!(FileConfig::parse("ops_port = \"not a port\"").is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = FileConfig::load(Path::new("/nonexistent/dialyhome-backup.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
