mod file_config;

pub use file_config::{BackupFileConfig, FileConfig, ScheduleFileConfig};

use crate::backup::{DEFAULT_DAYS_TO_KEEP, DEFAULT_DUMP_PROGRAM};
use anyhow::{bail, Context, Result};
use chrono::NaiveTime;
use std::path::PathBuf;

/// Backup directory used when none is configured.
pub const DEFAULT_BACKUP_DIR: &str = "./backups";

/// Local time of day of the scheduled backup when none is configured.
pub const DEFAULT_DAILY_AT: &str = "02:00";

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments (and their environment variables)
/// that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub backup_dir: PathBuf,
    pub database_url: Option<String>,
    pub days_to_keep: u32,
    pub dump_program: String,
    /// Shell-style argument string, split with shell quoting rules.
    pub dump_args: Option<String>,
    pub daily_at: String,
    pub ops_port: Option<u16>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            backup_dir: PathBuf::from(DEFAULT_BACKUP_DIR),
            database_url: None,
            days_to_keep: DEFAULT_DAYS_TO_KEEP,
            dump_program: DEFAULT_DUMP_PROGRAM.to_string(),
            dump_args: None,
            daily_at: DEFAULT_DAILY_AT.to_string(),
            ops_port: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backup: BackupSettings,
    pub schedule: ScheduleSettings,
    /// Port of the loopback operations server, disabled when absent.
    pub ops_port: Option<u16>,
}

#[derive(Debug, Clone)]
pub struct BackupSettings {
    pub backup_dir: PathBuf,
    pub database_url: Option<String>,
    pub days_to_keep: u32,
    pub dump_program: String,
    pub dump_args: Vec<String>,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            backup_dir: PathBuf::from(DEFAULT_BACKUP_DIR),
            database_url: None,
            days_to_keep: DEFAULT_DAYS_TO_KEEP,
            dump_program: DEFAULT_DUMP_PROGRAM.to_string(),
            dump_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScheduleSettings {
    pub daily_at: NaiveTime,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            daily_at: NaiveTime::from_hms_opt(2, 0, 0).unwrap_or_default(),
        }
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();
        let backup_file = file.backup.unwrap_or_default();
        let schedule_file = file.schedule.unwrap_or_default();

        let backup_dir = file
            .backup_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| cli.backup_dir.clone());
        if backup_dir.as_os_str().is_empty() {
            bail!("backup_dir must not be empty");
        }
        if backup_dir.exists() && !backup_dir.is_dir() {
            bail!("backup_dir is not a directory: {:?}", backup_dir);
        }

        let database_url = file
            .database_url
            .or_else(|| cli.database_url.clone())
            .filter(|url| !url.trim().is_empty());

        let days_to_keep = backup_file.days_to_keep.unwrap_or(cli.days_to_keep);
        if days_to_keep == 0 {
            bail!("days_to_keep must be at least 1");
        }

        let dump_program = backup_file
            .dump_program
            .unwrap_or_else(|| cli.dump_program.clone());
        if dump_program.trim().is_empty() {
            bail!("dump_program must not be empty");
        }

        let dump_args = match backup_file.dump_args {
            Some(args) => args,
            None => match &cli.dump_args {
                Some(raw) => parse_dump_args(raw)?,
                None => Vec::new(),
            },
        };

        let daily_at_raw = schedule_file
            .daily_at
            .unwrap_or_else(|| cli.daily_at.clone());
        let daily_at = parse_time_of_day(&daily_at_raw)?;

        let ops_port = file.ops_port.or(cli.ops_port);

        Ok(Self {
            backup: BackupSettings {
                backup_dir,
                database_url,
                days_to_keep,
                dump_program,
                dump_args,
            },
            schedule: ScheduleSettings { daily_at },
            ops_port,
        })
    }
}

/// Parses a "HH:MM" time of day.
pub fn parse_time_of_day(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .with_context(|| format!("Invalid time of day '{}', expected HH:MM", s))
}

/// Splits a dump argument string using shell quoting rules.
fn parse_dump_args(raw: &str) -> Result<Vec<String>> {
    match shlex::split(raw) {
        Some(args) => Ok(args),
        None => bail!("Invalid dump arguments (unbalanced quotes): {}", raw),
    }
}
