use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::{fmt::Debug, path::PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dialyhome_backup::background_jobs::create_scheduler;
use dialyhome_backup::background_jobs::jobs::DatabaseBackupJob;
use dialyhome_backup::backup::{
    DatabaseBackup, RetentionPolicy, DEFAULT_DAYS_TO_KEEP, DEFAULT_DUMP_PROGRAM,
};
use dialyhome_backup::config::{self, DEFAULT_BACKUP_DIR, DEFAULT_DAILY_AT};
use dialyhome_backup::server::{metrics, run_ops_server, OpsState};

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(format!("Error resolving path '{}': {}", s, msg));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[command(version, about = "Daily database backups with age-based retention")]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory the backup files are written to. Created if missing.
    #[clap(long, env = "BACKUP_DIR", default_value = DEFAULT_BACKUP_DIR)]
    pub backup_dir: PathBuf,

    /// Connection string handed to the dump program.
    #[clap(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// Backups older than this many days are deleted after each scheduled dump.
    #[clap(long, env = "BACKUP_DAYS_TO_KEEP", default_value_t = DEFAULT_DAYS_TO_KEEP)]
    pub days_to_keep: u32,

    /// Program used to dump the database.
    #[clap(long, env = "BACKUP_DUMP_PROGRAM", default_value = DEFAULT_DUMP_PROGRAM)]
    pub dump_program: String,

    /// Extra arguments for the dump program, split with shell quoting rules.
    #[clap(long, env = "BACKUP_DUMP_ARGS", allow_hyphen_values = true)]
    pub dump_args: Option<String>,

    /// Local time of day (HH:MM) of the scheduled backup.
    #[clap(long, env = "BACKUP_DAILY_AT", default_value = DEFAULT_DAILY_AT)]
    pub daily_at: String,

    /// Port of the loopback operations server. Disabled when not set.
    #[clap(long, env = "BACKUP_OPS_PORT")]
    pub ops_port: Option<u16>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Run the backup scheduler until interrupted (default).
    Run,
    /// Take one backup now and print the result as JSON.
    BackupNow,
    /// Delete expired backups once and print the report as JSON.
    Sweep {
        /// Retention window in days; the configured window when omitted.
        #[clap(long)]
        days: Option<u32>,
    },
    /// Print the current backup files as JSON, newest first.
    List,
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            backup_dir: args.backup_dir.clone(),
            database_url: args.database_url.clone(),
            days_to_keep: args.days_to_keep,
            dump_program: args.dump_program.clone(),
            dump_args: args.dump_args.clone(),
            daily_at: args.daily_at.clone(),
            ops_port: args.ops_port,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()?;

    info!("dialyhome-backup {} ({})", env!("CARGO_PKG_VERSION"), env!("GIT_HASH"));

    // Load TOML config if provided
    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    // Resolve final configuration (TOML overrides CLI)
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = config::AppConfig::resolve(&cli_config, file_config)?;

    info!("Configuration loaded:");
    info!("  backup_dir: {:?}", app_config.backup.backup_dir);
    info!("  days_to_keep: {}", app_config.backup.days_to_keep);
    info!("  dump_program: {}", app_config.backup.dump_program);
    info!("  daily_at: {}", app_config.schedule.daily_at.format("%H:%M"));
    if app_config.backup.database_url.is_none() {
        warn!("database_url is not set, dumps will fail until it is configured");
    }

    metrics::init_metrics();

    let backup = Arc::new(
        DatabaseBackup::open(&app_config.backup).context("Failed to open backup service")?,
    );

    match cli_args.command.clone().unwrap_or(Command::Run) {
        Command::Run => run(app_config, backup).await,
        Command::BackupNow => {
            let result = backup.backup_now().await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.success {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Sweep { days } => {
            let policy = match days {
                Some(days) => RetentionPolicy::new(days)?,
                None => backup.retention_policy(),
            };
            let report = backup.enforce_retention(policy).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::List => {
            let backups = backup.list_backups().await?;
            println!("{}", serde_json::to_string_pretty(&backups)?);
            Ok(())
        }
    }
}

async fn run(app_config: config::AppConfig, backup: Arc<DatabaseBackup>) -> Result<()> {
    // Set up background job scheduler
    let shutdown_token = CancellationToken::new();
    let (mut scheduler, scheduler_handle) = create_scheduler(shutdown_token.clone());
    scheduler
        .register_job(Arc::new(DatabaseBackupJob::from_settings(
            Arc::clone(&backup),
            &app_config.schedule,
        )))
        .await;

    info!(
        "Job scheduler initialized with {} job(s)",
        scheduler.job_count().await
    );

    let scheduler_task = tokio::spawn(async move { scheduler.run().await });

    let ops_shutdown = shutdown_token.child_token();
    let ops_server = async move {
        match app_config.ops_port {
            Some(port) => {
                let state = OpsState {
                    backup,
                    scheduler: scheduler_handle,
                };
                run_ops_server(port, state, ops_shutdown).await
            }
            None => std::future::pending().await,
        }
    };

    let result = tokio::select! {
        result = ops_server => {
            info!("Ops server stopped: {:?}", result);
            result
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, initiating graceful shutdown");
            Ok(())
        }
    };

    shutdown_token.cancel();
    if let Err(e) = scheduler_task.await {
        error!("Scheduler task failed: {}", e);
    }
    result
}
