use super::context::JobContext;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveDate, NaiveTime, TimeZone};
use std::time::Duration;

/// Schedule for when a job should run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobSchedule {
    /// Run once a day at a fixed local time of day
    Daily(NaiveTime),
    /// Run at fixed intervals
    Interval(Duration),
}

impl JobSchedule {
    /// First run time strictly after `now`.
    pub fn next_run_after(&self, now: DateTime<Local>) -> DateTime<Local> {
        match self {
            JobSchedule::Daily(at) => {
                let today = now.date_naive();
                let candidate = local_datetime(today, *at);
                if candidate > now {
                    candidate
                } else {
                    local_datetime(today + ChronoDuration::days(1), *at)
                }
            }
            JobSchedule::Interval(interval) => {
                now + ChronoDuration::from_std(*interval).unwrap_or(ChronoDuration::zero())
            }
        }
    }
}

impl std::fmt::Display for JobSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobSchedule::Daily(at) => write!(f, "daily at {}", at.format("%H:%M")),
            JobSchedule::Interval(interval) => write!(f, "every {}s", interval.as_secs()),
        }
    }
}

/// Resolve a local wall-clock time, stepping over DST gaps.
fn local_datetime(date: NaiveDate, time: NaiveTime) -> DateTime<Local> {
    let naive = date.and_time(time);
    // A gap (spring forward) has no such local time; try each following hour
    for hours in 0..=3 {
        if let Some(dt) = Local
            .from_local_datetime(&(naive + ChronoDuration::hours(hours)))
            .earliest()
        {
            return dt;
        }
    }
    Local.from_utc_datetime(&naive)
}

/// How a job should be handled during shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutdownBehavior {
    /// Job can be cancelled immediately
    #[default]
    Cancellable,
    /// Wait for job to complete before shutdown
    WaitForCompletion,
}

/// Errors that can occur during job execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    NotFound,
    AlreadyRunning,
    ExecutionFailed(String),
    Cancelled,
}

impl std::fmt::Display for JobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobError::NotFound => write!(f, "Job not found"),
            JobError::AlreadyRunning => write!(f, "Job is already running"),
            JobError::ExecutionFailed(msg) => write!(f, "Execution failed: {}", msg),
            JobError::Cancelled => write!(f, "Job was cancelled"),
        }
    }
}

impl std::error::Error for JobError {}

/// Trait for background jobs.
#[async_trait]
pub trait BackgroundJob: Send + Sync {
    /// Unique identifier for this job.
    fn id(&self) -> &'static str;

    /// Human-readable name for this job.
    fn name(&self) -> &'static str;

    /// Description of what this job does.
    fn description(&self) -> &'static str;

    /// When this job should be scheduled to run.
    fn schedule(&self) -> JobSchedule;

    /// How this job should be handled during shutdown.
    fn shutdown_behavior(&self) -> ShutdownBehavior {
        ShutdownBehavior::Cancellable
    }

    /// Execute the job.
    ///
    /// Long-running jobs that are `Cancellable` should check
    /// `ctx.is_cancelled()` and return `JobError::Cancelled` when it is set.
    async fn execute(&self, ctx: &JobContext) -> Result<(), JobError>;
}

/// Receives failures of scheduled and triggered job runs.
///
/// The scheduler never propagates job errors; listeners are the hook for
/// alerting on them.
pub trait JobFailureListener: Send + Sync {
    fn on_job_failed(&self, job_id: &str, error: &JobError);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Local> {
        Local
            .from_local_datetime(
                &NaiveDate::from_ymd_opt(y, m, d)
                    .unwrap()
                    .and_hms_opt(h, min, 0)
                    .unwrap(),
            )
            .earliest()
            .unwrap()
    }

    #[test]
    fn test_daily_later_today() {
        let schedule = JobSchedule::Daily(NaiveTime::from_hms_opt(2, 0, 0).unwrap());
        let now = local(2025, 1, 15, 1, 30);

        let next = schedule.next_run_after(now);

        assert_eq!(next.date_naive(), now.date_naive());
        assert_eq!((next.hour(), next.minute()), (2, 0));
    }

    #[test]
    fn test_daily_already_passed_rolls_to_tomorrow() {
        let schedule = JobSchedule::Daily(NaiveTime::from_hms_opt(2, 0, 0).unwrap());
        let now = local(2025, 1, 15, 14, 30);

        let next = schedule.next_run_after(now);

        assert_eq!(
            next.date_naive(),
            NaiveDate::from_ymd_opt(2025, 1, 16).unwrap()
        );
        assert_eq!((next.hour(), next.minute()), (2, 0));
    }

    #[test]
    fn test_daily_exactly_at_trigger_rolls_to_tomorrow() {
        let schedule = JobSchedule::Daily(NaiveTime::from_hms_opt(2, 0, 0).unwrap());
        let now = local(2025, 1, 15, 2, 0);

        let next = schedule.next_run_after(now);

        assert!(next > now);
        assert_eq!(
            next.date_naive(),
            NaiveDate::from_ymd_opt(2025, 1, 16).unwrap()
        );
    }

    #[test]
    fn test_interval_adds_duration() {
        let schedule = JobSchedule::Interval(Duration::from_secs(3600));
        let now = local(2025, 1, 15, 10, 0);

        assert_eq!(schedule.next_run_after(now), now + ChronoDuration::hours(1));
    }

    #[test]
    fn test_schedule_display() {
        assert_eq!(
            JobSchedule::Daily(NaiveTime::from_hms_opt(2, 0, 0).unwrap()).to_string(),
            "daily at 02:00"
        );
        assert_eq!(
            JobSchedule::Interval(Duration::from_secs(90)).to_string(),
            "every 90s"
        );
    }

    #[test]
    fn test_job_error_display() {
        assert_eq!(JobError::NotFound.to_string(), "Job not found");
        assert_eq!(
            JobError::ExecutionFailed("boom".to_string()).to_string(),
            "Execution failed: boom"
        );
    }
}
