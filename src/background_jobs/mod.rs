//! Background job scheduling and execution system.
//!
//! Jobs run on a daily or interval schedule inside one scheduler loop, and
//! can be triggered on demand through a [`SchedulerHandle`].

mod context;
mod handle;
mod job;
pub mod jobs;
mod scheduler;

pub use context::JobContext;
pub use handle::{JobInfo, JobRunInfo, JobRunStatus, JobState, SchedulerHandle};
pub use job::{BackgroundJob, JobError, JobFailureListener, JobSchedule, ShutdownBehavior};
pub use scheduler::{create_scheduler, JobScheduler};
