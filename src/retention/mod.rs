//! Scheduled retention cleanup of rolled log files.

mod fs;
mod scheduler;

pub use fs::{FileInfo, FileSystem, Listing, LocalFileSystem};
pub use scheduler::{
    CleanupReport, MAX_DAYS_INTERVAL, RetentionPolicy, RetentionScheduler, RetentionTarget,
    RollingStyle, Schedule, SchedulerState, TargetProvider, clamp_days_interval,
    clamp_minutes_after_midnight, next_fire_after,
};
