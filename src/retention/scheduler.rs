//! Self-rescheduling daily cleanup of rolled log files.

use crate::error::ControlError;
use crate::log_sink::LogSink;
use crate::retention::fs::FileSystem;
use chrono::{DateTime, Days, Local, NaiveDateTime, NaiveTime, TimeDelta, TimeZone};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

const MINUTES_PER_DAY: u32 = 24 * 60;

/// Longest accepted gap between cleanup passes, in days.
pub const MAX_DAYS_INTERVAL: u32 = 3650;

/// Bring a `DaysInterval` value into `1..=MAX_DAYS_INTERVAL`.
pub fn clamp_days_interval(days: u32) -> u32 {
    days.clamp(1, MAX_DAYS_INTERVAL)
}

/// Cap a `MinutesAfterMidnight` value to the last minute of the day.
pub fn clamp_minutes_after_midnight(minutes: u32) -> u32 {
    minutes.min(MINUTES_PER_DAY - 1)
}

/// How a log target rotates its files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RollingStyle {
    /// A new file per date period
    #[default]
    Date,
    /// A new file when the current one reaches a size limit
    Size,
    /// Both date and size
    Composite,
}

impl RollingStyle {
    /// Whether retention cleanup applies. Size-rolled targets cap their own
    /// backup count.
    pub fn is_date_based(self) -> bool {
        matches!(self, Self::Date | Self::Composite)
    }
}

impl fmt::Display for RollingStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Date => "Date",
            Self::Size => "Size",
            Self::Composite => "Composite",
        })
    }
}

impl FromStr for RollingStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "date" => Ok(Self::Date),
            "size" => Ok(Self::Size),
            "composite" => Ok(Self::Composite),
            other => Err(format!("unknown rolling style '{}'", other)),
        }
    }
}

/// A rolling log output subject to cleanup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionTarget {
    /// Directory holding the rolled files
    pub directory: PathBuf,
    /// Files starting with this prefix belong to the target
    pub filename_prefix: String,
    /// Rotation policy of the target
    pub rolling: RollingStyle,
    /// Days of backups to keep
    pub max_backups: u32,
}

impl RetentionTarget {
    /// Derive a target from the active log file path, e.g. `logs/app.log`
    /// yields directory `logs` and prefix `app`.
    pub fn from_log_file(path: &Path, rolling: RollingStyle, max_backups: u32) -> Option<Self> {
        let prefix = path.file_stem()?.to_str()?.to_string();
        let directory = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Some(Self {
            directory,
            filename_prefix: prefix,
            rolling,
            max_backups,
        })
    }

    /// The policy for a cleanup run at `now`, or `None` when the cutoff
    /// falls before the earliest representable date.
    pub fn policy(&self, now: DateTime<Local>) -> Option<RetentionPolicy> {
        let cutoff = now.checked_sub_signed(TimeDelta::days(i64::from(self.max_backups)))?;
        Some(RetentionPolicy {
            directory: self.directory.clone(),
            filename_prefix: self.filename_prefix.clone(),
            cutoff,
            max_backups: self.max_backups,
        })
    }
}

/// Retention parameters computed for a single run. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Directory to scan
    pub directory: PathBuf,
    /// Prefix of eligible files
    pub filename_prefix: String,
    /// Files created on or before this date are deleted
    pub cutoff: DateTime<Local>,
    /// Days of backups kept
    pub max_backups: u32,
}

/// Supplies the current set of targets at the start of each pass.
pub type TargetProvider = Arc<dyn Fn() -> Vec<RetentionTarget> + Send + Sync>;

/// Result of one cleanup pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Files that were removed
    pub deleted: Vec<PathBuf>,
    /// Enumeration or deletion failures
    pub failed: usize,
    /// Targets skipped because they roll by size or keep no backups
    pub skipped_targets: usize,
}

/// Lifecycle of the cleanup timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No timer armed
    Idle,
    /// Waiting for the next fire time
    Armed,
    /// Running a cleanup pass
    Fired,
}

/// Live-settable timer knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// Whether the timer runs at all
    pub auto_clean_up: bool,
    /// Offset into the day at which the pass runs
    pub minutes_after_midnight: u32,
    /// Days between passes
    pub days_interval: u32,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            auto_clean_up: false,
            minutes_after_midnight: 60,
            days_interval: 1,
        }
    }
}

/// Next fire time: today's date plus `days_interval` days, then
/// `minutes_after_midnight` minutes into that day.
///
/// Both knobs go through [`clamp_days_interval`] and
/// [`clamp_minutes_after_midnight`] first, so the result always lies after
/// `now`.
pub fn next_fire_after(
    now: DateTime<Local>,
    days_interval: u32,
    minutes_after_midnight: u32,
) -> DateTime<Local> {
    let days = u64::from(clamp_days_interval(days_interval));
    let minutes = i64::from(clamp_minutes_after_midnight(minutes_after_midnight));

    let date = now
        .date_naive()
        .checked_add_days(Days::new(days))
        .unwrap_or(now.date_naive());
    let naive = date.and_time(NaiveTime::MIN) + TimeDelta::minutes(minutes);

    let mut next = to_local(naive);
    while next <= now {
        next += TimeDelta::days(1);
    }
    next
}

fn to_local(naive: NaiveDateTime) -> DateTime<Local> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .unwrap_or_else(|| Local.from_utc_datetime(&naive))
}

struct Inner {
    schedule: Mutex<Schedule>,
    status: Mutex<(SchedulerState, Option<DateTime<Local>>)>,
    generation: AtomicU64,
    started: Mutex<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
    fs: Arc<dyn FileSystem>,
    targets: TargetProvider,
    sink: Arc<dyn LogSink>,
}

impl Inner {
    /// Generation bumps happen under the status lock, so a stale task can
    /// never overwrite the status of a newer one.
    fn set_status(&self, generation: u64, state: SchedulerState, next: Option<DateTime<Local>>) {
        let mut status = self.status.lock();
        if self.generation.load(Ordering::SeqCst) == generation {
            *status = (state, next);
        }
    }

    fn invalidate(&self) -> u64 {
        let mut status = self.status.lock();
        *status = (SchedulerState::Idle, None);
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn cleanup_pass(&self, now: DateTime<Local>) -> CleanupReport {
        let mut report = CleanupReport::default();

        for target in (self.targets)() {
            if !target.rolling.is_date_based() || target.max_backups == 0 {
                report.skipped_targets += 1;
                continue;
            }

            let Some(policy) = target.policy(now) else {
                let err = ControlError::Cleanup {
                    path: target.directory.clone(),
                    reason: format!("MaxBackups {} is out of range", target.max_backups),
                };
                self.sink.error("skipping retention target", Some(&err));
                report.failed += 1;
                continue;
            };

            let listing = match self
                .fs
                .list_files(&policy.directory, &policy.filename_prefix)
            {
                Ok(listing) => listing,
                Err(e) => {
                    let err = ControlError::Cleanup {
                        path: policy.directory.clone(),
                        reason: e.to_string(),
                    };
                    self.sink.error("could not enumerate log files", Some(&err));
                    report.failed += 1;
                    continue;
                }
            };

            for (path, e) in listing.unreadable {
                let err = ControlError::Cleanup {
                    path,
                    reason: e.to_string(),
                };
                self.sink.error("could not read log file entry", Some(&err));
                report.failed += 1;
            }

            let cutoff = policy.cutoff.date_naive();
            for file in listing.files.into_iter().filter(|f| f.created.date_naive() <= cutoff) {
                match self.fs.delete(&file.path) {
                    Ok(()) => report.deleted.push(file.path),
                    Err(e) => {
                        let err = ControlError::Cleanup {
                            path: file.path.clone(),
                            reason: e.to_string(),
                        };
                        self.sink.error("could not delete expired log file", Some(&err));
                        report.failed += 1;
                    }
                }
            }
        }

        report
    }
}

/// Runs a cleanup pass once per configured interval.
///
/// The timer is one-shot: after each pass the next deadline is computed
/// again from the current knobs, so a slow pass never overlaps the next one.
/// Changing any knob re-arms the timer immediately.
///
/// # Examples
///
/// ```rust,no_run
/// use hotswap_verbosity::retention::{
///     LocalFileSystem, RetentionScheduler, RetentionTarget, RollingStyle,
/// };
/// use hotswap_verbosity::TracingSink;
/// use std::path::Path;
/// use std::sync::Arc;
///
/// # async fn example() {
/// let scheduler = RetentionScheduler::new(
///     Arc::new(LocalFileSystem),
///     Arc::new(|| {
///         RetentionTarget::from_log_file(Path::new("logs/app.log"), RollingStyle::Date, 30)
///             .into_iter()
///             .collect()
///     }),
///     Arc::new(TracingSink),
/// );
/// scheduler.set_minutes_after_midnight(90);
/// scheduler.set_auto_clean_up(true);
/// scheduler.start();
/// # }
/// ```
pub struct RetentionScheduler {
    inner: Arc<Inner>,
}

impl RetentionScheduler {
    /// Create an idle scheduler with the default schedule.
    pub fn new(fs: Arc<dyn FileSystem>, targets: TargetProvider, sink: Arc<dyn LogSink>) -> Self {
        Self {
            inner: Arc::new(Inner {
                schedule: Mutex::new(Schedule::default()),
                status: Mutex::new((SchedulerState::Idle, None)),
                generation: AtomicU64::new(0),
                started: Mutex::new(false),
                task: Mutex::new(None),
                fs,
                targets,
                sink,
            }),
        }
    }

    /// Begin scheduling. The timer is armed only while auto clean-up is on.
    pub fn start(&self) {
        *self.inner.started.lock() = true;
        self.rearm();
    }

    /// Cancel any pending timer. Knob values are kept.
    pub fn stop(&self) {
        *self.inner.started.lock() = false;
        self.rearm();
    }

    fn rearm(&self) {
        let generation = self.inner.invalidate();
        if let Some(task) = self.inner.task.lock().take() {
            task.abort();
        }

        let started = *self.inner.started.lock();
        if !started || !self.inner.schedule.lock().auto_clean_up {
            return;
        }

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                self.inner
                    .sink
                    .error("retention timer needs a tokio runtime", Some(&e));
                return;
            }
        };

        let inner = Arc::clone(&self.inner);
        *self.inner.task.lock() = Some(handle.spawn(run(inner, generation)));
    }

    /// Whether the timer is enabled.
    pub fn auto_clean_up(&self) -> bool {
        self.inner.schedule.lock().auto_clean_up
    }

    /// Enable or disable the timer; re-arms immediately.
    pub fn set_auto_clean_up(&self, enabled: bool) {
        self.inner.schedule.lock().auto_clean_up = enabled;
        self.rearm();
    }

    /// Minutes after midnight at which passes run.
    pub fn minutes_after_midnight(&self) -> u32 {
        self.inner.schedule.lock().minutes_after_midnight
    }

    /// Change the time of day; re-arms immediately.
    pub fn set_minutes_after_midnight(&self, minutes: u32) {
        let clamped = clamp_minutes_after_midnight(minutes);
        if clamped != minutes {
            self.inner.sink.warn(
                &format!("MinutesAfterMidnight {} capped to {}", minutes, clamped),
                None,
            );
        }
        self.inner.schedule.lock().minutes_after_midnight = clamped;
        self.rearm();
    }

    /// Days between passes.
    pub fn days_interval(&self) -> u32 {
        self.inner.schedule.lock().days_interval
    }

    /// Change the interval; re-arms immediately.
    pub fn set_days_interval(&self, days: u32) {
        let clamped = clamp_days_interval(days);
        if clamped != days {
            self.inner
                .sink
                .warn(&format!("DaysInterval {} adjusted to {}", days, clamped), None);
        }
        self.inner.schedule.lock().days_interval = clamped;
        self.rearm();
    }

    /// Current knob values.
    pub fn schedule(&self) -> Schedule {
        *self.inner.schedule.lock()
    }

    /// Where the timer currently is.
    pub fn state(&self) -> SchedulerState {
        self.inner.status.lock().0
    }

    /// The armed deadline, if any.
    pub fn next_fire(&self) -> Option<DateTime<Local>> {
        self.inner.status.lock().1
    }

    /// Run a cleanup pass now on the calling thread.
    ///
    /// The timer is not affected.
    pub fn trigger_cleanup_now(&self) -> CleanupReport {
        self.cleanup_at(Local::now())
    }

    /// Run a cleanup pass as if the current time were `now`.
    pub fn cleanup_at(&self, now: DateTime<Local>) -> CleanupReport {
        let report = self.inner.cleanup_pass(now);
        log_report(&*self.inner.sink, &report);
        report
    }
}

impl Drop for RetentionScheduler {
    fn drop(&mut self) {
        self.inner.invalidate();
        if let Some(task) = self.inner.task.lock().take() {
            task.abort();
        }
    }
}

impl fmt::Debug for RetentionScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetentionScheduler")
            .field("schedule", &self.schedule())
            .field("state", &self.state())
            .finish()
    }
}

async fn run(inner: Arc<Inner>, generation: u64) {
    while inner.generation.load(Ordering::SeqCst) == generation {
        let schedule = *inner.schedule.lock();
        let now = Local::now();
        let next = next_fire_after(now, schedule.days_interval, schedule.minutes_after_midnight);
        inner.set_status(generation, SchedulerState::Armed, Some(next));

        let delay = (next - now).to_std().unwrap_or(Duration::ZERO);
        tokio::time::sleep(delay).await;

        if inner.generation.load(Ordering::SeqCst) != generation {
            break;
        }
        inner.set_status(generation, SchedulerState::Fired, None);

        let worker = Arc::clone(&inner);
        match tokio::task::spawn_blocking(move || worker.cleanup_pass(Local::now())).await {
            Ok(report) => log_report(&*inner.sink, &report),
            Err(e) => inner.sink.error("retention cleanup task failed", Some(&e)),
        }
    }
}

fn log_report(sink: &dyn LogSink, report: &CleanupReport) {
    sink.info(&format!(
        "log retention pass: {} deleted, {} failed, {} targets skipped",
        report.deleted.len(),
        report.failed,
        report.skipped_targets
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_sink::Severity;
    use crate::retention::fs::{FileInfo, Listing};
    use chrono::Timelike;
    use std::collections::HashSet;
    use std::io;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Sink(Mutex<Vec<(Severity, String)>>);

    impl LogSink for Sink {
        fn log(
            &self,
            severity: Severity,
            message: &str,
            _error: Option<&(dyn std::error::Error + 'static)>,
        ) {
            self.0.lock().push((severity, message.to_string()));
        }
    }

    impl Sink {
        fn errors(&self) -> usize {
            self.0
                .lock()
                .iter()
                .filter(|(s, _)| *s == Severity::Error)
                .count()
        }
    }

    struct FakeFs {
        files: Vec<FileInfo>,
        undeletable: HashSet<PathBuf>,
        unreadable: HashSet<PathBuf>,
        deleted: Mutex<Vec<PathBuf>>,
        listings: AtomicUsize,
        fired: Arc<tokio::sync::Notify>,
    }

    impl FakeFs {
        fn new(now: DateTime<Local>, ages_in_days: &[i64]) -> Self {
            let files = ages_in_days
                .iter()
                .map(|age| {
                    let name = format!("app.log.{}d", age);
                    FileInfo {
                        path: PathBuf::from("/logs").join(&name),
                        name,
                        created: now - TimeDelta::days(*age),
                    }
                })
                .collect();
            Self {
                files,
                undeletable: HashSet::new(),
                unreadable: HashSet::new(),
                deleted: Mutex::new(Vec::new()),
                listings: AtomicUsize::new(0),
                fired: Arc::new(tokio::sync::Notify::new()),
            }
        }
    }

    impl FileSystem for FakeFs {
        fn list_files(&self, dir: &Path, prefix: &str) -> io::Result<Listing> {
            self.listings.fetch_add(1, Ordering::SeqCst);
            self.fired.notify_one();
            if self.unreadable.contains(dir) {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
            }
            Ok(self
                .files
                .iter()
                .filter(|f| f.path.parent() == Some(dir) && f.name.starts_with(prefix))
                .cloned()
                .collect::<Vec<_>>()
                .into())
        }

        fn delete(&self, path: &Path) -> io::Result<()> {
            if self.undeletable.contains(path) {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "locked"));
            }
            self.deleted.lock().push(path.to_path_buf());
            Ok(())
        }
    }

    fn target(rolling: RollingStyle, max_backups: u32) -> RetentionTarget {
        RetentionTarget {
            directory: PathBuf::from("/logs"),
            filename_prefix: "app".to_string(),
            rolling,
            max_backups,
        }
    }

    fn scheduler(fs: Arc<FakeFs>, targets: Vec<RetentionTarget>, sink: Arc<Sink>) -> RetentionScheduler {
        RetentionScheduler::new(fs, Arc::new(move || targets.clone()), sink)
    }

    #[test]
    fn test_only_files_past_cutoff_are_deleted() {
        let now = Local::now();
        let fs = Arc::new(FakeFs::new(now, &[400, 10, 1]));
        let scheduler = scheduler(fs.clone(), vec![target(RollingStyle::Date, 365)], Arc::default());

        let report = scheduler.cleanup_at(now);
        assert_eq!(report.deleted, vec![PathBuf::from("/logs/app.log.400d")]);
        assert_eq!(report.failed, 0);
        assert_eq!(*fs.deleted.lock(), vec![PathBuf::from("/logs/app.log.400d")]);
    }

    #[test]
    fn test_size_rolled_targets_are_skipped() {
        let now = Local::now();
        let fs = Arc::new(FakeFs::new(now, &[400]));
        let scheduler = scheduler(
            fs.clone(),
            vec![target(RollingStyle::Size, 1), target(RollingStyle::Date, 0)],
            Arc::default(),
        );

        let report = scheduler.cleanup_at(now);
        assert!(report.deleted.is_empty());
        assert_eq!(report.skipped_targets, 2);
        assert_eq!(fs.listings.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_delete_failure_does_not_abort_batch() {
        let now = Local::now();
        let mut fake = FakeFs::new(now, &[500, 400, 1]);
        fake.undeletable.insert(PathBuf::from("/logs/app.log.500d"));
        let fs = Arc::new(fake);
        let sink = Arc::new(Sink::default());
        let scheduler = scheduler(fs.clone(), vec![target(RollingStyle::Composite, 30)], sink.clone());

        let report = scheduler.cleanup_at(now);
        assert_eq!(report.deleted, vec![PathBuf::from("/logs/app.log.400d")]);
        assert_eq!(report.failed, 1);
        assert_eq!(sink.errors(), 1);
    }

    #[test]
    fn test_listing_failure_moves_to_next_target() {
        let now = Local::now();
        let mut fake = FakeFs::new(now, &[400]);
        fake.unreadable.insert(PathBuf::from("/locked"));
        let fs = Arc::new(fake);
        let locked = RetentionTarget {
            directory: PathBuf::from("/locked"),
            ..target(RollingStyle::Date, 30)
        };
        let sink = Arc::new(Sink::default());
        let scheduler = scheduler(fs.clone(), vec![locked, target(RollingStyle::Date, 30)], sink.clone());

        let report = scheduler.cleanup_at(now);
        assert_eq!(report.failed, 1);
        assert_eq!(report.deleted.len(), 1);
        assert_eq!(sink.errors(), 1);
    }

    #[test]
    fn test_next_fire_adds_days_then_minutes() {
        let now = Local.with_ymd_and_hms(2026, 3, 10, 23, 30, 0).single().unwrap();
        let next = next_fire_after(now, 1, 90);
        assert_eq!(next.date_naive(), now.date_naive() + Days::new(1));
        assert_eq!((next.hour(), next.minute()), (1, 30));

        let next = next_fire_after(now, 7, 0);
        assert_eq!(next.date_naive(), now.date_naive() + Days::new(7));
        assert_eq!((next.hour(), next.minute()), (0, 0));
    }

    #[test]
    fn test_next_fire_clamps_knobs() {
        let now = Local.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).single().unwrap();
        let next = next_fire_after(now, 0, 5000);
        assert!(next > now);
        assert_eq!((next.hour(), next.minute()), (23, 59));
    }

    #[test]
    fn test_long_intervals_are_capped() {
        let now = Local.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).single().unwrap();
        let next = next_fire_after(now, u32::MAX, 60);
        assert_eq!(
            next.date_naive(),
            now.date_naive() + Days::new(u64::from(MAX_DAYS_INTERVAL))
        );

        let sink = Arc::new(Sink::default());
        let scheduler = scheduler(Arc::new(FakeFs::new(now, &[])), vec![], sink.clone());
        scheduler.set_days_interval(4_000_000_000);
        assert_eq!(scheduler.days_interval(), MAX_DAYS_INTERVAL);
        scheduler.set_days_interval(0);
        assert_eq!(scheduler.days_interval(), 1);
        assert_eq!(
            sink.0.lock().iter().filter(|(s, _)| *s == Severity::Warn).count(),
            2
        );
    }

    #[test]
    fn test_out_of_range_backups_skip_target() {
        let now = Local::now();
        let fs = Arc::new(FakeFs::new(now, &[400]));
        let sink = Arc::new(Sink::default());
        let scheduler = scheduler(
            fs.clone(),
            vec![target(RollingStyle::Date, 200_000_000), target(RollingStyle::Date, 30)],
            sink.clone(),
        );

        let report = scheduler.trigger_cleanup_now();
        assert_eq!(report.failed, 1);
        assert_eq!(report.deleted, vec![PathBuf::from("/logs/app.log.400d")]);
        assert_eq!(fs.listings.load(Ordering::SeqCst), 1);
        assert_eq!(sink.errors(), 1);
    }

    #[test]
    fn test_unreadable_entries_are_counted() {
        struct PartlyReadable(DateTime<Local>);

        impl FileSystem for PartlyReadable {
            fn list_files(&self, dir: &Path, _prefix: &str) -> io::Result<Listing> {
                Ok(Listing {
                    files: vec![FileInfo {
                        path: dir.join("app.log.old"),
                        name: "app.log.old".to_string(),
                        created: self.0 - TimeDelta::days(90),
                    }],
                    unreadable: vec![(
                        dir.join("app.log.locked"),
                        io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
                    )],
                })
            }

            fn delete(&self, _path: &Path) -> io::Result<()> {
                Ok(())
            }
        }

        let now = Local::now();
        let sink = Arc::new(Sink::default());
        let targets = vec![target(RollingStyle::Date, 30)];
        let scheduler = RetentionScheduler::new(
            Arc::new(PartlyReadable(now)),
            Arc::new(move || targets.clone()),
            sink.clone(),
        );

        let report = scheduler.cleanup_at(now);
        assert_eq!(report.deleted, vec![PathBuf::from("/logs/app.log.old")]);
        assert_eq!(report.failed, 1);
        assert_eq!(sink.errors(), 1);
    }

    #[test]
    fn test_rolling_style_parse() {
        assert_eq!("date".parse::<RollingStyle>().unwrap(), RollingStyle::Date);
        assert_eq!(" SIZE ".parse::<RollingStyle>().unwrap(), RollingStyle::Size);
        assert!("hourly".parse::<RollingStyle>().is_err());
        assert!(RollingStyle::Composite.is_date_based());
        assert!(!RollingStyle::Size.is_date_based());
    }

    #[test]
    fn test_target_from_log_file() {
        let target =
            RetentionTarget::from_log_file(Path::new("/var/log/app/service.log"), RollingStyle::Date, 14)
                .unwrap();
        assert_eq!(target.directory, PathBuf::from("/var/log/app"));
        assert_eq!(target.filename_prefix, "service");

        let target = RetentionTarget::from_log_file(Path::new("service.log"), RollingStyle::Date, 14).unwrap();
        assert_eq!(target.directory, PathBuf::from("."));
    }

    #[test]
    fn test_without_runtime_stays_idle() {
        let sink = Arc::new(Sink::default());
        let scheduler = scheduler(Arc::new(FakeFs::new(Local::now(), &[])), vec![], sink.clone());
        scheduler.set_auto_clean_up(true);
        scheduler.start();
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(sink.errors(), 1);
    }

    #[tokio::test]
    async fn test_knob_changes_rearm() {
        let scheduler = scheduler(Arc::new(FakeFs::new(Local::now(), &[])), vec![], Arc::default());
        scheduler.start();
        assert_eq!(scheduler.state(), SchedulerState::Idle);

        scheduler.set_auto_clean_up(true);
        tokio::task::yield_now().await;
        assert_eq!(scheduler.state(), SchedulerState::Armed);
        let first = scheduler.next_fire().unwrap();

        scheduler.set_days_interval(3);
        tokio::task::yield_now().await;
        let second = scheduler.next_fire().unwrap();
        assert_eq!(second.date_naive(), first.date_naive() + Days::new(2));

        scheduler.stop();
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert!(scheduler.next_fire().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_is_not_overwritten_by_running_task() {
        let scheduler = scheduler(Arc::new(FakeFs::new(Local::now(), &[])), vec![], Arc::default());
        scheduler.start();

        for _ in 0..50 {
            scheduler.set_auto_clean_up(true);
            scheduler.stop();
            tokio::task::yield_now().await;
            assert_eq!(scheduler.state(), SchedulerState::Idle);
            assert!(scheduler.next_fire().is_none());
            scheduler.start();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_cleanup_pass() {
        let now = Local::now();
        let fs = Arc::new(FakeFs::new(now, &[400]));
        let fired = Arc::clone(&fs.fired);
        let scheduler = scheduler(fs.clone(), vec![target(RollingStyle::Date, 30)], Arc::default());

        scheduler.set_auto_clean_up(true);
        scheduler.start();

        tokio::time::timeout(Duration::from_secs(3 * 86_400), fired.notified())
            .await
            .unwrap();
        assert!(fs.listings.load(Ordering::SeqCst) >= 1);

        scheduler.stop();
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }
}
