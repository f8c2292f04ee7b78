//! Builder for constructing LogControl instances.

use crate::core::control::LogControl;
use crate::core::coordinator::{ConfigReloadCoordinator, ReloadOutcome};
use crate::core::loader::RetryPolicy;
use crate::core::registry::SettingsRegistry;
use crate::core::settings::{LiveSettings, SettingTargets, SettingValue, WellKnownSetting};
use crate::error::{ControlError, Result};
use crate::log_sink::{LogSink, TracingSink};
use crate::redact::{MaskRedactor, Redactor};
use crate::retention::{
    FileSystem, LocalFileSystem, RetentionScheduler, RetentionTarget, TargetProvider,
};
use crate::sources::{FileSource, KeyValueSource};
use crate::verbosity::{BacktraceFrames, FrameSource, VerbosityResolver};
use arc_swap::ArcSwap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_SETTLE: Duration = Duration::from_millis(100);

/// Builder for a [`LogControl`].
///
/// # Examples
///
/// ```rust,no_run
/// use hotswap_verbosity::prelude::*;
/// use std::time::Duration;
///
/// # async fn example() -> Result<()> {
/// let control = LogControl::builder()
///     .with_file("config/logging.yaml")
///     .with_retry(5, Duration::from_millis(500))
///     .with_excluded_scopes(["my_logging_facade"])
///     .with_secret_key("ApiToken")
///     .with_monitoring(true)
///     .with_retention(true)
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct LogControlBuilder {
    source: Option<Arc<dyn KeyValueSource>>,
    retry: RetryPolicy,
    settle: Duration,
    excluded_scopes: Vec<String>,
    secret_keys: Vec<String>,
    initial: LiveSettings,
    sink: Option<Arc<dyn LogSink>>,
    redactor: Option<Arc<dyn Redactor>>,
    frames: Option<Arc<dyn FrameSource>>,
    file_system: Option<Arc<dyn FileSystem>>,
    retention_targets: Vec<RetentionTarget>,
    monitor: bool,
    start_retention: bool,
}

impl LogControlBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            source: None,
            retry: RetryPolicy::default(),
            settle: DEFAULT_SETTLE,
            excluded_scopes: Vec::new(),
            secret_keys: Vec::new(),
            initial: LiveSettings::default(),
            sink: None,
            redactor: None,
            frames: None,
            file_system: None,
            retention_targets: Vec::new(),
            monitor: false,
            start_retention: false,
        }
    }

    /// Read settings from a YAML, TOML or JSON file.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = Some(Arc::new(FileSource::new(path)));
        self
    }

    /// Read settings from a custom source.
    pub fn with_source<S: KeyValueSource + 'static>(mut self, source: S) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Change how failed loads are retried. Defaults to 5 attempts 500 ms
    /// apart.
    pub fn with_retry(mut self, max_attempts: u32, delay: Duration) -> Self {
        self.retry = RetryPolicy::new(max_attempts, delay);
        self
    }

    /// How long the file watch waits for a burst of events to settle.
    pub fn with_settle_duration(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Scopes never considered part of a call path, in addition to the
    /// runtime and standard library scopes.
    pub fn with_excluded_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_scopes.extend(scopes.into_iter().map(Into::into));
        self
    }

    /// Treat `key` as secret in change events.
    pub fn with_secret_key(mut self, key: impl Into<String>) -> Self {
        self.secret_keys.push(key.into());
        self
    }

    /// Values in effect before the first load.
    pub fn with_initial_settings(mut self, settings: LiveSettings) -> Self {
        self.initial = settings;
        self
    }

    /// Where the crate reports its own anomalies. Defaults to [`TracingSink`].
    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// How secret values are masked. Defaults to [`MaskRedactor`].
    pub fn with_redactor<R: Redactor + 'static>(mut self, redactor: R) -> Self {
        self.redactor = Some(Arc::new(redactor));
        self
    }

    /// How call stacks are captured. Defaults to [`BacktraceFrames`].
    pub fn with_frame_source<F: FrameSource + 'static>(mut self, frames: F) -> Self {
        self.frames = Some(Arc::new(frames));
        self
    }

    /// File system used by the retention pass. Defaults to [`LocalFileSystem`].
    pub fn with_file_system<F: FileSystem + 'static>(mut self, fs: F) -> Self {
        self.file_system = Some(Arc::new(fs));
        self
    }

    /// An extra rolling log target to clean up, besides the one derived
    /// from `LogFile`.
    pub fn with_retention_target(mut self, target: RetentionTarget) -> Self {
        self.retention_targets.push(target);
        self
    }

    /// Start watching the source for changes once built.
    pub fn with_monitoring(mut self, enabled: bool) -> Self {
        self.monitor = enabled;
        self
    }

    /// Start the retention scheduler once built. The timer is armed only
    /// while `AutoCleanUpLogFiles` is on.
    pub fn with_retention(mut self, enabled: bool) -> Self {
        self.start_retention = enabled;
        self
    }

    /// Build the control plane and perform the initial load.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Monitoring is requested without a source
    /// - The source cannot be watched
    /// - The initial load fails after every retry
    pub async fn build(self) -> Result<LogControl> {
        let sink = self.sink.unwrap_or_else(|| Arc::new(TracingSink));
        let frames = self.frames.unwrap_or_else(|| Arc::new(BacktraceFrames));
        let fs = self.file_system.unwrap_or_else(|| Arc::new(LocalFileSystem));
        let redactor = self
            .redactor
            .unwrap_or_else(|| Arc::new(MaskRedactor::default()));

        let live = Arc::new(ArcSwap::from_pointee(self.initial.clone()));

        let resolver = Arc::new(
            VerbosityResolver::new(frames, Arc::clone(&sink))
                .with_excluded_scopes(&self.excluded_scopes),
        );
        resolver.set_threshold(self.initial.log_level);
        resolver.set_enabled(self.initial.debug_enabled);

        let scheduler = Arc::new(RetentionScheduler::new(
            fs,
            target_provider(Arc::clone(&live), self.retention_targets),
            Arc::clone(&sink),
        ));
        scheduler.set_minutes_after_midnight(self.initial.minutes_after_midnight);
        scheduler.set_days_interval(self.initial.days_interval);
        scheduler.set_auto_clean_up(self.initial.auto_clean_up_log_files);

        let targets = SettingTargets::new(live, Arc::clone(&resolver), Arc::clone(&scheduler));
        for (setting, text) in [
            (WellKnownSetting::DebugLevels, &self.initial.debug_levels),
            (WellKnownSetting::IgnoreList, &self.initial.ignore_list),
        ] {
            if let Err(e) = targets.apply(setting, &SettingValue::Text(text.clone())) {
                sink.error("initial setting ignored", Some(&e));
            }
        }

        let registry = Arc::new(SettingsRegistry::new());
        for key in &self.secret_keys {
            registry.mark_secret(key);
        }

        let coordinator = ConfigReloadCoordinator::new(
            Arc::clone(&registry),
            targets.clone(),
            redactor,
            Arc::clone(&sink),
            self.retry,
            self.settle,
        );

        let control = LogControl {
            registry,
            resolver,
            scheduler,
            coordinator,
            targets,
            sink,
        };

        match self.source {
            Some(source) => {
                let locator = source.locator();
                control.coordinator.set_source(source).await?;
                let outcome = if self.monitor {
                    control.coordinator.enable_monitoring().await?
                } else {
                    control.coordinator.reload_now().await
                };
                if outcome == ReloadOutcome::Failed {
                    return Err(ControlError::Load(format!(
                        "initial load of {} failed",
                        locator
                    )));
                }
            }
            None if self.monitor => return Err(ControlError::SourceNotSet),
            None => {}
        }

        if self.start_retention {
            control.scheduler.start();
        }
        Ok(control)
    }
}

impl Default for LogControlBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn target_provider(live: Arc<ArcSwap<LiveSettings>>, extra: Vec<RetentionTarget>) -> TargetProvider {
    Arc::new(move || {
        let settings = live.load();
        let mut targets = Vec::with_capacity(extra.len() + 1);
        if !settings.log_file.is_empty() {
            targets.extend(RetentionTarget::from_log_file(
                Path::new(&settings.log_file),
                settings.rolling_style,
                settings.max_backups,
            ));
        }
        targets.extend(extra.iter().cloned());
        targets
    })
}
