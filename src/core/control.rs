//! The context object that ties the components together.

use crate::core::builder::LogControlBuilder;
use crate::core::coordinator::{ConfigReloadCoordinator, ReloadOutcome};
use crate::core::registry::SettingsRegistry;
use crate::core::settings::{
    ConfigChangeEvent, LiveSettings, SettingTargets, SettingValue, WellKnownSetting,
};
use crate::error::Result;
use crate::log_sink::LogSink;
use crate::notify::SubscriptionHandle;
use crate::retention::{CleanupReport, RetentionScheduler, SchedulerState};
use crate::sources::{FileSource, KeyValueSource};
use crate::verbosity::{Resolution, VerbosityResolver};
use std::path::PathBuf;
use std::sync::Arc;

/// Handle to a running logging-configuration control plane.
///
/// Built once at startup with [`LogControl::builder`] and passed to whatever
/// needs it. Dropping the handle, or calling [`shutdown`](Self::shutdown),
/// stops monitoring and cancels the retention timer.
///
/// # Examples
///
/// ```rust,no_run
/// use hotswap_verbosity::prelude::*;
///
/// # async fn example() -> Result<()> {
/// let control = LogControl::builder()
///     .with_file("config/logging.yaml")
///     .with_monitoring(true)
///     .build()
///     .await?;
///
/// if control.resolve(6).pass {
///     println!("verbose output enabled here");
/// }
///
/// let _sub = control.on_setting_changed(|event| {
///     println!("{} changed to {}", event.key, event.new_value);
/// });
/// # Ok(())
/// # }
/// ```
pub struct LogControl {
    pub(crate) registry: Arc<SettingsRegistry>,
    pub(crate) resolver: Arc<VerbosityResolver>,
    pub(crate) scheduler: Arc<RetentionScheduler>,
    pub(crate) coordinator: ConfigReloadCoordinator,
    pub(crate) targets: SettingTargets,
    pub(crate) sink: Arc<dyn LogSink>,
}

impl LogControl {
    /// Create a new builder.
    pub fn builder() -> LogControlBuilder {
        LogControlBuilder::new()
    }

    /// Decide whether a message at `requested` passes from the calling
    /// code path.
    pub fn resolve(&self, requested: i32) -> Resolution {
        self.resolver.resolve(requested)
    }

    /// Decide for an explicit `::`- or `.`-separated call path.
    pub fn resolve_at(&self, requested: i32, path: &str) -> Resolution {
        self.resolver.resolve_at(requested, path)
    }

    /// Emit `message` through the sink at debug severity if `level` passes
    /// for the calling code path. Returns whether it was emitted.
    pub fn debug(&self, level: i32, message: &str) -> bool {
        let pass = self.resolver.resolve(level).pass;
        if pass {
            self.sink.debug(message);
        }
        pass
    }

    /// Current values of every well-known setting.
    pub fn settings(&self) -> LiveSettings {
        self.targets.snapshot()
    }

    /// Raw values of every monitored key.
    pub fn registry(&self) -> &SettingsRegistry {
        &self.registry
    }

    /// The verbosity resolver.
    pub fn resolver(&self) -> &Arc<VerbosityResolver> {
        &self.resolver
    }

    /// The retention scheduler.
    pub fn scheduler(&self) -> &Arc<RetentionScheduler> {
        &self.scheduler
    }

    /// Set the global threshold.
    pub fn set_log_level(&self, level: i32) {
        self.set(WellKnownSetting::LogLevel, SettingValue::Int(i64::from(level)));
    }

    /// Open or close the verbosity gate.
    pub fn set_debug_enabled(&self, enabled: bool) {
        self.set(WellKnownSetting::DebugEnabled, SettingValue::Bool(enabled));
    }

    /// Enable or disable the retention timer.
    pub fn set_auto_clean_up(&self, enabled: bool) {
        self.set(WellKnownSetting::AutoCleanUpLogFiles, SettingValue::Bool(enabled));
    }

    /// Move the retention pass to `minutes` after midnight.
    pub fn set_minutes_after_midnight(&self, minutes: u32) {
        self.set(
            WellKnownSetting::MinutesAfterMidnight,
            SettingValue::Int(i64::from(minutes)),
        );
    }

    /// Run the retention pass every `days` days.
    pub fn set_days_interval(&self, days: u32) {
        self.set(WellKnownSetting::DaysInterval, SettingValue::Int(i64::from(days)));
    }

    fn set(&self, setting: WellKnownSetting, value: SettingValue) {
        if let Err(e) = self.targets.apply(setting, &value) {
            self.sink.error("could not apply setting", Some(&e));
        }
    }

    /// Switch to another source. See [`ConfigReloadCoordinator::set_source`].
    ///
    /// # Errors
    ///
    /// Returns an error if monitoring is on and the new source cannot be
    /// watched.
    pub async fn set_source<S: KeyValueSource + 'static>(&self, source: S) -> Result<()> {
        self.coordinator.set_source(Arc::new(source)).await
    }

    /// Switch to a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if monitoring is on and the file cannot be watched.
    pub async fn set_source_path(&self, path: impl Into<PathBuf>) -> Result<()> {
        self.set_source(FileSource::new(path)).await
    }

    /// Locator of the current source.
    pub fn source_locator(&self) -> Option<String> {
        self.coordinator.source_locator()
    }

    /// Turn change monitoring on or off.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::SourceNotSet`](crate::ControlError::SourceNotSet)
    /// when enabling without a source.
    pub async fn toggle_monitoring(&self, enabled: bool) -> Result<()> {
        self.coordinator.toggle_monitoring(enabled).await
    }

    /// Whether change monitoring is on.
    pub fn is_monitoring(&self) -> bool {
        self.coordinator.is_monitoring()
    }

    /// Load and apply the source now.
    pub async fn reload_now(&self) -> ReloadOutcome {
        self.coordinator.reload_now().await
    }

    /// Report an external change signal for the current source.
    pub async fn signal_change(&self) -> ReloadOutcome {
        self.coordinator.signal_change().await
    }

    /// Subscribe to per-key change events.
    pub fn on_setting_changed<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(&ConfigChangeEvent) + Send + Sync + 'static,
    {
        self.coordinator.on_setting_changed(callback)
    }

    /// Subscribe to source change signals.
    pub fn on_source_changed<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(&String) + Send + Sync + 'static,
    {
        self.coordinator.on_source_changed(callback)
    }

    /// Run a retention pass on the calling thread.
    pub fn trigger_cleanup_now(&self) -> CleanupReport {
        self.scheduler.trigger_cleanup_now()
    }

    /// Where the retention timer currently is.
    pub fn retention_state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    /// Stop monitoring and cancel the retention timer.
    pub fn shutdown(&self) {
        self.coordinator.shutdown();
        self.scheduler.stop();
    }
}

impl Drop for LogControl {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for LogControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogControl")
            .field("coordinator", &self.coordinator)
            .field("resolver", &self.resolver)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}
