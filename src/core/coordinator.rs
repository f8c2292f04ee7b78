//! Keeps the live settings in step with a configuration source.

use crate::core::loader::{RetryPolicy, load_with_retry};
use crate::core::registry::SettingsRegistry;
use crate::core::settings::{
    ConfigChangeEvent, SettingTargets, WellKnownSetting, is_placeholder,
};
use crate::error::{ControlError, Result};
use crate::log_sink::LogSink;
use crate::notify::{SubscriberRegistry, SubscriptionHandle};
use crate::redact::{Redactor, looks_like_connection_string};
use crate::sources::KeyValueSource;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;

#[cfg(feature = "file-watch")]
use crate::notify::ConfigWatcher;

/// What a reload did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// The document was loaded and applied; `changes` events were emitted.
    Applied {
        /// Number of change events emitted
        changes: usize,
    },
    /// The change signal did not correspond to new content, or monitoring
    /// was off when it arrived.
    Debounced,
    /// Every attempt failed; the previous settings stay in effect.
    Failed,
}

struct WatchHandle {
    #[cfg(feature = "file-watch")]
    _watcher: ConfigWatcher,
    task: JoinHandle<()>,
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct Inner {
    source: RwLock<Option<Arc<dyn KeyValueSource>>>,
    reload_lock: tokio::sync::Mutex<()>,
    last_modified: Mutex<Option<SystemTime>>,
    monitoring: AtomicBool,
    watch: Mutex<Option<WatchHandle>>,
    retry: RetryPolicy,
    #[cfg_attr(not(feature = "file-watch"), allow(dead_code))]
    settle: Duration,
    registry: Arc<SettingsRegistry>,
    targets: SettingTargets,
    redactor: Arc<dyn Redactor>,
    sink: Arc<dyn LogSink>,
    setting_changed: SubscriberRegistry<ConfigChangeEvent>,
    source_changed: SubscriberRegistry<String>,
}

/// Owns the "watch a source, reload it" lifecycle.
///
/// Reloads are single-flight: the whole load-and-apply routine runs under an
/// async mutex, and a change signal is accepted only when the source's
/// modification time differs from the one recorded by the last successful
/// load. A document that still fails after every retry is reported once at
/// error level and the previous settings stay active.
pub struct ConfigReloadCoordinator {
    inner: Arc<Inner>,
}

impl ConfigReloadCoordinator {
    /// Create a coordinator with no source.
    pub fn new(
        registry: Arc<SettingsRegistry>,
        targets: SettingTargets,
        redactor: Arc<dyn Redactor>,
        sink: Arc<dyn LogSink>,
        retry: RetryPolicy,
        settle: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                source: RwLock::new(None),
                reload_lock: tokio::sync::Mutex::new(()),
                last_modified: Mutex::new(None),
                monitoring: AtomicBool::new(false),
                watch: Mutex::new(None),
                retry,
                settle,
                registry,
                targets,
                redactor,
                sink,
                setting_changed: SubscriberRegistry::new(),
                source_changed: SubscriberRegistry::new(),
            }),
        }
    }

    /// Point the coordinator at `source`.
    ///
    /// A source with the same locator as the current one is ignored. When
    /// monitoring is on, the old watch is torn down, a new one is armed and
    /// the new source is loaded immediately.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Watch`] if monitoring is on and the new watch
    /// cannot be armed. Monitoring is switched off in that case.
    pub async fn set_source(&self, source: Arc<dyn KeyValueSource>) -> Result<()> {
        let locator = source.locator();
        if self.source_locator().as_deref() == Some(locator.as_str()) {
            return Ok(());
        }

        self.inner.watch.lock().take();
        {
            let _guard = self.inner.reload_lock.lock().await;
            *self.inner.source.write() = Some(source);
            *self.inner.last_modified.lock() = None;
        }
        self.inner.sink.info(&format!("configuration source set to {}", locator));

        if self.is_monitoring() {
            if let Err(e) = self.inner.arm_watch() {
                self.inner.monitoring.store(false, Ordering::SeqCst);
                self.inner.sink.error("could not watch configuration source", Some(&e));
                return Err(e);
            }
            self.reload_now().await;
        }
        Ok(())
    }

    /// Locator of the current source.
    pub fn source_locator(&self) -> Option<String> {
        self.inner.source.read().as_ref().map(|s| s.locator())
    }

    /// Whether change signals are being acted on.
    pub fn is_monitoring(&self) -> bool {
        self.inner.monitoring.load(Ordering::SeqCst)
    }

    /// Turn monitoring on or off.
    ///
    /// Enabling arms the change watch and loads the source immediately.
    /// Disabling tears the watch down and waits for any in-flight reload to
    /// finish, so no reload runs after this returns. The last loaded values
    /// stay in effect.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::SourceNotSet`] when enabling without a source,
    /// or [`ControlError::Watch`] if the watch cannot be armed.
    pub async fn toggle_monitoring(&self, enabled: bool) -> Result<()> {
        if !enabled {
            self.inner.monitoring.store(false, Ordering::SeqCst);
            self.inner.watch.lock().take();
            let _guard = self.inner.reload_lock.lock().await;
            self.inner.sink.info("configuration monitoring stopped");
            return Ok(());
        }

        self.enable_monitoring().await.map(|_| ())
    }

    /// Arm the watch and load immediately, returning what the load did.
    /// Already monitoring yields [`ReloadOutcome::Debounced`].
    pub(crate) async fn enable_monitoring(&self) -> Result<ReloadOutcome> {
        if self.inner.source.read().is_none() {
            return Err(ControlError::SourceNotSet);
        }
        if self.inner.monitoring.swap(true, Ordering::SeqCst) {
            return Ok(ReloadOutcome::Debounced);
        }

        if let Err(e) = self.inner.arm_watch() {
            self.inner.monitoring.store(false, Ordering::SeqCst);
            return Err(e);
        }
        self.inner.sink.info("configuration monitoring started");
        Ok(self.reload_now().await)
    }

    /// Load the source now, with retries, and apply it.
    ///
    /// Never fails: a missing source or a document that cannot be read after
    /// every attempt is reported through the sink and yields
    /// [`ReloadOutcome::Failed`].
    pub async fn reload_now(&self) -> ReloadOutcome {
        let _guard = self.inner.reload_lock.lock().await;
        self.inner.reload_locked().await
    }

    /// Report that the source may have changed.
    ///
    /// This is what the file watch calls; hosts whose sources have no
    /// watchable path call it from their own change mechanism. The signal is
    /// ignored unless monitoring is on and the source's modification time
    /// moved since the last successful load.
    pub async fn signal_change(&self) -> ReloadOutcome {
        self.inner.handle_change().await
    }

    /// Subscribe to per-key change events.
    pub fn on_setting_changed<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(&ConfigChangeEvent) + Send + Sync + 'static,
    {
        self.inner.setting_changed.subscribe(callback)
    }

    /// Subscribe to accepted source change signals. The callback receives
    /// the source locator.
    pub fn on_source_changed<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(&String) + Send + Sync + 'static,
    {
        self.inner.source_changed.subscribe(callback)
    }

    /// Stop monitoring without waiting for an in-flight reload.
    pub fn shutdown(&self) {
        self.inner.monitoring.store(false, Ordering::SeqCst);
        self.inner.watch.lock().take();
    }
}

impl Drop for ConfigReloadCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ConfigReloadCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigReloadCoordinator")
            .field("source", &self.source_locator())
            .field("monitoring", &self.is_monitoring())
            .field("retry", &self.inner.retry)
            .finish()
    }
}

impl Inner {
    #[cfg(feature = "file-watch")]
    fn arm_watch(self: &Arc<Self>) -> Result<()> {
        let path = match self.source.read().as_ref().and_then(|s| s.watch_path()) {
            Some(path) => path,
            None => {
                self.sink
                    .debug("configuration source has no watchable path; relying on signal_change");
                return Ok(());
            }
        };

        let (watcher, mut rx) = ConfigWatcher::new(&path, self.settle)?;
        let weak = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            while rx.recv().await.is_some() {
                let Some(inner) = weak.upgrade() else { break };
                inner.handle_change().await;
            }
        });

        *self.watch.lock() = Some(WatchHandle {
            _watcher: watcher,
            task,
        });
        Ok(())
    }

    #[cfg(not(feature = "file-watch"))]
    fn arm_watch(self: &Arc<Self>) -> Result<()> {
        self.sink.warn(
            "built without file watching; call signal_change to pick up edits",
            None,
        );
        Ok(())
    }

    async fn handle_change(&self) -> ReloadOutcome {
        let _guard = self.reload_lock.lock().await;
        if !self.monitoring.load(Ordering::SeqCst) {
            return ReloadOutcome::Debounced;
        }

        let Some(source) = self.source.read().clone() else {
            return ReloadOutcome::Debounced;
        };
        let modified = source.modified();
        if modified.is_some() && modified == *self.last_modified.lock() {
            self.sink
                .debug("change signal ignored: modification time unchanged");
            return ReloadOutcome::Debounced;
        }

        let outcome = self.reload_locked().await;
        if matches!(outcome, ReloadOutcome::Applied { .. }) {
            self.source_changed.notify(&source.locator());
        }
        outcome
    }

    async fn reload_locked(&self) -> ReloadOutcome {
        let Some(source) = self.source.read().clone() else {
            self.sink
                .error("reload requested without a source", Some(&ControlError::SourceNotSet));
            return ReloadOutcome::Failed;
        };

        let modified = source.modified();
        match load_with_retry(&source, self.retry, &*self.sink).await {
            Ok(entries) => {
                *self.last_modified.lock() = modified;
                let changes = self.apply(&entries);
                self.sink.debug(&format!(
                    "applied {} ({} keys, {} changed)",
                    source.locator(),
                    entries.len(),
                    changes
                ));
                ReloadOutcome::Applied { changes }
            }
            Err(e) => {
                self.sink
                    .error("configuration reload failed; keeping previous settings", Some(&e));
                ReloadOutcome::Failed
            }
        }
    }

    fn apply(&self, entries: &[(String, String)]) -> usize {
        let mut changes = 0;
        for (key, raw) in entries {
            if is_placeholder(raw) {
                let err = ControlError::Placeholder {
                    key: key.clone(),
                    value: raw.clone(),
                };
                self.sink.error("skipping setting", Some(&err));
                continue;
            }

            let secret = self.registry.is_secret(key) || looks_like_connection_string(raw);
            let event = match WellKnownSetting::from_key(key) {
                Some(setting) => self.apply_well_known(setting, key, raw, secret),
                None => self.apply_raw(key, raw, secret),
            };

            if let Some(event) = event {
                self.setting_changed.notify(&event);
                changes += 1;
            }
        }
        changes
    }

    fn apply_well_known(
        &self,
        setting: WellKnownSetting,
        key: &str,
        raw: &str,
        secret: bool,
    ) -> Option<ConfigChangeEvent> {
        let parsed = match setting.parse(key, raw) {
            Ok(value) => value,
            Err(e) => {
                self.sink.error("ignoring setting", Some(&e));
                return None;
            }
        };
        let value = setting.normalize(parsed.clone());
        if value != parsed {
            self.sink
                .warn(&format!("{} {} adjusted to {}", key, parsed, value), None);
        }

        let current = self.targets.current(setting);
        let upsert = self.registry.upsert(key, raw);
        if value == current {
            return None;
        }

        if let Err(e) = self.targets.apply(setting, &value) {
            self.sink.error("could not apply setting", Some(&e));
            return None;
        }
        Some(self.event(key, &current.to_string(), raw, upsert.existed, secret))
    }

    fn apply_raw(&self, key: &str, raw: &str, secret: bool) -> Option<ConfigChangeEvent> {
        let upsert = self.registry.upsert(key, raw);
        if !(upsert.changed && upsert.existed) {
            return None;
        }
        Some(self.event(key, &upsert.previous, raw, true, secret))
    }

    fn event(
        &self,
        key: &str,
        previous: &str,
        new: &str,
        existed_before: bool,
        is_secret: bool,
    ) -> ConfigChangeEvent {
        let (previous_value, new_value) = if is_secret {
            (
                self.redactor.redact(key, previous),
                self.redactor.redact(key, new),
            )
        } else {
            (previous.to_string(), new.to_string())
        };

        ConfigChangeEvent {
            key: key.to_string(),
            previous_value,
            new_value,
            existed_before,
            is_secret,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::settings::LiveSettings;
    use crate::log_sink::Severity;
    use crate::redact::MaskRedactor;
    use crate::retention::{LocalFileSystem, RetentionScheduler};
    use crate::verbosity::{StaticFrames, VerbosityResolver};
    use arc_swap::ArcSwap;
    use std::sync::atomic::AtomicU32;

    #[derive(Default)]
    struct Sink(Mutex<Vec<(Severity, String)>>);

    impl LogSink for Sink {
        fn log(
            &self,
            severity: Severity,
            message: &str,
            error: Option<&(dyn std::error::Error + 'static)>,
        ) {
            let text = match error {
                Some(e) => format!("{}: {}", message, e),
                None => message.to_string(),
            };
            self.0.lock().push((severity, text));
        }
    }

    impl Sink {
        fn errors(&self) -> Vec<String> {
            self.0
                .lock()
                .iter()
                .filter(|(s, _)| *s == Severity::Error)
                .map(|(_, m)| m.clone())
                .collect()
        }
    }

    struct MemorySource {
        name: String,
        entries: Mutex<Vec<(String, String)>>,
        modified: Mutex<Option<SystemTime>>,
        failures_left: AtomicU32,
    }

    impl MemorySource {
        fn new(name: &str, entries: &[(&str, &str)]) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                entries: Mutex::new(
                    entries
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                ),
                modified: Mutex::new(Some(SystemTime::UNIX_EPOCH)),
                failures_left: AtomicU32::new(0),
            })
        }

        fn set(&self, entries: &[(&str, &str)]) {
            *self.entries.lock() = entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
        }

        fn touch(&self) {
            let mut modified = self.modified.lock();
            *modified = modified.map(|t| t + Duration::from_secs(1));
        }

        fn fail_next(&self, times: u32) {
            self.failures_left.store(times, Ordering::SeqCst);
        }
    }

    impl KeyValueSource for MemorySource {
        fn load(&self) -> Result<Vec<(String, String)>> {
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(ControlError::Load("truncated document".to_string()));
            }
            Ok(self.entries.lock().clone())
        }

        fn locator(&self) -> String {
            format!("memory:{}", self.name)
        }

        fn modified(&self) -> Option<SystemTime> {
            *self.modified.lock()
        }
    }

    struct Harness {
        coordinator: ConfigReloadCoordinator,
        targets: SettingTargets,
        registry: Arc<SettingsRegistry>,
        sink: Arc<Sink>,
        events: Arc<Mutex<Vec<ConfigChangeEvent>>>,
        _subscription: SubscriptionHandle,
    }

    fn harness() -> Harness {
        let sink = Arc::new(Sink::default());
        let resolver = Arc::new(VerbosityResolver::new(
            Arc::new(StaticFrames::from_path("X.Foo.Bar.Baz")),
            sink.clone(),
        ));
        let scheduler = Arc::new(RetentionScheduler::new(
            Arc::new(LocalFileSystem),
            Arc::new(Vec::new),
            sink.clone(),
        ));
        let targets = SettingTargets::new(
            Arc::new(ArcSwap::from_pointee(LiveSettings::default())),
            resolver,
            scheduler,
        );
        let registry = Arc::new(SettingsRegistry::new());
        let coordinator = ConfigReloadCoordinator::new(
            registry.clone(),
            targets.clone(),
            Arc::new(MaskRedactor::default()),
            sink.clone(),
            RetryPolicy::default(),
            Duration::from_millis(50),
        );

        let events = Arc::new(Mutex::new(Vec::new()));
        let collected = events.clone();
        let subscription =
            coordinator.on_setting_changed(move |e: &ConfigChangeEvent| collected.lock().push(e.clone()));

        Harness {
            coordinator,
            targets,
            registry,
            sink,
            events,
            _subscription: subscription,
        }
    }

    #[tokio::test]
    async fn test_reload_applies_and_resolves() {
        let h = harness();
        let source = MemorySource::new("app", &[("LogLevel", "5"), ("DebugLevels", "Foo.Bar:8")]);
        h.coordinator.set_source(source).await.unwrap();

        assert_eq!(h.coordinator.reload_now().await, ReloadOutcome::Applied { changes: 2 });

        let resolution = h.targets.resolver.resolve(6);
        assert!(resolution.pass);
        assert_eq!(resolution.matched_level, 8);
        assert!(!h.targets.resolver.resolve_at(6, "Other.Path").pass);
    }

    #[tokio::test]
    async fn test_unchanged_reload_emits_nothing() {
        let h = harness();
        let source = MemorySource::new("app", &[("LogLevel", "5"), ("Custom.Key", "a")]);
        h.coordinator.set_source(source).await.unwrap();

        h.coordinator.reload_now().await;
        assert_eq!(h.events.lock().len(), 1);

        assert_eq!(h.coordinator.reload_now().await, ReloadOutcome::Applied { changes: 0 });
        assert_eq!(h.events.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_keys_are_seeded_silently() {
        let h = harness();
        let source = MemorySource::new("app", &[("Feature.Flag", "off")]);
        h.coordinator.set_source(source.clone()).await.unwrap();

        h.coordinator.reload_now().await;
        assert!(h.events.lock().is_empty());
        assert_eq!(h.registry.get("Feature.Flag").as_deref(), Some("off"));

        source.set(&[("Feature.Flag", "on")]);
        h.coordinator.reload_now().await;

        let events = h.events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].previous_value, "off");
        assert_eq!(events[0].new_value, "on");
        assert!(events[0].existed_before);
    }

    #[tokio::test]
    async fn test_semantically_equal_values_do_not_fire() {
        let h = harness();
        let source = MemorySource::new("app", &[("DebugEnabled", "1")]);
        h.coordinator.set_source(source.clone()).await.unwrap();

        h.coordinator.reload_now().await;
        assert!(h.events.lock().is_empty());

        source.set(&[("DebugEnabled", "true")]);
        h.coordinator.reload_now().await;
        assert!(h.events.lock().is_empty());

        source.set(&[("DebugEnabled", "off")]);
        h.coordinator.reload_now().await;
        assert_eq!(h.events.lock().len(), 1);
        assert!(!h.targets.resolver.is_enabled());
    }

    #[tokio::test]
    async fn test_placeholder_is_skipped() {
        let h = harness();
        let source = MemorySource::new("app", &[("LogFile", "/var/log/app.log")]);
        h.coordinator.set_source(source.clone()).await.unwrap();
        h.coordinator.reload_now().await;

        source.set(&[("LogFile", "%LOGDIR%/app.log")]);
        h.coordinator.reload_now().await;

        assert_eq!(h.targets.snapshot().log_file, "/var/log/app.log");
        assert_eq!(h.registry.get("LogFile").as_deref(), Some("/var/log/app.log"));
        let errors = h.sink.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("placeholder"));
    }

    #[tokio::test]
    async fn test_invalid_value_keeps_previous() {
        let h = harness();
        let source = MemorySource::new("app", &[("LogLevel", "4"), ("DebugLevels", "Foo:x")]);
        h.coordinator.set_source(source).await.unwrap();

        assert_eq!(h.coordinator.reload_now().await, ReloadOutcome::Applied { changes: 1 });
        assert_eq!(h.targets.resolver.threshold(), 4);
        assert!(h.targets.resolver.overrides().is_empty());
        assert_eq!(h.sink.errors().len(), 1);
    }

    #[tokio::test]
    async fn test_secret_values_are_redacted() {
        let h = harness();
        let source = MemorySource::new("app", &[("Database", "Server=db1;Password=hunter2")]);
        h.coordinator.set_source(source.clone()).await.unwrap();
        h.coordinator.reload_now().await;

        source.set(&[("Database", "Server=db2;Password=hunter3")]);
        h.coordinator.reload_now().await;

        let events = h.events.lock();
        assert_eq!(events.len(), 1);
        assert!(events[0].is_secret);
        assert_eq!(events[0].previous_value, "Server=db1;Password=*****");
        assert_eq!(events[0].new_value, "Server=db2;Password=*****");
    }

    #[tokio::test(start_paused = true)]
    async fn test_four_failures_then_success() {
        let h = harness();
        let source = MemorySource::new("app", &[("LogLevel", "5")]);
        source.fail_next(4);
        h.coordinator.set_source(source).await.unwrap();

        assert_eq!(h.coordinator.reload_now().await, ReloadOutcome::Applied { changes: 1 });
        assert_eq!(h.targets.resolver.threshold(), 5);
        assert!(h.sink.errors().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_five_failures_report_once_and_keep_settings() {
        let h = harness();
        let source = MemorySource::new("app", &[("LogLevel", "5")]);
        h.coordinator.set_source(source.clone()).await.unwrap();
        h.coordinator.reload_now().await;

        source.set(&[("LogLevel", "9")]);
        source.fail_next(5);
        assert_eq!(h.coordinator.reload_now().await, ReloadOutcome::Failed);

        assert_eq!(h.targets.resolver.threshold(), 5);
        let errors = h.sink.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("after 5 attempts"));
    }

    #[tokio::test]
    async fn test_toggle_without_source() {
        let h = harness();
        let result = h.coordinator.toggle_monitoring(true).await;
        assert!(matches!(result, Err(ControlError::SourceNotSet)));
        assert!(!h.coordinator.is_monitoring());
    }

    #[tokio::test]
    async fn test_change_signal_is_debounced() {
        let h = harness();
        let source = MemorySource::new("app", &[("LogLevel", "2")]);
        h.coordinator.set_source(source.clone()).await.unwrap();
        h.coordinator.toggle_monitoring(true).await.unwrap();
        assert_eq!(h.targets.resolver.threshold(), 2);

        let notified = Arc::new(Mutex::new(Vec::new()));
        let seen = notified.clone();
        let _sub = h
            .coordinator
            .on_source_changed(move |locator: &String| seen.lock().push(locator.clone()));

        source.set(&[("LogLevel", "3")]);
        assert_eq!(h.coordinator.signal_change().await, ReloadOutcome::Debounced);
        assert_eq!(h.targets.resolver.threshold(), 2);

        source.touch();
        assert_eq!(
            h.coordinator.signal_change().await,
            ReloadOutcome::Applied { changes: 1 }
        );
        assert_eq!(h.targets.resolver.threshold(), 3);
        assert_eq!(*notified.lock(), vec!["memory:app".to_string()]);
    }

    #[tokio::test]
    async fn test_no_reload_after_monitoring_off() {
        let h = harness();
        let source = MemorySource::new("app", &[("LogLevel", "2")]);
        h.coordinator.set_source(source.clone()).await.unwrap();
        h.coordinator.toggle_monitoring(true).await.unwrap();
        h.coordinator.toggle_monitoring(false).await.unwrap();

        source.set(&[("LogLevel", "7")]);
        source.touch();
        assert_eq!(h.coordinator.signal_change().await, ReloadOutcome::Debounced);
        assert_eq!(h.targets.resolver.threshold(), 2);
    }

    #[tokio::test]
    async fn test_set_source_switches_and_reloads() {
        let h = harness();
        let first = MemorySource::new("first", &[("LogLevel", "2")]);
        h.coordinator.set_source(first.clone()).await.unwrap();
        h.coordinator.toggle_monitoring(true).await.unwrap();

        h.coordinator.set_source(first).await.unwrap();
        assert_eq!(h.events.lock().len(), 1);

        let second = MemorySource::new("second", &[("LogLevel", "6")]);
        h.coordinator.set_source(second).await.unwrap();
        assert_eq!(h.coordinator.source_locator().as_deref(), Some("memory:second"));
        assert_eq!(h.targets.resolver.threshold(), 6);
    }

    #[tokio::test]
    async fn test_clamped_knobs_settle_after_first_reload() {
        let h = harness();
        let source = MemorySource::new(
            "app",
            &[("DaysInterval", "0"), ("MinutesAfterMidnight", "5000")],
        );
        h.coordinator.set_source(source).await.unwrap();

        for _ in 0..3 {
            h.coordinator.reload_now().await;
        }

        let events = h.events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].key, "MinutesAfterMidnight");
        assert_eq!(events[0].previous_value, "60");
        assert_eq!(h.targets.scheduler.days_interval(), 1);
        assert_eq!(h.targets.scheduler.minutes_after_midnight(), 1439);
    }

    struct SlowSource {
        active: AtomicU32,
        peak: AtomicU32,
        loads: AtomicU32,
        modified: Mutex<SystemTime>,
    }

    impl KeyValueSource for SlowSource {
        fn load(&self) -> Result<Vec<(String, String)>> {
            let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now_active, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(30));
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(vec![("LogLevel".to_string(), "4".to_string())])
        }

        fn locator(&self) -> String {
            "memory:slow".to_string()
        }

        fn modified(&self) -> Option<SystemTime> {
            Some(*self.modified.lock())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_reloads_never_overlap() {
        let h = harness();
        let source = Arc::new(SlowSource {
            active: AtomicU32::new(0),
            peak: AtomicU32::new(0),
            loads: AtomicU32::new(0),
            modified: Mutex::new(SystemTime::UNIX_EPOCH),
        });
        h.coordinator.set_source(source.clone()).await.unwrap();
        h.coordinator.toggle_monitoring(true).await.unwrap();
        *source.modified.lock() += Duration::from_secs(1);

        let (first, signalled, second) = tokio::join!(
            h.coordinator.reload_now(),
            h.coordinator.signal_change(),
            h.coordinator.reload_now(),
        );

        assert!(matches!(first, ReloadOutcome::Applied { .. }));
        assert!(matches!(second, ReloadOutcome::Applied { .. }));
        assert_ne!(signalled, ReloadOutcome::Failed);
        assert_eq!(source.peak.load(Ordering::SeqCst), 1);
        assert!(source.loads.load(Ordering::SeqCst) >= 3);
    }
}
