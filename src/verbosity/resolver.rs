//! Per-call verbosity decisions.

use crate::error::ControlError;
use crate::log_sink::LogSink;
use crate::verbosity::callpath::{
    normalize, normalize_scopes, BacktraceFrames, FrameSource, DEFAULT_EXCLUDED_SCOPES,
};
use crate::verbosity::overrides::OverrideTable;
use arc_swap::ArcSwap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Result of a single verbosity resolution.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Resolution {
    /// Whether the message should be emitted
    pub pass: bool,
    /// Pattern of the override that applied, `*` for the fallback
    pub matched_pattern: Option<String>,
    /// Level of the override that applied, 0 when none did
    pub matched_level: i32,
}

impl Resolution {
    fn deny() -> Self {
        Self::default()
    }

    fn global(threshold: i32, requested: i32) -> Self {
        Self {
            pass: threshold >= requested,
            ..Self::default()
        }
    }
}

/// Everything a resolution reads, published as one immutable snapshot.
#[derive(Debug, Clone)]
struct VerbosityState {
    enabled: bool,
    threshold: i32,
    overrides: Arc<OverrideTable>,
    excluded: Arc<Vec<String>>,
}

/// Decides whether a log call at a given level passes.
///
/// Reads are lock-free: the global threshold, the enablement gate, the
/// override table and the excluded scopes live in one snapshot that writers
/// replace as a whole.
///
/// # Examples
///
/// ```rust
/// use hotswap_verbosity::verbosity::{OverrideTable, StaticFrames, VerbosityResolver};
/// use hotswap_verbosity::TracingSink;
/// use std::sync::Arc;
///
/// let resolver = VerbosityResolver::new(
///     Arc::new(StaticFrames::from_path("Billing.Invoice.Render")),
///     Arc::new(TracingSink),
/// );
/// resolver.set_threshold(2);
/// resolver.replace_overrides(OverrideTable::parse("Invoice*:9").unwrap());
///
/// // Prefix patterns compare against the start of the whole path.
/// assert!(!resolver.resolve(5).pass);
///
/// resolver.replace_overrides(OverrideTable::parse("*Invoice*:9").unwrap());
/// let resolution = resolver.resolve(5);
/// assert!(resolution.pass);
/// assert_eq!(resolution.matched_level, 9);
/// ```
pub struct VerbosityResolver {
    state: ArcSwap<VerbosityState>,
    base_excluded: Vec<String>,
    frames: Arc<dyn FrameSource>,
    sink: Arc<dyn LogSink>,
}

impl VerbosityResolver {
    /// Create a resolver with the default excluded scopes.
    ///
    /// Starts enabled, with a threshold of 0 and no overrides.
    pub fn new(frames: Arc<dyn FrameSource>, sink: Arc<dyn LogSink>) -> Self {
        let base_excluded = normalize_scopes(DEFAULT_EXCLUDED_SCOPES);
        Self {
            state: ArcSwap::from_pointee(VerbosityState {
                enabled: true,
                threshold: 0,
                overrides: Arc::new(OverrideTable::empty()),
                excluded: Arc::new(base_excluded.clone()),
            }),
            base_excluded,
            frames,
            sink,
        }
    }

    /// Create a resolver that walks the real call stack.
    pub fn with_backtrace(sink: Arc<dyn LogSink>) -> Self {
        Self::new(Arc::new(BacktraceFrames), sink)
    }

    /// Add scopes that are always excluded, on top of the defaults.
    pub fn with_excluded_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.base_excluded.extend(normalize_scopes(scopes));
        let excluded = Arc::new(self.base_excluded.clone());
        self.state.rcu(|state| VerbosityState {
            excluded: Arc::clone(&excluded),
            ..(**state).clone()
        });
        self
    }

    /// Resolve `requested` against the current call stack.
    pub fn resolve(&self, requested: i32) -> Resolution {
        let state = self.state.load();
        if !state.enabled {
            return Resolution::deny();
        }
        if state.overrides.is_empty() {
            return Resolution::global(state.threshold, requested);
        }

        let walked = catch_unwind(AssertUnwindSafe(|| {
            self.frames
                .capture()
                .map(|frames| normalize(&frames, &state.excluded))
        }));

        match walked {
            Ok(Ok(path)) => decide(&state, &path, requested),
            Ok(Err(err)) => self.report(err),
            Err(panic) => self.report(ControlError::Resolution(panic_message(&panic))),
        }
    }

    /// Resolve `requested` for an explicit path such as `module_path!()`.
    pub fn resolve_at(&self, requested: i32, path: &str) -> Resolution {
        let state = self.state.load();
        if !state.enabled {
            return Resolution::deny();
        }
        if state.overrides.is_empty() {
            return Resolution::global(state.threshold, requested);
        }

        let path = path.replace("::", ".").to_lowercase();
        match catch_unwind(AssertUnwindSafe(|| decide(&state, &path, requested))) {
            Ok(resolution) => resolution,
            Err(panic) => self.report(ControlError::Resolution(panic_message(&panic))),
        }
    }

    fn report(&self, err: ControlError) -> Resolution {
        self.sink.error("verbosity resolution failed, denying", Some(&err));
        Resolution::deny()
    }

    /// The global threshold.
    pub fn threshold(&self) -> i32 {
        self.state.load().threshold
    }

    /// Replace the global threshold.
    pub fn set_threshold(&self, threshold: i32) {
        self.state.rcu(|state| VerbosityState {
            threshold,
            ..(**state).clone()
        });
    }

    /// Whether the enablement gate is open.
    pub fn is_enabled(&self) -> bool {
        self.state.load().enabled
    }

    /// Open or close the enablement gate.
    pub fn set_enabled(&self, enabled: bool) {
        self.state.rcu(|state| VerbosityState {
            enabled,
            ..(**state).clone()
        });
    }

    /// The current override table.
    pub fn overrides(&self) -> Arc<OverrideTable> {
        Arc::clone(&self.state.load().overrides)
    }

    /// Atomically publish a new override table.
    pub fn replace_overrides(&self, table: OverrideTable) {
        let table = Arc::new(table);
        self.state.rcu(|state| VerbosityState {
            overrides: Arc::clone(&table),
            ..(**state).clone()
        });
    }

    /// Replace the extra excluded scopes that come from configuration.
    ///
    /// The built-in and builder-supplied scopes always stay excluded.
    pub fn set_ignored_scopes<I, S>(&self, scopes: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut excluded = self.base_excluded.clone();
        excluded.extend(normalize_scopes(scopes));
        let excluded = Arc::new(excluded);
        self.state.rcu(|state| VerbosityState {
            excluded: Arc::clone(&excluded),
            ..(**state).clone()
        });
    }
}

impl std::fmt::Debug for VerbosityResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.load();
        f.debug_struct("VerbosityResolver")
            .field("enabled", &state.enabled)
            .field("threshold", &state.threshold)
            .field("overrides", &state.overrides.to_string())
            .finish()
    }
}

fn decide(state: &VerbosityState, path: &str, requested: i32) -> Resolution {
    let (matched_pattern, matched_level) = match state.overrides.find_match(path) {
        Some(hit) => (Some(hit.pattern().to_string()), hit.level()),
        None => match state.overrides.fallback() {
            Some(level) => (Some("*".to_string()), level),
            None => (None, 0),
        },
    };

    Resolution {
        pass: passes(state.threshold, matched_level, requested),
        matched_pattern,
        matched_level,
    }
}

/// The decision rule.
///
/// A zero override defers to the global threshold and a negative one always
/// denies. A positive override caps the path only while the global threshold
/// is below it; once the global threshold reaches it, the global comparison
/// applies again.
pub(crate) fn passes(threshold: i32, override_level: i32, requested: i32) -> bool {
    match override_level {
        0 => threshold >= requested,
        l if l < 0 => false,
        l if threshold >= l => threshold >= requested,
        l => l >= requested,
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic while resolving call path".to_string()
    }
}
