//! Well-known settings: typed parsers, live values and update actions.

use crate::error::{ControlError, Result};
use crate::retention::{
    RetentionScheduler, RollingStyle, clamp_days_interval, clamp_minutes_after_midnight,
};
use crate::verbosity::{OverrideTable, VerbosityResolver};
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

const FLOAT_EPSILON: f64 = 1e-9;

/// Snapshot of every well-known setting.
///
/// Values owned by the resolver (threshold, gate, overrides, ignore list) and
/// by the retention scheduler (timer knobs) are read back from those
/// components when a snapshot is taken, so the snapshot never disagrees with
/// what is actually in effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveSettings {
    /// Path of the active log file
    pub log_file: String,
    /// Global verbosity threshold
    pub log_level: i32,
    /// Verbosity enablement gate
    pub debug_enabled: bool,
    /// SQL statements slower than this many seconds are reported
    pub sql_timing_threshold: f64,
    /// Functions slower than this many seconds are reported
    pub max_function_time: f64,
    /// Textual form of the override table
    pub debug_levels: String,
    /// `;`-separated scopes skipped during call-path walks
    pub ignore_list: String,
    /// Mirror log output to the console
    pub log_to_console: bool,
    /// Mirror log output to an attached debugger
    pub log_to_debug_window: bool,
    /// Seconds added to operation timeouts
    pub timeout_increment: i64,
    /// Threshold for SQL trace output
    pub sql_print_level: i32,
    /// Threshold for HTTP trace output
    pub http_print_level: i32,
    /// Threshold for cache trace output
    pub cache_print_level: i32,
    /// Whether the retention timer runs
    pub auto_clean_up_log_files: bool,
    /// Time of day of the retention pass
    pub minutes_after_midnight: u32,
    /// Days between retention passes
    pub days_interval: u32,
    /// Days of rolled log files to keep
    pub max_backups: u32,
    /// Rotation policy of the log file
    pub rolling_style: RollingStyle,
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self {
            log_file: String::new(),
            log_level: 0,
            debug_enabled: true,
            sql_timing_threshold: 0.0,
            max_function_time: 0.0,
            debug_levels: String::new(),
            ignore_list: String::new(),
            log_to_console: false,
            log_to_debug_window: false,
            timeout_increment: 0,
            sql_print_level: 0,
            http_print_level: 0,
            cache_print_level: 0,
            auto_clean_up_log_files: false,
            minutes_after_midnight: 60,
            days_interval: 1,
            max_backups: 30,
            rolling_style: RollingStyle::Date,
        }
    }
}

/// A parsed setting value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SettingValue {
    /// Integer
    Int(i64),
    /// Boolean
    Bool(bool),
    /// Floating point
    Float(f64),
    /// Free text
    Text(String),
    /// Rotation policy
    Rolling(RollingStyle),
}

impl PartialEq for SettingValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => (a - b).abs() < FLOAT_EPSILON,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Rolling(a), Self::Rolling(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Bool(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Text(v) => f.write_str(v),
            Self::Rolling(v) => write!(f, "{}", v),
        }
    }
}

/// The value type a well-known setting parses into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    /// Signed 32-bit integer
    Int,
    /// Signed 64-bit integer
    Long,
    /// Non-negative 32-bit integer
    Count,
    /// Boolean
    Bool,
    /// Floating point
    Float,
    /// Free text
    Text,
    /// Override table text
    Overrides,
    /// Rotation policy
    Rolling,
}

impl ValueType {
    fn expected(self) -> &'static str {
        match self {
            Self::Int => "an integer",
            Self::Long => "an integer",
            Self::Count => "a non-negative integer",
            Self::Bool => "a boolean",
            Self::Float => "a number",
            Self::Text => "text",
            Self::Overrides => "name:level pairs separated by ';'",
            Self::Rolling => "Date, Size or Composite",
        }
    }
}

/// The fixed dispatch table of settings with typed values and update actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WellKnownSetting {
    /// `LogFile`
    LogFile,
    /// `LogLevel`
    LogLevel,
    /// `DebugEnabled`
    DebugEnabled,
    /// `SqlTimingThreshold`
    SqlTimingThreshold,
    /// `MaxFunctionTime`
    MaxFunctionTime,
    /// `DebugLevels`
    DebugLevels,
    /// `IgnoreList`
    IgnoreList,
    /// `LogToConsole`
    LogToConsole,
    /// `LogToDebugWindow`
    LogToDebugWindow,
    /// `TimeoutIncrement`
    TimeoutIncrement,
    /// `SqlPrintLevel`
    SqlPrintLevel,
    /// `HttpPrintLevel`
    HttpPrintLevel,
    /// `CachePrintLevel`
    CachePrintLevel,
    /// `AutoCleanUpLogFiles`
    AutoCleanUpLogFiles,
    /// `MinutesAfterMidnight`
    MinutesAfterMidnight,
    /// `DaysInterval`
    DaysInterval,
    /// `MaxBackups`
    MaxBackups,
    /// `RollingStyle`
    RollingStyle,
}

impl WellKnownSetting {
    /// Every well-known setting.
    pub const ALL: [Self; 18] = [
        Self::LogFile,
        Self::LogLevel,
        Self::DebugEnabled,
        Self::SqlTimingThreshold,
        Self::MaxFunctionTime,
        Self::DebugLevels,
        Self::IgnoreList,
        Self::LogToConsole,
        Self::LogToDebugWindow,
        Self::TimeoutIncrement,
        Self::SqlPrintLevel,
        Self::HttpPrintLevel,
        Self::CachePrintLevel,
        Self::AutoCleanUpLogFiles,
        Self::MinutesAfterMidnight,
        Self::DaysInterval,
        Self::MaxBackups,
        Self::RollingStyle,
    ];

    /// Canonical key name.
    pub fn name(self) -> &'static str {
        match self {
            Self::LogFile => "LogFile",
            Self::LogLevel => "LogLevel",
            Self::DebugEnabled => "DebugEnabled",
            Self::SqlTimingThreshold => "SqlTimingThreshold",
            Self::MaxFunctionTime => "MaxFunctionTime",
            Self::DebugLevels => "DebugLevels",
            Self::IgnoreList => "IgnoreList",
            Self::LogToConsole => "LogToConsole",
            Self::LogToDebugWindow => "LogToDebugWindow",
            Self::TimeoutIncrement => "TimeoutIncrement",
            Self::SqlPrintLevel => "SqlPrintLevel",
            Self::HttpPrintLevel => "HttpPrintLevel",
            Self::CachePrintLevel => "CachePrintLevel",
            Self::AutoCleanUpLogFiles => "AutoCleanUpLogFiles",
            Self::MinutesAfterMidnight => "MinutesAfterMidnight",
            Self::DaysInterval => "DaysInterval",
            Self::MaxBackups => "MaxBackups",
            Self::RollingStyle => "RollingStyle",
        }
    }

    /// Look up a key by the last segment of its dotted or slashed path,
    /// ignoring case. `Logging.LogLevel` and `logging/loglevel` both resolve
    /// to [`LogLevel`](Self::LogLevel).
    pub fn from_key(key: &str) -> Option<Self> {
        let leaf = key.rsplit(['.', '/']).next().unwrap_or(key).trim();
        Self::ALL
            .into_iter()
            .find(|setting| setting.name().eq_ignore_ascii_case(leaf))
    }

    /// The type the raw value is parsed into.
    pub fn value_type(self) -> ValueType {
        match self {
            Self::LogFile | Self::IgnoreList => ValueType::Text,
            Self::LogLevel | Self::SqlPrintLevel | Self::HttpPrintLevel | Self::CachePrintLevel => {
                ValueType::Int
            }
            Self::TimeoutIncrement => ValueType::Long,
            Self::MinutesAfterMidnight | Self::DaysInterval | Self::MaxBackups => ValueType::Count,
            Self::DebugEnabled
            | Self::LogToConsole
            | Self::LogToDebugWindow
            | Self::AutoCleanUpLogFiles => ValueType::Bool,
            Self::SqlTimingThreshold | Self::MaxFunctionTime => ValueType::Float,
            Self::DebugLevels => ValueType::Overrides,
            Self::RollingStyle => ValueType::Rolling,
        }
    }

    /// Parse `raw` as this setting's type.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidValue`] when the text does not parse.
    pub fn parse(self, key: &str, raw: &str) -> Result<SettingValue> {
        let value_type = self.value_type();
        let invalid = || ControlError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
            expected: value_type.expected(),
        };
        let trimmed = raw.trim();

        match value_type {
            ValueType::Int => trimmed
                .parse::<i32>()
                .map(|v| SettingValue::Int(i64::from(v)))
                .map_err(|_| invalid()),
            ValueType::Long => trimmed
                .parse::<i64>()
                .map(SettingValue::Int)
                .map_err(|_| invalid()),
            ValueType::Count => trimmed
                .parse::<u32>()
                .map(|v| SettingValue::Int(i64::from(v)))
                .map_err(|_| invalid()),
            ValueType::Bool => parse_bool(trimmed).map(SettingValue::Bool).ok_or_else(invalid),
            ValueType::Float => trimmed
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(SettingValue::Float)
                .ok_or_else(invalid),
            ValueType::Text => Ok(SettingValue::Text(trimmed.to_string())),
            ValueType::Overrides => OverrideTable::parse(trimmed)
                .map(|_| SettingValue::Text(trimmed.to_string()))
                .map_err(|_| invalid()),
            ValueType::Rolling => trimmed
                .parse::<RollingStyle>()
                .map(SettingValue::Rolling)
                .map_err(|_| invalid()),
        }
    }

    /// Bring a parsed value into the range the owning component accepts.
    ///
    /// Change detection compares the normalized value, so a source that keeps
    /// supplying an out-of-range value is seen as unchanged once applied.
    pub fn normalize(self, value: SettingValue) -> SettingValue {
        let clamp = |v: i64, f: fn(u32) -> u32| match u32::try_from(v) {
            Ok(v) => SettingValue::Int(i64::from(f(v))),
            Err(_) => SettingValue::Int(v),
        };
        match (self, value) {
            (Self::DaysInterval, SettingValue::Int(v)) => clamp(v, clamp_days_interval),
            (Self::MinutesAfterMidnight, SettingValue::Int(v)) => {
                clamp(v, clamp_minutes_after_midnight)
            }
            (_, value) => value,
        }
    }
}

impl fmt::Display for WellKnownSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Accepts `true/false`, `1/0`, `yes/no` and `on/off` in any case.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Whether `value` still carries an unevaluated `%NAME%` or `#{name}`
/// template placeholder.
pub fn is_placeholder(value: &str) -> bool {
    if let Some(start) = value.find("#{") {
        if value[start + 2..].contains('}') {
            return true;
        }
    }

    let mut rest = value;
    while let Some(open) = rest.find('%') {
        let after = &rest[open + 1..];
        let Some(close) = after.find('%') else { break };
        let name = &after[..close];
        if !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '(' | ')'))
        {
            return true;
        }
        rest = &after[close..];
    }
    false
}

/// A change observed for a single key during a reload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigChangeEvent {
    /// The key as it appeared in the source
    pub key: String,
    /// Value before the change (redacted if secret)
    pub previous_value: String,
    /// Value after the change (redacted if secret)
    pub new_value: String,
    /// Whether the key had been observed before this reload
    pub existed_before: bool,
    /// Whether the values were redacted
    pub is_secret: bool,
}

/// The components a well-known setting's update action writes to.
#[derive(Clone)]
pub struct SettingTargets {
    pub(crate) live: Arc<ArcSwap<LiveSettings>>,
    pub(crate) resolver: Arc<VerbosityResolver>,
    pub(crate) scheduler: Arc<RetentionScheduler>,
}

impl SettingTargets {
    /// Bundle the live settings with the components that own some of them.
    pub fn new(
        live: Arc<ArcSwap<LiveSettings>>,
        resolver: Arc<VerbosityResolver>,
        scheduler: Arc<RetentionScheduler>,
    ) -> Self {
        Self {
            live,
            resolver,
            scheduler,
        }
    }

    /// The effective value of `setting` right now.
    pub fn current(&self, setting: WellKnownSetting) -> SettingValue {
        use WellKnownSetting as S;

        let live = self.live.load();
        match setting {
            S::LogFile => SettingValue::Text(live.log_file.clone()),
            S::LogLevel => SettingValue::Int(i64::from(self.resolver.threshold())),
            S::DebugEnabled => SettingValue::Bool(self.resolver.is_enabled()),
            S::SqlTimingThreshold => SettingValue::Float(live.sql_timing_threshold),
            S::MaxFunctionTime => SettingValue::Float(live.max_function_time),
            S::DebugLevels => SettingValue::Text(self.resolver.overrides().to_string()),
            S::IgnoreList => SettingValue::Text(live.ignore_list.clone()),
            S::LogToConsole => SettingValue::Bool(live.log_to_console),
            S::LogToDebugWindow => SettingValue::Bool(live.log_to_debug_window),
            S::TimeoutIncrement => SettingValue::Int(live.timeout_increment),
            S::SqlPrintLevel => SettingValue::Int(i64::from(live.sql_print_level)),
            S::HttpPrintLevel => SettingValue::Int(i64::from(live.http_print_level)),
            S::CachePrintLevel => SettingValue::Int(i64::from(live.cache_print_level)),
            S::AutoCleanUpLogFiles => SettingValue::Bool(self.scheduler.auto_clean_up()),
            S::MinutesAfterMidnight => {
                SettingValue::Int(i64::from(self.scheduler.minutes_after_midnight()))
            }
            S::DaysInterval => SettingValue::Int(i64::from(self.scheduler.days_interval())),
            S::MaxBackups => SettingValue::Int(i64::from(live.max_backups)),
            S::RollingStyle => SettingValue::Rolling(live.rolling_style),
        }
    }

    /// Run the update action of `setting` with an already parsed value.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidValue`] if `value` is not of the
    /// setting's type.
    pub fn apply(&self, setting: WellKnownSetting, value: &SettingValue) -> Result<()> {
        use WellKnownSetting as S;

        let mismatch = || ControlError::InvalidValue {
            key: setting.name().to_string(),
            value: value.to_string(),
            expected: setting.value_type().expected(),
        };

        match (setting, value) {
            (S::LogFile, SettingValue::Text(v)) => self.update(|s| s.log_file = v.clone()),
            (S::LogLevel, SettingValue::Int(v)) => {
                let level = i32::try_from(*v).map_err(|_| mismatch())?;
                self.resolver.set_threshold(level);
                self.update(|s| s.log_level = level);
            }
            (S::DebugEnabled, SettingValue::Bool(v)) => {
                self.resolver.set_enabled(*v);
                self.update(|s| s.debug_enabled = *v);
            }
            (S::SqlTimingThreshold, SettingValue::Float(v)) => {
                self.update(|s| s.sql_timing_threshold = *v)
            }
            (S::MaxFunctionTime, SettingValue::Float(v)) => {
                self.update(|s| s.max_function_time = *v)
            }
            (S::DebugLevels, SettingValue::Text(v)) => {
                let table = OverrideTable::parse(v).map_err(|_| mismatch())?;
                self.resolver.replace_overrides(table);
                self.update(|s| s.debug_levels = v.clone());
            }
            (S::IgnoreList, SettingValue::Text(v)) => {
                self.resolver
                    .set_ignored_scopes(v.split(';').map(str::trim).filter(|s| !s.is_empty()));
                self.update(|s| s.ignore_list = v.clone());
            }
            (S::LogToConsole, SettingValue::Bool(v)) => self.update(|s| s.log_to_console = *v),
            (S::LogToDebugWindow, SettingValue::Bool(v)) => {
                self.update(|s| s.log_to_debug_window = *v)
            }
            (S::TimeoutIncrement, SettingValue::Int(v)) => {
                self.update(|s| s.timeout_increment = *v)
            }
            (S::SqlPrintLevel, SettingValue::Int(v)) => {
                let level = i32::try_from(*v).map_err(|_| mismatch())?;
                self.update(|s| s.sql_print_level = level);
            }
            (S::HttpPrintLevel, SettingValue::Int(v)) => {
                let level = i32::try_from(*v).map_err(|_| mismatch())?;
                self.update(|s| s.http_print_level = level);
            }
            (S::CachePrintLevel, SettingValue::Int(v)) => {
                let level = i32::try_from(*v).map_err(|_| mismatch())?;
                self.update(|s| s.cache_print_level = level);
            }
            (S::AutoCleanUpLogFiles, SettingValue::Bool(v)) => {
                self.scheduler.set_auto_clean_up(*v);
                self.update(|s| s.auto_clean_up_log_files = *v);
            }
            (S::MinutesAfterMidnight, SettingValue::Int(v)) => {
                let minutes = u32::try_from(*v).map_err(|_| mismatch())?;
                self.scheduler.set_minutes_after_midnight(minutes);
                let applied = self.scheduler.minutes_after_midnight();
                self.update(|s| s.minutes_after_midnight = applied);
            }
            (S::DaysInterval, SettingValue::Int(v)) => {
                let days = u32::try_from(*v).map_err(|_| mismatch())?;
                self.scheduler.set_days_interval(days);
                let applied = self.scheduler.days_interval();
                self.update(|s| s.days_interval = applied);
            }
            (S::MaxBackups, SettingValue::Int(v)) => {
                let days = u32::try_from(*v).map_err(|_| mismatch())?;
                self.update(|s| s.max_backups = days);
            }
            (S::RollingStyle, SettingValue::Rolling(v)) => self.update(|s| s.rolling_style = *v),
            _ => return Err(mismatch()),
        }
        Ok(())
    }

    /// Current values with component-owned fields read back from their owners.
    pub fn snapshot(&self) -> LiveSettings {
        let mut settings = LiveSettings::clone(&self.live.load());
        settings.log_level = self.resolver.threshold();
        settings.debug_enabled = self.resolver.is_enabled();
        settings.debug_levels = self.resolver.overrides().to_string();
        let schedule = self.scheduler.schedule();
        settings.auto_clean_up_log_files = schedule.auto_clean_up;
        settings.minutes_after_midnight = schedule.minutes_after_midnight;
        settings.days_interval = schedule.days_interval;
        settings
    }

    fn update(&self, f: impl Fn(&mut LiveSettings)) {
        self.live.rcu(|current| {
            let mut next = LiveSettings::clone(current);
            f(&mut next);
            next
        });
    }
}

impl fmt::Debug for SettingTargets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingTargets")
            .field("live", &self.snapshot())
            .finish()
    }
}
