//! Settings registry, reload coordination and the control-plane handle.

mod builder;
mod control;
mod coordinator;
mod loader;
mod registry;
mod settings;

pub use builder::LogControlBuilder;
pub use control::LogControl;
pub use coordinator::{ConfigReloadCoordinator, ReloadOutcome};
pub use loader::RetryPolicy;
pub use registry::{MonitoredSetting, SettingsRegistry, Upsert};
pub use settings::{
    ConfigChangeEvent, LiveSettings, SettingTargets, SettingValue, ValueType, WellKnownSetting,
    is_placeholder, parse_bool,
};
