//! # hotswap-verbosity
//!
//! Hot-reloadable logging control: per-call-path verbosity, watched
//! settings, and scheduled cleanup of rolled log files.
//!
//! ## Overview
//!
//! `hotswap-verbosity` decides, at each log call, whether a message at a
//! given verbosity level should be emitted from the calling code path. It
//! combines:
//! - A global threshold and an enablement gate
//! - An ordered table of call-path overrides (`Billing*:7;*Cache*:-1`)
//! - A watched configuration source that is reloaded without a restart
//! - A daily retention pass over rolled log files
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hotswap_verbosity::prelude::*;
//!
//! # async fn example() -> hotswap_verbosity::error::Result<()> {
//! // logging.yaml:
//! //   LogLevel: "5"
//! //   DebugLevels: "Billing.Invoice:8"
//! let control = LogControl::builder()
//!     .with_file("config/logging.yaml")
//!     .with_monitoring(true)
//!     .build()
//!     .await?;
//!
//! // Reads never block: the override table is swapped in atomically.
//! let resolution = control.resolve(6);
//! if resolution.pass {
//!     println!("level 6 enabled via {:?}", resolution.matched_pattern);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Override rules
//!
//! | Pattern   | Matches when the call path |
//! |-----------|----------------------------|
//! | `*x*`     | contains `x`               |
//! | `*x`      | ends with `x`              |
//! | `x*`      | starts with `x`            |
//! | `x`       | equals or contains `x`     |
//! | `*`       | nothing else matched       |
//!
//! A level of `0` defers to the global threshold and a negative level
//! silences the path. A positive level caps the path only while the global
//! threshold is below it.
//!
//! ## Feature Flags
//!
//! - `file-watch` (default): reload automatically when the file changes
//! - `yaml`, `toml`, `json` (default): file formats accepted by [`sources::FileSource`]

#![warn(missing_docs, rust_2024_compatibility)]
#![deny(unsafe_code)]

pub mod core;
pub mod error;
pub mod log_sink;
pub mod notify;
pub mod redact;
pub mod retention;
pub mod sources;
pub mod verbosity;

pub use error::{ControlError, ErrorKind};
pub use log_sink::{LogSink, Severity, TracingSink};

/// Convenient re-exports for common usage patterns.
pub mod prelude {
    pub use crate::core::{
        ConfigChangeEvent, LiveSettings, LogControl, LogControlBuilder, ReloadOutcome,
    };
    pub use crate::error::{ControlError, Result};
    pub use crate::log_sink::{LogSink, Severity, TracingSink};
    pub use crate::retention::{CleanupReport, RetentionTarget, RollingStyle};
    pub use crate::verbosity::{OverrideTable, Resolution};
}
