//! Call-path verbosity resolution.

mod callpath;
mod overrides;
mod resolver;

pub use callpath::{
    BacktraceFrames, DEFAULT_EXCLUDED_SCOPES, Frame, FrameSource, StaticFrames, normalize, normalize_scopes,
};
pub use overrides::{OverrideTable, PatternKind, VerbosityOverride};
pub use resolver::{Resolution, VerbosityResolver};
