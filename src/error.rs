//! Error types for hotswap-verbosity.

use std::path::PathBuf;

/// Result type alias for hotswap-verbosity operations.
pub type Result<T> = std::result::Result<T, ControlError>;

/// Broad classification of a [`ControlError`].
///
/// Every fault reported by the crate falls into one of these buckets, which
/// decide how the fault is recovered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Source missing, malformed document, or unparseable typed value.
    /// The previous good settings stay active.
    Configuration,
    /// An unevaluated template placeholder; the key is skipped for one cycle.
    PlaceholderValue,
    /// A failure while matching call paths; the log call is denied.
    Resolution,
    /// A file enumeration or deletion failure; the batch continues.
    Cleanup,
}

/// Errors that can occur while controlling logging configuration.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// Monitoring was requested before a configuration source was set.
    #[error("Configuration source not set")]
    SourceNotSet,

    /// Failed to load configuration from a source.
    #[error("Failed to load configuration: {0}")]
    Load(String),

    /// Every reload attempt failed.
    #[error("Configuration could not be loaded after {attempts} attempts: {last}")]
    MalformedDocument {
        /// Number of attempts made
        attempts: u32,
        /// Message of the last failure
        last: String,
    },

    /// A well-known setting carried a value that does not parse as its type.
    #[error("Setting '{key}' has invalid value '{value}' (expected {expected})")]
    InvalidValue {
        /// The setting key
        key: String,
        /// The raw value
        value: String,
        /// Name of the expected type
        expected: &'static str,
    },

    /// A value still contains an unevaluated template placeholder.
    #[error("Setting '{key}' contains an unevaluated placeholder: {value}")]
    Placeholder {
        /// The setting key
        key: String,
        /// The raw value
        value: String,
    },

    /// The debug-level override string could not be parsed.
    #[error("Invalid verbosity override: {0}")]
    InvalidOverride(String),

    /// Call-path resolution failed.
    #[error("Verbosity resolution failed: {0}")]
    Resolution(String),

    /// A retention cleanup step failed.
    #[error("Cleanup failed for '{}': {reason}", path.display())]
    Cleanup {
        /// File or directory the failure relates to
        path: PathBuf,
        /// The reason reported by the file system
        reason: String,
    },

    /// File watching failed to initialize.
    #[error("File watching error: {0}")]
    Watch(String),

    /// IO error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ControlError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SourceNotSet
            | Self::Load(_)
            | Self::MalformedDocument { .. }
            | Self::InvalidValue { .. }
            | Self::InvalidOverride(_)
            | Self::Watch(_) => ErrorKind::Configuration,
            Self::Placeholder { .. } => ErrorKind::PlaceholderValue,
            Self::Resolution(_) => ErrorKind::Resolution,
            Self::Cleanup { .. } | Self::Io(_) => ErrorKind::Cleanup,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(ControlError::SourceNotSet.kind(), ErrorKind::Configuration);
        assert_eq!(
            ControlError::Placeholder {
                key: "LogFile".into(),
                value: "%LOGDIR%".into()
            }
            .kind(),
            ErrorKind::PlaceholderValue
        );
        assert_eq!(
            ControlError::Resolution("boom".into()).kind(),
            ErrorKind::Resolution
        );
        assert_eq!(
            ControlError::Cleanup {
                path: PathBuf::from("/tmp/a.log"),
                reason: "denied".into()
            }
            .kind(),
            ErrorKind::Cleanup
        );
    }

    #[test]
    fn test_display() {
        let err = ControlError::MalformedDocument {
            attempts: 5,
            last: "bad yaml".into(),
        };
        assert_eq!(
            err.to_string(),
            "Configuration could not be loaded after 5 attempts: bad yaml"
        );
    }
}
