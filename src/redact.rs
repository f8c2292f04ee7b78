//! Secret redaction applied before values are surfaced in change events.

/// Capability that hides secret material in a configuration value.
pub trait Redactor: Send + Sync {
    /// Return a displayable form of `value` for `key`.
    fn redact(&self, key: &str, value: &str) -> String;
}

/// Replaces secrets with a fixed mask.
///
/// Connection strings keep their structure and only the password-like
/// components are masked, so an operator can still tell which server a
/// change points at.
#[derive(Debug, Clone)]
pub struct MaskRedactor {
    mask: String,
}

impl MaskRedactor {
    /// Create a redactor using `mask` as the replacement text.
    pub fn new(mask: impl Into<String>) -> Self {
        Self { mask: mask.into() }
    }
}

impl Default for MaskRedactor {
    fn default() -> Self {
        Self::new("*****")
    }
}

impl Redactor for MaskRedactor {
    fn redact(&self, _key: &str, value: &str) -> String {
        if value.is_empty() {
            return String::new();
        }
        if !looks_like_connection_string(value) {
            return self.mask.clone();
        }

        value
            .split(';')
            .map(|segment| match segment.split_once('=') {
                Some((name, _)) if is_secret_name(name.trim()) => {
                    format!("{}={}", name, self.mask)
                }
                _ => segment.to_string(),
            })
            .collect::<Vec<_>>()
            .join(";")
    }
}

/// Names that are treated as secret regardless of what the caller flags.
pub(crate) const SECRET_NAMES: &[&str] = &[
    "connectionstring",
    "connection-string",
    "connection_string",
    "password",
    "pwd",
];

/// Case-insensitive check against [`SECRET_NAMES`].
pub(crate) fn is_secret_name(name: &str) -> bool {
    let lowered = name.to_ascii_lowercase();
    SECRET_NAMES.iter().any(|s| *s == lowered)
}

/// Whether `value` parses as a `key=value;key=value` connection string.
pub fn looks_like_connection_string(value: &str) -> bool {
    if !value.contains(';') || !value.contains('=') {
        return false;
    }

    let mut pairs = 0;
    for segment in value.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        match segment.split_once('=') {
            Some((name, _)) if !name.trim().is_empty() => pairs += 1,
            _ => return false,
        }
    }
    pairs > 0
}
