//! In-memory store of the last-known value of every monitored setting.

use crate::redact::is_secret_name;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// A single monitored key and the raw value last observed for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitoredSetting {
    /// Flat key path
    pub key: String,
    /// Raw string value as it appeared in the source
    pub raw_value: String,
    /// Whether the value must be redacted before display
    pub is_secret: bool,
}

/// Outcome of [`SettingsRegistry::upsert`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upsert {
    /// Whether the stored value changed
    pub changed: bool,
    /// Whether the key was known before this call
    pub existed: bool,
    /// The value stored before this call (empty if the key was new)
    pub previous: String,
}

/// Keyed store of monitored settings.
///
/// Reads may run concurrently; writes are serialized by an internal lock.
/// The registry performs no I/O and never logs.
///
/// # Examples
///
/// ```rust
/// use hotswap_verbosity::core::SettingsRegistry;
///
/// let registry = SettingsRegistry::new();
/// assert_eq!(registry.get_or_initialize("LogLevel", "3"), "3");
///
/// let outcome = registry.upsert("LogLevel", "5");
/// assert!(outcome.changed);
/// assert_eq!(outcome.previous, "3");
/// ```
#[derive(Debug, Default)]
pub struct SettingsRegistry {
    values: RwLock<HashMap<String, String>>,
    secret_keys: RwLock<HashSet<String>>,
}

impl SettingsRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the stored value, storing `value` first if the key is unknown.
    ///
    /// Used to seed baselines without firing change events.
    pub fn get_or_initialize(&self, key: &str, value: &str) -> String {
        if let Some(existing) = self.values.read().get(key) {
            return existing.clone();
        }
        self.values
            .write()
            .entry(key.to_string())
            .or_insert_with(|| value.to_string())
            .clone()
    }

    /// Compare and replace the value for `key`.
    pub fn upsert(&self, key: &str, new_value: &str) -> Upsert {
        let mut values = self.values.write();
        match values.get_mut(key) {
            Some(current) if current == new_value => Upsert {
                changed: false,
                existed: true,
                previous: current.clone(),
            },
            Some(current) => {
                let previous = std::mem::replace(current, new_value.to_string());
                Upsert {
                    changed: true,
                    existed: true,
                    previous,
                }
            }
            None => {
                values.insert(key.to_string(), new_value.to_string());
                Upsert {
                    changed: true,
                    existed: false,
                    previous: String::new(),
                }
            }
        }
    }

    /// Current raw value for `key`.
    pub fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    /// Whether `key` has been observed.
    pub fn contains(&self, key: &str) -> bool {
        self.values.read().contains_key(key)
    }

    /// Flag `key` as secret for the lifetime of the registry.
    pub fn mark_secret(&self, key: &str) {
        self.secret_keys.write().insert(key.to_ascii_lowercase());
    }

    /// Whether values of `key` must be redacted.
    ///
    /// True for the built-in names (connection string, password, pwd) in any
    /// case, and for keys flagged through [`mark_secret`](Self::mark_secret).
    /// Only the last segment of a dotted or slashed path is compared against
    /// the built-in names.
    pub fn is_secret(&self, key: &str) -> bool {
        let leaf = key.rsplit(['.', '/']).next().unwrap_or(key);
        is_secret_name(leaf) || self.secret_keys.read().contains(&key.to_ascii_lowercase())
    }

    /// Snapshot of every monitored setting, sorted by key.
    pub fn snapshot(&self) -> Vec<MonitoredSetting> {
        let values = self.values.read();
        let mut settings: Vec<_> = values
            .iter()
            .map(|(key, raw_value)| MonitoredSetting {
                key: key.clone(),
                raw_value: raw_value.clone(),
                is_secret: self.is_secret(key),
            })
            .collect();
        settings.sort_by(|a, b| a.key.cmp(&b.key));
        settings
    }

    /// Number of monitored keys.
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    /// Whether no key has been observed yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
