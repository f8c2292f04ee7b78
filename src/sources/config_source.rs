//! Configuration source trait.

use crate::error::Result;
use std::path::PathBuf;
use std::time::SystemTime;

/// A key/value configuration source.
///
/// Implement this trait to feed settings from somewhere other than a file
/// (a database table, a remote store, an in-memory map in tests).
pub trait KeyValueSource: Send + Sync {
    /// Load every key with its raw string value, in document order.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be read or parsed.
    fn load(&self) -> Result<Vec<(String, String)>>;

    /// Human-readable locator for this source (for logging and equality).
    fn locator(&self) -> String;

    /// Modification timestamp of the underlying document, if the source has one.
    ///
    /// Used to debounce duplicate change signals.
    fn modified(&self) -> Option<SystemTime> {
        None
    }

    /// File system path to watch for changes, if any.
    fn watch_path(&self) -> Option<PathBuf> {
        None
    }
}
