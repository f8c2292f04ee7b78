//! File-based configuration source.

use super::KeyValueSource;
use crate::error::{ControlError, Result};
use config::{File, Map, Value, ValueKind};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// File-based configuration source.
///
/// Loads YAML, TOML, or JSON files with format detection from the file
/// extension. Nested tables are flattened into dotted keys, so
/// `logging: { LogLevel: 5 }` yields `("logging.LogLevel", "5")`.
///
/// # Examples
///
/// ```rust,no_run
/// use hotswap_verbosity::sources::{FileSource, KeyValueSource};
///
/// let source = FileSource::new("config/logging.yaml");
/// for (key, value) in source.load()? {
///     println!("{} = {}", key, value);
/// }
/// # Ok::<(), hotswap_verbosity::error::ControlError>(())
/// ```
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    /// Create a new file source.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the configuration file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Validate that the file extension is supported.
    fn validate_extension(&self) -> Result<()> {
        let extension = self
            .path
            .extension()
            .and_then(|ext| ext.to_str())
            .ok_or_else(|| {
                ControlError::Load(format!(
                    "Unable to determine file format for: {}",
                    self.path.display()
                ))
            })?;

        match extension {
            "yaml" | "yml" | "toml" | "json" => Ok(()),
            _ => Err(ControlError::Load(format!(
                "Unsupported file extension: {}. Supported: .yaml, .yml, .toml, .json",
                extension
            ))),
        }
    }
}

impl KeyValueSource for FileSource {
    fn load(&self) -> Result<Vec<(String, String)>> {
        self.validate_extension()?;

        if !self.path.exists() {
            return Err(ControlError::Load(format!(
                "Configuration file not found: {}",
                self.path.display()
            )));
        }

        let document = config::Config::builder()
            .add_source(File::from(self.path.clone()).required(true))
            .build()
            .map_err(|e| ControlError::Load(format!("Failed to load file: {}", e)))?;

        let table = document
            .try_deserialize::<Map<String, Value>>()
            .map_err(|e| ControlError::Load(format!("Failed to parse file: {}", e)))?;

        let mut pairs = Vec::new();
        flatten("", table, &mut pairs);
        Ok(pairs)
    }

    fn locator(&self) -> String {
        format!("file:{}", self.path.display())
    }

    fn modified(&self) -> Option<SystemTime> {
        std::fs::metadata(&self.path).and_then(|m| m.modified()).ok()
    }

    fn watch_path(&self) -> Option<PathBuf> {
        Some(self.path.clone())
    }
}

fn flatten(prefix: &str, table: Map<String, Value>, out: &mut Vec<(String, String)>) {
    for (key, value) in table {
        let key = if prefix.is_empty() {
            key
        } else {
            format!("{}.{}", prefix, key)
        };

        match value.kind {
            ValueKind::Table(nested) => flatten(&key, nested, out),
            ValueKind::Array(items) => {
                let joined = items
                    .into_iter()
                    .filter_map(|item| item.into_string().ok())
                    .collect::<Vec<_>>()
                    .join(";");
                out.push((key, joined));
            }
            ValueKind::Nil => out.push((key, String::new())),
            kind => {
                let value = Value::new(None, kind);
                if let Ok(text) = value.into_string() {
                    out.push((key, text));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_validate_extension() {
        assert!(FileSource::new("config.yaml").validate_extension().is_ok());
        assert!(FileSource::new("config.yml").validate_extension().is_ok());
        assert!(FileSource::new("config.toml").validate_extension().is_ok());
        assert!(FileSource::new("config.json").validate_extension().is_ok());
        assert!(FileSource::new("config.txt").validate_extension().is_err());
        assert!(FileSource::new("config").validate_extension().is_err());
    }

    #[test]
    fn test_load_flattens_in_document_order() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("logging.yaml");

        fs::write(
            &config_path,
            r#"
LogLevel: 5
DebugLevels: "Foo.Bar:8"
retention:
  AutoCleanUpLogFiles: true
  DaysInterval: 1
"#,
        )
        .unwrap();

        // Well-known keys are matched case-insensitively, so compare lowered.
        let pairs: Vec<_> = FileSource::new(&config_path)
            .load()
            .unwrap()
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("loglevel".to_string(), "5".to_string()),
                ("debuglevels".to_string(), "Foo.Bar:8".to_string()),
                ("retention.autocleanuplogfiles".to_string(), "true".to_string()),
                ("retention.daysinterval".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn test_load_json_arrays_join() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("logging.json");
        fs::write(&config_path, r#"{ "IgnoreList": ["vendor", "generated"] }"#).unwrap();

        let pairs = FileSource::new(&config_path).load().unwrap();
        assert_eq!(pairs.len(), 1);
        assert!(pairs[0].0.eq_ignore_ascii_case("IgnoreList"));
        assert_eq!(pairs[0].1, "vendor;generated");
    }

    #[test]
    fn test_load_malformed_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("logging.yaml");
        fs::write(&config_path, "LogLevel: [unterminated").unwrap();

        assert!(FileSource::new(&config_path).load().is_err());
    }

    #[test]
    fn test_load_nonexistent_file() {
        let source = FileSource::new("/nonexistent/config.yaml");
        assert!(source.load().is_err());
        assert!(source.modified().is_none());
    }

    #[test]
    fn test_locator_and_watch_path() {
        let source = FileSource::new("config.yaml");
        assert!(source.locator().contains("config.yaml"));
        assert_eq!(source.watch_path(), Some(PathBuf::from("config.yaml")));
    }
}
