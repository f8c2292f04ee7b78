//! File enumeration and deletion used by the cleanup pass.

use chrono::{DateTime, Local};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// A candidate file for retention cleanup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Full path of the file
    pub path: PathBuf,
    /// File name without directory
    pub name: String,
    /// Creation time, or modification time where the platform lacks one
    pub created: DateTime<Local>,
}

/// Result of enumerating one directory.
///
/// Entries that could not be read are reported next to the readable ones so
/// a single bad entry never hides the rest of the directory.
#[derive(Debug, Default)]
pub struct Listing {
    /// Readable files matching the prefix
    pub files: Vec<FileInfo>,
    /// Entries whose name or metadata could not be read
    pub unreadable: Vec<(PathBuf, io::Error)>,
}

impl From<Vec<FileInfo>> for Listing {
    fn from(files: Vec<FileInfo>) -> Self {
        Self {
            files,
            unreadable: Vec::new(),
        }
    }
}

/// File system capability needed by the retention scheduler.
pub trait FileSystem: Send + Sync {
    /// List regular files in `dir` whose name starts with `prefix`.
    ///
    /// An error means the directory itself could not be opened.
    fn list_files(&self, dir: &Path, prefix: &str) -> io::Result<Listing>;

    /// Delete a single file.
    fn delete(&self, path: &Path) -> io::Result<()>;
}

/// The local disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileSystem;

impl FileSystem for LocalFileSystem {
    fn list_files(&self, dir: &Path, prefix: &str) -> io::Result<Listing> {
        if !dir.exists() {
            return Ok(Listing::default());
        }

        let entries = fs::read_dir(dir)?.map(|entry| entry.map(|e| (e.path(), e.metadata())));
        Ok(collect_listing(dir, prefix, entries))
    }

    fn delete(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }
}

fn collect_listing<I>(dir: &Path, prefix: &str, entries: I) -> Listing
where
    I: IntoIterator<Item = io::Result<(PathBuf, io::Result<fs::Metadata>)>>,
{
    let mut listing = Listing::default();
    for entry in entries {
        let (path, metadata) = match entry {
            Ok(entry) => entry,
            Err(e) => {
                listing.unreadable.push((dir.to_path_buf(), e));
                continue;
            }
        };

        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) if name.starts_with(prefix) => name.to_string(),
            _ => continue,
        };

        let created = metadata.and_then(|metadata| {
            if !metadata.is_file() {
                return Ok(None);
            }
            let created = metadata.created().or_else(|_| metadata.modified())?;
            Ok(Some(DateTime::<Local>::from(created)))
        });

        match created {
            Ok(Some(created)) => listing.files.push(FileInfo {
                path,
                name,
                created,
            }),
            Ok(None) => {}
            Err(e) => listing.unreadable.push((path, e)),
        }
    }
    listing
}
