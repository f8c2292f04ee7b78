//! File watching for automatic configuration reloads.

use crate::error::{ControlError, Result};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;

/// Watches one configuration file for changes.
///
/// The parent directory is watched rather than the file itself, so editors
/// that save by writing a temporary file and renaming it over the original
/// keep triggering events. Bursts of raw events are coalesced into a single
/// signal per settle period; callers still compare modification timestamps
/// to drop signals that do not correspond to new content.
///
/// # Examples
///
/// ```rust,no_run
/// use hotswap_verbosity::notify::ConfigWatcher;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (watcher, mut rx) = ConfigWatcher::new("/etc/app/logging.yaml", Duration::from_millis(200))?;
///
/// while let Some(()) = rx.recv().await {
///     println!("{} changed", watcher.path().display());
/// }
/// # Ok(())
/// # }
/// ```
pub struct ConfigWatcher {
    // Dropping the notify watcher stops event delivery.
    _watcher: RecommendedWatcher,
    path: PathBuf,
    settle: Duration,
}

impl ConfigWatcher {
    /// Start watching `path`.
    ///
    /// Returns the watcher and a receiver that yields one `()` per coalesced
    /// burst of change events. Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the path has no existing parent directory or the
    /// platform watcher cannot be created.
    pub fn new(path: impl AsRef<Path>, settle: Duration) -> Result<(Self, mpsc::Receiver<()>)> {
        let path = path.as_ref().to_path_buf();
        let file_name = path
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| ControlError::Watch(format!("not a file path: {}", path.display())))?;

        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let parent = parent
            .canonicalize()
            .map_err(|e| ControlError::Watch(format!("Failed to resolve path: {}", e)))?;

        let (tx, rx) = mpsc::channel(16);
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<()>();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let Ok(event) = res else { return };
            let relevant = matches!(
                event.kind,
                notify::EventKind::Modify(_) | notify::EventKind::Create(_)
            ) && event
                .paths
                .iter()
                .any(|p| p.file_name() == Some(file_name.as_os_str()));

            if relevant {
                let _ = event_tx.send(());
            }
        })
        .map_err(|e| ControlError::Watch(format!("Failed to create file watcher: {}", e)))?;

        watcher
            .watch(&parent, RecursiveMode::NonRecursive)
            .map_err(|e| ControlError::Watch(format!("Failed to watch path: {}", e)))?;

        // Coalesce bursts: wait for the settle period, drain, then signal once.
        tokio::spawn(async move {
            while event_rx.recv().await.is_some() {
                sleep(settle).await;
                while event_rx.try_recv().is_ok() {}

                if tx.send(()).await.is_err() {
                    break;
                }
            }
        });

        Ok((
            Self {
                _watcher: watcher,
                path,
                settle,
            },
            rx,
        ))
    }

    /// The watched file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the settle period used to coalesce events.
    pub fn settle_duration(&self) -> Duration {
        self.settle
    }
}
