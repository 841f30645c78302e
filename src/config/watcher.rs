//! File watcher for configuration layer files.
//!
//! Watches the directories holding the DEFAULT, SYSTEM and USER files and emits
//! reload events through a tokio watch channel when one of those files
//! changes. Uses debouncing to coalesce rapid writes (editors often write a
//! temp file and rename it over the original).

use super::layer::LayerOrigin;
use super::loader::ConfigStack;
use notify_debouncer_mini::{DebouncedEventKind, new_debouncer};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// How often the watcher task checks whether anyone is still listening.
pub const IDLE_POLL: Duration = Duration::from_millis(250);

/// Event types emitted when layer files change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerChangeEvent {
    /// One layer file changed
    Changed { origin: LayerOrigin, path: PathBuf },
    /// Several layer files changed in quick succession
    Batch(Vec<LayerOrigin>),
    /// Watcher encountered an error
    Error(String),
}

impl LayerChangeEvent {
    /// Returns true if this event requires a reload.
    pub fn requires_reload(&self) -> bool {
        !matches!(self, LayerChangeEvent::Error(_))
    }

    /// Layers affected by this event.
    pub fn origins(&self) -> Vec<LayerOrigin> {
        match self {
            LayerChangeEvent::Changed { origin, .. } => vec![*origin],
            LayerChangeEvent::Batch(origins) => origins.clone(),
            LayerChangeEvent::Error(_) => vec![],
        }
    }

    /// Reload the affected layers of `stack`.
    pub fn apply(&self, stack: &mut ConfigStack) {
        for origin in self.origins() {
            stack.reload_origin(origin);
        }
    }
}

/// Configuration for the file watcher.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Debounce duration for coalescing rapid changes.
    pub debounce_duration: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_duration: Duration::from_millis(500),
        }
    }
}

/// Layer files to watch, keyed by origin.
#[derive(Debug, Clone, Default)]
pub struct WatchPaths {
    files: Vec<(LayerOrigin, PathBuf)>,
}

impl WatchPaths {
    pub fn new(files: Vec<(LayerOrigin, PathBuf)>) -> Self {
        Self {
            files: files
                .into_iter()
                .map(|(origin, path)| (origin, normalize(&path)))
                .collect(),
        }
    }

    /// Watch every file currently backing a layer of `stack`.
    pub fn from_stack(stack: &ConfigStack) -> Self {
        Self::new(stack.layer_files())
    }

    /// Distinct parent directories of the watched files.
    fn directories(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = self
            .files
            .iter()
            .filter_map(|(_, path)| path.parent().map(Path::to_path_buf))
            .collect();
        dirs.sort();
        dirs.dedup();
        dirs
    }

    /// Origin of the layer backed by `path`, if any.
    pub fn origin_of(&self, path: &Path) -> Option<LayerOrigin> {
        let path = normalize(path);
        self.files
            .iter()
            .find(|(_, file)| *file == path)
            .map(|(origin, _)| *origin)
    }
}

/// Handle to control the layer watcher.
pub struct LayerWatcherHandle {
    /// Receiver for layer change events.
    pub events: watch::Receiver<Option<LayerChangeEvent>>,
    /// Watcher task. It exits within [`IDLE_POLL`] of `events` being dropped.
    _task_handle: tokio::task::JoinHandle<()>,
}

impl LayerWatcherHandle {
    /// Wait for the next layer change event.
    pub async fn wait_for_change(&mut self) -> Option<LayerChangeEvent> {
        loop {
            if self.events.changed().await.is_err() {
                return None;
            }
            let event = self.events.borrow().clone();
            if event.is_some() {
                return event;
            }
        }
    }
}

/// Starts the layer file watcher. Must be called inside a tokio runtime.
///
/// Directories that do not exist yet are skipped with a warning.
pub fn start_layer_watcher(
    paths: WatchPaths,
    config: WatcherConfig,
) -> Result<LayerWatcherHandle, notify::Error> {
    let (event_tx, event_rx) = watch::channel(None);
    let (notify_tx, notify_rx) = mpsc::channel();

    let mut debouncer = new_debouncer(config.debounce_duration, notify_tx)?;
    let watcher = debouncer.watcher();

    for dir in paths.directories() {
        if dir.is_dir() {
            info!(dir = %dir.display(), "Watching configuration directory");
            watcher.watch(&dir, notify::RecursiveMode::NonRecursive)?;
        } else {
            warn!(dir = %dir.display(), "Configuration directory does not exist, skipping watch");
        }
    }

    let task_handle = tokio::task::spawn_blocking(move || {
        // Keep the debouncer alive
        let _debouncer = debouncer;
        process_notify_events(notify_rx, event_tx, &paths);
    });

    Ok(LayerWatcherHandle {
        events: event_rx,
        _task_handle: task_handle,
    })
}

fn process_notify_events(
    rx: mpsc::Receiver<Result<Vec<notify_debouncer_mini::DebouncedEvent>, notify::Error>>,
    tx: watch::Sender<Option<LayerChangeEvent>>,
    paths: &WatchPaths,
) {
    loop {
        match rx.recv_timeout(IDLE_POLL) {
            Ok(Ok(events)) => {
                let changed: Vec<PathBuf> = events
                    .into_iter()
                    .filter(|e| {
                        matches!(
                            e.kind,
                            DebouncedEventKind::Any | DebouncedEventKind::AnyContinuous
                        )
                    })
                    .map(|e| e.path)
                    .collect();
                if let Some(event) = classify_paths(&changed, paths) {
                    debug!(?event, "Configuration layer change detected");
                    if tx.send(Some(event)).is_err() {
                        info!("Layer watcher receiver dropped, stopping");
                        return;
                    }
                }
            }
            Ok(Err(e)) => {
                error!(error = %e, "File watcher error");
                let _ = tx.send(Some(LayerChangeEvent::Error(e.to_string())));
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if tx.is_closed() {
                    debug!("Layer watcher receiver dropped, stopping");
                    return;
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                info!("Layer watcher channel closed, stopping");
                return;
            }
        }
    }
}

/// Turn a batch of changed paths into at most one event.
fn classify_paths(changed: &[PathBuf], paths: &WatchPaths) -> Option<LayerChangeEvent> {
    let mut hits: Vec<(LayerOrigin, &PathBuf)> = changed
        .iter()
        .filter_map(|p| paths.origin_of(p).map(|origin| (origin, p)))
        .collect();
    hits.sort_by_key(|(origin, _)| *origin);
    hits.dedup_by_key(|(origin, _)| *origin);

    match hits.len() {
        0 => None,
        1 => {
            let (origin, path) = hits[0];
            Some(LayerChangeEvent::Changed {
                origin,
                path: path.clone(),
            })
        }
        _ => Some(LayerChangeEvent::Batch(
            hits.into_iter().map(|(origin, _)| origin).collect(),
        )),
    }
}

/// Canonicalize the parent directory so watcher paths and configured paths compare equal.
fn normalize(path: &Path) -> PathBuf {
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => std::fs::canonicalize(parent)
            .map(|p| p.join(name))
            .unwrap_or_else(|_| path.to_path_buf()),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LayerPaths;
    use serde_json::json;
    use tempfile::TempDir;

    fn watch_paths(temp: &TempDir) -> WatchPaths {
        WatchPaths::new(vec![
            (LayerOrigin::System, temp.path().join("etc/mycroft.conf")),
            (LayerOrigin::User, temp.path().join("home/mycroft.conf")),
        ])
    }

    #[test]
    fn test_classify_single_layer() {
        let temp = TempDir::new().unwrap();
        let paths = watch_paths(&temp);
        let changed = vec![temp.path().join("home/mycroft.conf")];

        let event = classify_paths(&changed, &paths).unwrap();
        assert_eq!(event.origins(), vec![LayerOrigin::User]);
        assert!(matches!(event, LayerChangeEvent::Changed { .. }));
    }

    #[test]
    fn test_classify_batch() {
        let temp = TempDir::new().unwrap();
        let paths = watch_paths(&temp);
        let changed = vec![
            temp.path().join("home/mycroft.conf"),
            temp.path().join("etc/mycroft.conf"),
            temp.path().join("home/mycroft.conf"),
        ];

        let event = classify_paths(&changed, &paths).unwrap();
        assert_eq!(
            event,
            LayerChangeEvent::Batch(vec![LayerOrigin::System, LayerOrigin::User])
        );
    }

    #[test]
    fn test_classify_unrelated_file() {
        let temp = TempDir::new().unwrap();
        let paths = watch_paths(&temp);
        let changed = vec![temp.path().join("home/other.conf")];
        assert!(classify_paths(&changed, &paths).is_none());
    }

    #[test]
    fn test_directories_deduplicated() {
        let paths = WatchPaths::new(vec![
            (LayerOrigin::System, PathBuf::from("/nonexistent/a/x.conf")),
            (LayerOrigin::User, PathBuf::from("/nonexistent/a/y.conf")),
        ]);
        assert_eq!(paths.directories(), vec![PathBuf::from("/nonexistent/a")]);
    }

    #[test]
    fn test_event_requires_reload() {
        assert!(LayerChangeEvent::Batch(vec![LayerOrigin::User]).requires_reload());
        assert!(!LayerChangeEvent::Error("test".to_string()).requires_reload());
        assert!(LayerChangeEvent::Error("test".to_string()).origins().is_empty());
    }

    #[test]
    fn test_task_stops_after_receiver_dropped() {
        let (notify_tx, notify_rx) = mpsc::channel();
        let (tx, rx) = watch::channel(None);
        drop(rx);

        let started = std::time::Instant::now();
        process_notify_events(notify_rx, tx, &WatchPaths::default());

        assert!(started.elapsed() < Duration::from_secs(5));
        drop(notify_tx);
    }

    #[tokio::test]
    async fn test_watcher_reloads_changed_user_layer() {
        let temp = TempDir::new().unwrap();
        let user = temp.path().join("home/mycroft.conf");
        std::fs::create_dir_all(user.parent().unwrap()).unwrap();
        std::fs::write(&user, r#"{"a": 1}"#).unwrap();
        let mut stack =
            ConfigStack::load_with_paths(&LayerPaths::with_files(vec![], None, Some(user.clone())));
        let config = WatcherConfig {
            debounce_duration: Duration::from_millis(100),
        };
        let mut handle = start_layer_watcher(WatchPaths::from_stack(&stack), config).unwrap();

        std::fs::write(&user, r#"{"a": 2}"#).unwrap();
        let event = tokio::time::timeout(Duration::from_secs(10), handle.wait_for_change())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(event.origins(), vec![LayerOrigin::User]);
        event.apply(&mut stack);
        assert_eq!(stack.get("a"), Some(json!(2)));
    }
}
