//! Non-recursive directory watcher built on `notify`

use notify::event::{AccessKind, AccessMode, ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

use crate::error::{Error, Result};

/// Kind of filesystem operation reported for a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    /// File created or moved into the directory
    Created,
    /// File content written or a writer closed it
    Written,
    /// Anything else (remove, metadata, rename away)
    Other,
}

impl WatchEventKind {
    /// Whether the dispatcher should look at events of this kind
    pub fn is_relevant(&self) -> bool {
        matches!(self, WatchEventKind::Created | WatchEventKind::Written)
    }
}

/// One filesystem event for one path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub kind: WatchEventKind,
}

impl WatchEvent {
    pub fn new(path: impl Into<PathBuf>, kind: WatchEventKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Watches one directory and forwards its events into a channel
pub struct DirectoryWatcher {
    path: PathBuf,
    _watcher: RecommendedWatcher,
}

impl DirectoryWatcher {
    /// Attach to `dir`. Events flow until the watcher is dropped.
    pub fn new(dir: &Path) -> Result<(Self, mpsc::UnboundedReceiver<WatchEvent>)> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| match res {
                Ok(event) => {
                    for watch_event in convert_notify_event(event) {
                        tracing::debug!("event: {:?}", watch_event);
                        if event_tx.send(watch_event).is_err() {
                            tracing::debug!("Watch event dropped: dispatcher gone");
                        }
                    }
                }
                Err(e) => tracing::error!("Watch error: {}", e),
            },
            Config::default(),
        )
        .map_err(|source| Error::Watch {
            path: dir.to_path_buf(),
            source,
        })?;

        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|source| Error::Watch {
                path: dir.to_path_buf(),
                source,
            })?;
        tracing::info!("Watching directory: {}", dir.display());

        Ok((
            Self {
                path: dir.to_path_buf(),
                _watcher: watcher,
            },
            event_rx,
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for DirectoryWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryWatcher")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Convert a notify event into one [`WatchEvent`] per affected path
pub fn convert_notify_event(event: Event) -> Vec<WatchEvent> {
    let kind = match event.kind {
        EventKind::Create(_) => WatchEventKind::Created,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => WatchEventKind::Created,
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            // paths are [from, to]; only the destination is new
            return event
                .paths
                .last()
                .map(|to| vec![WatchEvent::new(to.clone(), WatchEventKind::Created)])
                .unwrap_or_default();
        }
        EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any) => {
            WatchEventKind::Written
        }
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => WatchEventKind::Written,
        _ => WatchEventKind::Other,
    };

    event
        .paths
        .into_iter()
        .map(|path| WatchEvent::new(path, kind))
        .collect()
}
