//! File system watch source feeding the security engine.
//!
//! Each watched root gets its own notify watcher and its own consumer
//! thread, so several roots deliver events to the shared engine
//! concurrently. The engine serializes them.

use anyhow::{Result, bail};
use notify::event::ModifyKind;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, mpsc};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::security::{Alert, EngineError, EventKind, SecurityEngine};

/// Receives alerts produced from watched events.
pub trait AlertSink: Send + Sync {
    fn deliver(&self, alert: &Alert);
}

/// Forwards alerts over a channel to an embedding host.
pub struct ChannelSink {
    tx: mpsc::Sender<Alert>,
}

impl ChannelSink {
    pub fn channel() -> (Self, mpsc::Receiver<Alert>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }
}

impl AlertSink for ChannelSink {
    fn deliver(&self, alert: &Alert) {
        if let Err(e) = self.tx.send(alert.clone()) {
            debug!("Alert receiver gone: {}", e);
        }
    }
}

/// Prints alerts to stdout, one per line.
pub struct StdoutSink {
    json: bool,
}

impl StdoutSink {
    pub fn new(json: bool) -> Self {
        Self { json }
    }
}

impl AlertSink for StdoutSink {
    fn deliver(&self, alert: &Alert) {
        let line = if self.json {
            match serde_json::to_string(alert) {
                Ok(line) => line,
                Err(e) => {
                    warn!("Failed to serialize alert: {}", e);
                    return;
                }
            }
        } else {
            format!("{} {}", alert.timestamp, alert)
        };
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "{}", line);
    }
}

/// Map a notify event kind to an audit event kind. Access and
/// unclassified events are not audited.
pub fn map_event_kind(kind: &notify::EventKind) -> Option<EventKind> {
    match kind {
        notify::EventKind::Create(_) => Some(EventKind::Created),
        notify::EventKind::Modify(ModifyKind::Name(_)) => Some(EventKind::Moved),
        notify::EventKind::Modify(_) => Some(EventKind::Modified),
        notify::EventKind::Remove(_) => Some(EventKind::Deleted),
        _ => None,
    }
}

struct RootWatch {
    watcher: RecommendedWatcher,
    root: PathBuf,
    handle: JoinHandle<()>,
}

/// Watches configured roots and hands every event to the engine.
pub struct SecurityWatcher {
    roots: Vec<RootWatch>,
}

impl SecurityWatcher {
    /// Start watching `roots`. Roots that do not exist are skipped with a
    /// warning; it is an error if none can be watched.
    pub fn new<S>(engine: SecurityEngine, roots: &[PathBuf], sink: S) -> Result<Self>
    where
        S: AlertSink + 'static,
    {
        let sink: Arc<dyn AlertSink> = Arc::new(sink);
        let mut watches = Vec::new();

        for root in roots {
            if !root.is_dir() {
                warn!("Skipping watch root {}: not a directory", root.display());
                continue;
            }
            match watch_root(engine.clone(), root, sink.clone()) {
                Ok(watch) => {
                    info!("Watching: {}", root.display());
                    watches.push(watch);
                }
                Err(e) => warn!("Failed to watch {}: {}", root.display(), e),
            }
        }

        if watches.is_empty() {
            bail!("No watchable directories (checked {})", roots.len());
        }

        Ok(Self { roots: watches })
    }

    pub fn roots(&self) -> Vec<&Path> {
        self.roots.iter().map(|r| r.root.as_path()).collect()
    }

    /// Stop every watcher and wait for the consumer threads to drain.
    pub fn shutdown(self) {
        for watch in self.roots {
            drop(watch.watcher);
            if watch.handle.join().is_err() {
                warn!("Watch thread for {} panicked", watch.root.display());
            }
        }
        info!("Watchers stopped");
    }
}

fn watch_root(
    engine: SecurityEngine,
    root: &Path,
    sink: Arc<dyn AlertSink>,
) -> Result<RootWatch> {
    let (tx, rx) = mpsc::channel::<(EventKind, PathBuf)>();

    let mut watcher =
        notify::recommended_watcher(move |res: Result<Event, notify::Error>| match res {
            Ok(event) => {
                let Some(kind) = map_event_kind(&event.kind) else {
                    return;
                };
                for path in event.paths {
                    if let Err(e) = tx.send((kind, path)) {
                        warn!("Failed to send event: {}", e);
                    }
                }
            }
            Err(e) => warn!("Watch error: {:?}", e),
        })?;
    watcher.watch(root, RecursiveMode::Recursive)?;

    let root_for_task = root.to_path_buf();
    let handle = std::thread::Builder::new()
        .name(format!("owlwatch-{}", root_name(root)))
        .spawn(move || {
            loop {
                match rx.recv_timeout(Duration::from_secs(1)) {
                    Ok((kind, path)) => match engine.handle_event(kind, &path) {
                        Ok(Some(alert)) => sink.deliver(&alert),
                        Ok(None) => {}
                        Err(e @ EngineError::LockTimeout { .. }) => {
                            warn!("Dropped {} event for {}: {}", kind, path.display(), e)
                        }
                        Err(e) => error!("Failed to record event for {}: {}", path.display(), e),
                    },
                    Err(mpsc::RecvTimeoutError::Timeout) => continue,
                    Err(mpsc::RecvTimeoutError::Disconnected) => {
                        debug!("Watch channel for {} disconnected", root_for_task.display());
                        return;
                    }
                }
            }
        })?;

    Ok(RootWatch {
        watcher,
        root: root.to_path_buf(),
        handle,
    })
}

fn root_name(root: &Path) -> String {
    root.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "root".to_string())
}
