//! Debounced project watcher
//!
//! Filesystem notifications arrive on a notify callback thread and are
//! forwarded over a channel to a pump task. Each path gets its own timer;
//! a new event for the same path cancels the pending timer and starts over,
//! so a burst of saves produces one extraction.

use super::patterns;
use super::AutoExtractor;
use crate::autopilot::events::AutopilotEvent;
use crate::error::Result;
use crate::metrics::METRICS;
use dashmap::DashMap;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Per-path cancel-and-replace timers feeding the extractor
pub struct Debouncer {
    extractor: Arc<AutoExtractor>,
    pending: DashMap<PathBuf, (u64, JoinHandle<()>)>,
    next_id: AtomicU64,
}

impl Debouncer {
    pub fn new(extractor: Arc<AutoExtractor>) -> Self {
        Self {
            extractor,
            pending: DashMap::new(),
            next_id: AtomicU64::new(0),
        }
    }

    /// Schedule extraction of `path` after the quiet period
    pub fn schedule(self: &Arc<Self>, path: PathBuf) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let delay = self.extractor.config().debounce;
        let this = Arc::clone(self);
        let task_path = path.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Only the newest timer for a path may fire
            if this
                .pending
                .remove_if(&task_path, |_, (pending_id, _)| *pending_id == id)
                .is_none()
            {
                return;
            }
            this.extractor.process_file(&task_path).await;
        });

        if let Some((_, previous)) = self.pending.insert(path, (id, handle)) {
            previous.abort();
            METRICS.debounced_events.inc();
        }
    }

    /// Paths with a timer still waiting
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Cancel every pending timer
    pub fn cancel_all(&self) {
        self.pending.retain(|_, (_, handle)| {
            handle.abort();
            false
        });
    }
}

/// Running watcher over a set of project paths
pub struct ProjectWatcher {
    watcher: Option<RecommendedWatcher>,
    paths: Vec<PathBuf>,
    pump: Option<JoinHandle<()>>,
    debouncer: Arc<Debouncer>,
}

impl ProjectWatcher {
    /// Start watching the given targets.
    ///
    /// A target that cannot be watched is reported and skipped; the watcher
    /// still runs for the rest.
    pub fn start(
        extractor: Arc<AutoExtractor>,
        targets: Vec<(PathBuf, RecursiveMode)>,
    ) -> Result<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            // Receiver is gone once the watcher is closed
            let _ = tx.send(res);
        })?;

        let events = extractor.events().clone();
        let mut paths = Vec::new();
        for (path, mode) in targets {
            match watcher.watch(&path, mode) {
                Ok(()) => paths.push(path),
                Err(e) => {
                    warn!("Failed to watch {}: {}", path.display(), e);
                    events.emit(AutopilotEvent::WatcherError {
                        path: Some(path),
                        error: e.to_string(),
                    });
                }
            }
        }
        info!("Watching {} paths", paths.len());

        // Notify may report canonical paths, so roots are compared the same way
        let roots: Vec<PathBuf> = paths
            .iter()
            .map(|p| std::fs::canonicalize(p).unwrap_or_else(|_| p.clone()))
            .collect();

        let debouncer = Arc::new(Debouncer::new(extractor));
        let pump_debouncer = Arc::clone(&debouncer);
        let pump = tokio::spawn(async move {
            while let Some(res) = rx.recv().await {
                match res {
                    Ok(event) => {
                        if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                            continue;
                        }
                        for path in event.paths {
                            // A deleted file can no longer be canonicalized
                            let path = tokio::fs::canonicalize(&path).await.unwrap_or(path);
                            if should_process(&path, &roots) {
                                debug!("Change detected: {}", path.display());
                                pump_debouncer.schedule(path);
                            }
                        }
                    }
                    Err(e) => {
                        warn!("Watcher error: {}", e);
                        events.emit(AutopilotEvent::WatcherError {
                            path: e.paths.first().cloned(),
                            error: e.to_string(),
                        });
                    }
                }
            }
        });

        Ok(Self {
            watcher: Some(watcher),
            paths,
            pump: Some(pump),
            debouncer,
        })
    }

    pub fn watched_paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn pending_count(&self) -> usize {
        self.debouncer.pending_count()
    }

    /// Stop receiving notifications and cancel pending extractions
    pub fn close(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            for path in &self.paths {
                let _ = watcher.unwatch(path);
            }
        }
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        self.debouncer.cancel_all();
    }
}

impl Drop for ProjectWatcher {
    fn drop(&mut self) {
        self.close();
    }
}

/// Changed paths worth re-extracting.
///
/// Ignored directories are only looked for below the watch root containing
/// `path`, so a project checked out under e.g. `~/build/` is still watched.
fn should_process(path: &Path, roots: &[PathBuf]) -> bool {
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.') || n.ends_with('~'))
        .unwrap_or(true);
    let relative = roots
        .iter()
        .filter_map(|root| path.strip_prefix(root).ok())
        .min_by_key(|rel| rel.components().count())
        .unwrap_or(path);
    !hidden && !patterns::in_ignored_dir(relative) && patterns::is_relevant_file(path)
}
