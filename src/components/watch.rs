//! Source-tree watcher.
//!
//! Wraps a recursive `notify` watcher on the app directory. Every relevant
//! filesystem event bumps a revision counter; waiters compare against the
//! revision they started from, so a change that lands while the app is
//! running is still seen by the wait that follows the run.
//!
//! Paths with a dot-prefixed component below the root (including the
//! session state directory) never count as changes.

use std::path::{Component as PathComponent, Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

/// Position in the stream of source changes.
pub type Revision = u64;

/// Detects changes below a root directory.
pub struct SourceWatcher {
    revisions: watch::Receiver<Revision>,
    debounce: Duration,
    // Event delivery ends when the watcher is dropped.
    _watcher: Mutex<RecommendedWatcher>,
}

impl std::fmt::Debug for SourceWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceWatcher")
            .field("revision", &self.revision())
            .field("debounce", &self.debounce)
            .finish()
    }
}

impl SourceWatcher {
    /// Starts watching `root` recursively.
    ///
    /// `debounce` is the quiet period after a change before a wait returns,
    /// so a burst of saves is reported once.
    pub fn new(root: impl Into<PathBuf>, debounce: Duration) -> notify::Result<Self> {
        let root = root.into();
        let roots = Roots::new(&root);
        let (tx, rx) = watch::channel(0);
        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
                Ok(event) if roots.is_source_change(&event) => {
                    trace!(paths = ?event.paths, "source change");
                    tx.send_modify(|rev| *rev += 1);
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "source watcher error"),
            })?;
        watcher.watch(&root, RecursiveMode::Recursive)?;
        Ok(Self {
            revisions: rx,
            debounce,
            _watcher: Mutex::new(watcher),
        })
    }

    /// Latest revision seen so far.
    pub fn revision(&self) -> Revision {
        *self.revisions.borrow()
    }

    /// Waits until the tree changed after `since`.
    ///
    /// Returns the revision after the debounce period, or `None` if `token`
    /// was cancelled first.
    pub async fn wait_for_change(
        &self,
        since: Revision,
        token: &CancellationToken,
    ) -> Option<Revision> {
        let mut rx = self.revisions.clone();
        loop {
            if *rx.borrow_and_update() > since {
                break;
            }
            tokio::select! {
                _ = token.cancelled() => return None,
                res = rx.changed() => {
                    if res.is_err() {
                        return None;
                    }
                }
            }
        }
        tokio::select! {
            _ = token.cancelled() => None,
            _ = tokio::time::sleep(self.debounce) => Some(*rx.borrow()),
        }
    }
}

/// The watched root as given and as resolved by the OS.
struct Roots(Vec<PathBuf>);

impl Roots {
    fn new(root: &Path) -> Self {
        let mut roots = vec![root.to_path_buf()];
        if let Ok(resolved) = std::fs::canonicalize(root)
            && resolved != root
        {
            roots.push(resolved);
        }
        Self(roots)
    }

    fn is_source_change(&self, event: &notify::Event) -> bool {
        if matches!(event.kind, EventKind::Access(_)) {
            return false;
        }
        event.need_rescan() || event.paths.iter().any(|p| !self.is_hidden(p))
    }

    fn is_hidden(&self, path: &Path) -> bool {
        let Some(rel) = self.0.iter().find_map(|r| path.strip_prefix(r).ok()) else {
            return false;
        };
        rel.components().any(|c| match c {
            PathComponent::Normal(name) => name.to_string_lossy().starts_with('.'),
            _ => false,
        })
    }
}
