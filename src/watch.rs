//! Local document watcher: reload the viewer when the PDF on disk changes.
//!
//! notify delivers events on its own thread; they are forwarded over an
//! `mpsc` channel and collapsed when the viewer polls.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use log::debug;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};

/// Writers often touch a PDF several times while saving; wait this long
/// after the last event before reporting a change.
const SETTLE: Duration = Duration::from_millis(150);

pub struct DocumentWatcher {
    rx: mpsc::Receiver<()>,
    pending_since: Option<Instant>,
    _watcher: RecommendedWatcher, // Drop stops watching
}

impl DocumentWatcher {
    /// Watch `path` for writes and replacements.
    ///
    /// Editors and downloaders usually replace the file by rename, which
    /// drops an inode watch, so the parent directory is watched
    /// (non-recursive) and events are filtered by path.
    pub fn new(path: &Path) -> Result<Self> {
        let canonical = path
            .canonicalize()
            .with_context(|| format!("cannot watch {}", path.display()))?;
        let target: PathBuf = canonical.clone();
        let (tx, rx) = mpsc::channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| {
                let Ok(event) = res else {
                    return;
                };
                let relevant = matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_));
                if relevant && event.paths.iter().any(|p| p == &target) {
                    let _ = tx.send(());
                }
            },
            notify::Config::default(),
        )?;
        let parent = canonical
            .parent()
            .ok_or_else(|| anyhow::anyhow!("cannot watch root path"))?;
        watcher.watch(parent, RecursiveMode::NonRecursive)?;
        debug!("watch: watching {}", canonical.display());

        Ok(Self {
            rx,
            pending_since: None,
            _watcher: watcher,
        })
    }

    /// Non-blocking. Returns true once the file has been quiet for the
    /// settle period after one or more changes.
    pub fn poll_changed(&mut self) -> bool {
        let now = Instant::now();
        while self.rx.try_recv().is_ok() {
            self.pending_since = Some(now);
        }
        match self.pending_since {
            Some(since) if now.duration_since(since) >= SETTLE => {
                self.pending_since = None;
                true
            }
            _ => false,
        }
    }

    /// True while a change is waiting out the settle period.
    pub fn is_pending(&self) -> bool {
        self.pending_since.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn missing_file_is_an_error() {
        assert!(DocumentWatcher::new(Path::new("/nonexistent/folio/doc.pdf")).is_err());
    }

    #[test]
    fn reports_write_after_settling() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.pdf");
        std::fs::write(&path, b"v1").unwrap();
        let mut watcher = DocumentWatcher::new(&path).unwrap();
        assert!(!watcher.poll_changed());

        std::fs::write(&path, b"v2").unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut changed = false;
        while Instant::now() < deadline {
            if watcher.poll_changed() {
                changed = true;
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }
        assert!(changed, "write was not reported");
    }
}
