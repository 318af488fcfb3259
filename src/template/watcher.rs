//! Document root watcher for template cache invalidation.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::template::cache::TemplateCache;

/// Watches the document root and evicts changed files from the cache.
pub struct DocumentWatcher {
    root: PathBuf,
    cache: TemplateCache,
}

impl DocumentWatcher {
    pub fn new(cache: TemplateCache) -> Self {
        Self {
            root: cache.root().to_path_buf(),
            cache,
        }
    }

    /// Start watching on notify's background thread. The returned watcher
    /// must be kept alive; dropping it stops the watch.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let root = self.root.clone();
        let handler = Self {
            root: self.root.clone(),
            cache: self.cache.clone(),
        };

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    handler.apply_event(&event);
                }
                Err(e) => tracing::error!(error = ?e, "Document watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&root, RecursiveMode::Recursive)?;

        tracing::info!(root = %root.display(), "Document watcher started");
        Ok(watcher)
    }

    /// Invalidate the cache for every relevant path in `event`.
    /// Returns how many cache entries were dropped.
    pub fn apply_event(&self, event: &Event) -> usize {
        if !matches!(
            event.kind,
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
        ) {
            return 0;
        }

        let mut removed = 0;
        for path in &event.paths {
            if self.is_ignored(path) {
                continue;
            }
            tracing::debug!(path = %path.display(), kind = ?event.kind, "Document changed");
            removed += self.cache.invalidate(path);
        }
        removed
    }

    /// Editor temp files, backups and dot-files are not templates.
    pub fn is_ignored(&self, path: &Path) -> bool {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);

        let name = relative
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        if name.ends_with(".temp") || name.ends_with('~') {
            return true;
        }

        relative.components().any(|c| match c {
            Component::Normal(part) => part.to_str().is_some_and(|s| s.starts_with('.')),
            _ => false,
        })
    }
}
