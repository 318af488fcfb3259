//! File-backed template cache.
//!
//! Entries are keyed by resolved path. The cache is cheap to clone; clones
//! share the same entries so the document watcher can invalidate what
//! request handlers read.

use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::template::TemplateError;

#[derive(Debug, Clone)]
pub struct TemplateCache {
    root: PathBuf,
    entries: Arc<DashMap<PathBuf, Arc<str>>>,
    /// Bumped by every invalidation.
    generation: Arc<AtomicU64>,
    enabled: bool,
}

impl TemplateCache {
    pub fn new(root: impl Into<PathBuf>, enabled: bool) -> Self {
        let root = root.into();
        let root = root.canonicalize().unwrap_or(root);
        Self {
            root,
            entries: Arc::new(DashMap::new()),
            generation: Arc::new(AtomicU64::new(0)),
            enabled,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Map a logical template name to a path under the root.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, TemplateError> {
        let mut path = self.root.clone();
        for component in Path::new(name.trim_start_matches('/')).components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {}
                _ => return Err(TemplateError::InvalidPath(name.to_string())),
            }
        }
        Ok(path)
    }

    /// Load a template by logical name.
    pub fn load(&self, name: &str) -> Result<Arc<str>, TemplateError> {
        let path = self.resolve(name)?;
        self.load_path(&path)
    }

    /// Load a template by resolved path.
    pub fn load_path(&self, path: &Path) -> Result<Arc<str>, TemplateError> {
        if self.enabled {
            if let Some(hit) = self.entries.get(path) {
                return Ok(hit.value().clone());
            }
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let source: Arc<str> = std::fs::read_to_string(path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => TemplateError::NotFound(path.to_path_buf()),
                _ => TemplateError::Io {
                    path: path.to_path_buf(),
                    source: e,
                },
            })?
            .into();

        if self.enabled {
            self.store(path, source.clone(), generation);
        }
        Ok(source)
    }

    /// Cache `source`, read while the cache was at `generation`. If an
    /// invalidation ran since, the entry is withdrawn again: the file may
    /// have changed after it was read.
    fn store(&self, path: &Path, source: Arc<str>, generation: u64) {
        self.entries.insert(path.to_path_buf(), source.clone());
        if self.generation.load(Ordering::SeqCst) != generation {
            self.entries
                .remove_if(path, |_, cached| Arc::ptr_eq(cached, &source));
            tracing::trace!(path = %path.display(), "Template changed while loading, not cached");
            return;
        }
        tracing::trace!(path = %path.display(), "Template cached");
    }

    /// Drop `path` and every entry beneath it. Returns how many were removed.
    pub fn invalidate(&self, path: &Path) -> usize {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(path));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            tracing::debug!(path = %path.display(), removed, "Template cache invalidated");
        }
        removed
    }

    pub fn clear(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.entries.clear();
    }
}
