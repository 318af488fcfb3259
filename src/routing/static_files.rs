//! Static file resolution under the document root.
//!
//! # Responsibilities
//! - Map a request path to a file below the document root
//! - Reject traversal (`..`, absolute components, symlinks leaving the root)
//! - Map `/` and directories to their `index.html`
//! - Classify files as templates (HTML) or plain assets

use std::path::{Component, Path, PathBuf};

/// A resolved static file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaticFile {
    /// HTML, expanded by the template engine before sending.
    Template(PathBuf),
    /// Any other file, streamed as-is.
    Asset {
        path: PathBuf,
        len: u64,
        content_type: &'static str,
    },
}

#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
}

impl StaticFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = root.canonicalize().unwrap_or(root);
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a (percent-encoded) request path.
    pub fn resolve(&self, request_path: &str) -> Option<StaticFile> {
        let decoded = urlencoding::decode(request_path).ok()?;
        let mut path = self.map_path(&decoded)?;

        if path.is_dir() {
            path.push("index.html");
        }
        let metadata = std::fs::metadata(&path).ok()?;
        if !metadata.is_file() {
            return None;
        }

        let canonical = path.canonicalize().ok()?;
        if !canonical.starts_with(&self.root) {
            tracing::warn!(path = %request_path, "Static path escapes document root");
            return None;
        }

        if is_html(&canonical) {
            Some(StaticFile::Template(canonical))
        } else {
            Some(StaticFile::Asset {
                content_type: content_type(&canonical),
                path: canonical,
                len: metadata.len(),
            })
        }
    }

    fn map_path(&self, url_path: &str) -> Option<PathBuf> {
        if url_path.contains('\0') || url_path.contains('\\') {
            return None;
        }
        let mut pb = self.root.clone();
        for comp in Path::new(url_path.trim_start_matches('/')).components() {
            match comp {
                Component::Normal(s) => pb.push(s),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(pb)
    }
}

fn is_html(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|s| s.to_str()).map(str::to_ascii_lowercase).as_deref(),
        Some("html" | "htm")
    )
}

/// Content type by file extension.
pub fn content_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
        .as_str()
    {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "application/javascript; charset=utf-8",
        "json" => "application/json",
        "txt" => "text/plain; charset=utf-8",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}
