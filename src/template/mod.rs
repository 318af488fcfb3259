//! Template subsystem.
//!
//! # Data Flow
//! ```text
//! Template source (file via cache, or string)
//!     → scanner.rs (split into text and {{ ... }} placeholders)
//!     → engine.rs (resolve each placeholder)
//!         → commands.rs (registered command: Text or Template expansion)
//!         → context.rs (bare name: render variable)
//!         → otherwise: empty string + warning
//!     → Template expansions re-enter the engine one level deeper
//!     → Rendered String
//!
//! File change (watcher.rs, own thread)
//!     → cache.rs invalidate(path)
//! ```
//!
//! # Design Decisions
//! - Rendering never fails because of a single placeholder; failures are
//!   logged and replaced with an empty string
//! - Recursion is bounded by `max_depth`
//! - Variables are inserted verbatim and never expanded again

pub mod cache;
pub mod commands;
pub mod context;
pub mod engine;
pub mod scanner;
pub mod watcher;

use std::path::PathBuf;

pub use cache::TemplateCache;
pub use commands::{Command, CommandRegistry, CommandScope, Expansion};
pub use context::{RenderContext, ServerInfo, BODY_CONTENT};
pub use engine::TemplateEngine;
pub use scanner::Invocation;
pub use watcher::DocumentWatcher;

/// Template loading and command errors.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("template not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read template {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid template path '{0}'")]
    InvalidPath(String),

    #[error("{command} requires an argument")]
    MissingArgument { command: &'static str },
}

impl TemplateError {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            TemplateError::NotFound(_) => "not_found",
            TemplateError::Io { .. } => "io",
            TemplateError::InvalidPath(_) => "invalid_path",
            TemplateError::MissingArgument { .. } => "missing_argument",
        }
    }
}
