//! Template expansion.

use std::path::Path;

use crate::config::ServerConfig;
use crate::net::ConnectionTracker;
use crate::observability::metrics;
use crate::template::cache::TemplateCache;
use crate::template::commands::{CommandRegistry, CommandScope, Expansion};
use crate::template::context::{RenderContext, ServerInfo, BODY_CONTENT};
use crate::template::scanner::{parse_invocation, scan, Piece};
use crate::template::TemplateError;

/// Nested expansions (branches and partials) allowed in one render. Depth
/// alone does not bound a partial that includes itself more than once.
pub const DEFAULT_EXPANSION_BUDGET: usize = 4096;

#[derive(Debug, Clone)]
pub struct TemplateEngine {
    commands: CommandRegistry,
    cache: TemplateCache,
    server: ServerInfo,
    max_depth: usize,
    expansion_budget: usize,
}

impl TemplateEngine {
    pub fn new(commands: CommandRegistry, cache: TemplateCache, server: ServerInfo, max_depth: usize) -> Self {
        Self {
            commands,
            cache,
            server,
            max_depth,
            expansion_budget: DEFAULT_EXPANSION_BUDGET,
        }
    }

    /// Engine with the built-in commands, configured from `config`.
    pub fn from_config(config: &ServerConfig, connections: ConnectionTracker) -> Self {
        Self::new(
            CommandRegistry::with_builtins(),
            TemplateCache::new(&config.documents.root, config.templates.cache_enabled),
            ServerInfo {
                port: config.port().unwrap_or_default(),
                public_url: config.listener.public_url.clone(),
                connections,
            },
            config.templates.max_depth,
        )
    }

    /// Replace the command registry.
    pub fn with_commands(mut self, commands: CommandRegistry) -> Self {
        self.commands = commands;
        self
    }

    pub fn commands(&self) -> &CommandRegistry {
        &self.commands
    }

    pub fn cache(&self) -> &TemplateCache {
        &self.cache
    }

    pub fn server(&self) -> &ServerInfo {
        &self.server
    }

    /// Update the advertised port once the listener is bound.
    pub fn set_port(&mut self, port: u16) {
        self.server.port = port;
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn with_expansion_budget(mut self, budget: usize) -> Self {
        self.expansion_budget = budget;
        self
    }

    /// Expand `source`. Never fails; broken placeholders render empty.
    pub fn render(&self, source: &str, context: &RenderContext) -> String {
        let mut out = String::with_capacity(source.len());
        let mut budget = self.expansion_budget;
        self.expand(source, context, 0, &mut budget, &mut out);
        out
    }

    /// Load and expand a template by logical name.
    pub fn render_file(&self, name: &str, context: &RenderContext) -> Result<String, TemplateError> {
        let source = self.cache.load(name)?;
        Ok(self.render(&source, context))
    }

    /// Load and expand a template by resolved path.
    pub fn render_path(&self, path: &Path, context: &RenderContext) -> Result<String, TemplateError> {
        let source = self.cache.load_path(path)?;
        Ok(self.render(&source, context))
    }

    /// Render `partial`, then `base` with the result bound to `_BODY_CONTENT_`.
    pub fn assemble_page(&self, base: &str, partial: &str, context: &RenderContext) -> Result<String, TemplateError> {
        let content = self.render_file(partial, context)?;
        self.assemble_page_with_content(base, &content, context)
    }

    /// Render `base` with pre-rendered `content` bound to `_BODY_CONTENT_`.
    pub fn assemble_page_with_content(
        &self,
        base: &str,
        content: &str,
        context: &RenderContext,
    ) -> Result<String, TemplateError> {
        let context = context.clone().with(BODY_CONTENT, content);
        self.render_file(base, &context)
    }

    fn expand(&self, source: &str, context: &RenderContext, depth: usize, budget: &mut usize, out: &mut String) {
        for piece in scan(source) {
            match piece {
                Piece::Text(text) => out.push_str(text),
                Piece::Placeholder { raw, inner } => self.resolve(raw, inner, context, depth, budget, out),
            }
        }
    }

    fn resolve(
        &self,
        raw: &str,
        inner: &str,
        context: &RenderContext,
        depth: usize,
        budget: &mut usize,
        out: &mut String,
    ) {
        let Some(invocation) = parse_invocation(inner) else {
            out.push_str(raw);
            return;
        };

        if let Some(command) = self.commands.get(invocation.name) {
            let scope = CommandScope {
                context,
                cache: &self.cache,
                server: &self.server,
                depth,
            };
            match command.execute(&invocation, &scope) {
                Ok(Expansion::Text(text)) => out.push_str(&text),
                Ok(Expansion::Template(_)) if depth >= self.max_depth => {
                    tracing::error!(
                        command = invocation.name,
                        max_depth = self.max_depth,
                        "Template recursion limit reached"
                    );
                    metrics::record_template_error("depth");
                }
                Ok(Expansion::Template(_)) if *budget == 0 => {
                    tracing::error!(
                        command = invocation.name,
                        budget = self.expansion_budget,
                        "Template expansion budget exhausted"
                    );
                    metrics::record_template_error("budget");
                }
                Ok(Expansion::Template(text)) => {
                    *budget -= 1;
                    self.expand(&text, context, depth + 1, budget, out)
                }
                Err(e) => {
                    tracing::warn!(command = invocation.name, error = %e, "Template command failed");
                    metrics::record_template_error(e.kind());
                }
            }
            return;
        }

        if invocation.is_bare() {
            if let Some(value) = context.get(invocation.name) {
                out.push_str(value);
                return;
            }
        }

        tracing::warn!(placeholder = invocation.name, "Unknown template command or variable");
        metrics::record_template_error("unknown");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Session;
    use std::fs;

    fn engine(dir: &Path, max_depth: usize) -> TemplateEngine {
        TemplateEngine::new(
            CommandRegistry::with_builtins(),
            TemplateCache::new(dir, true),
            ServerInfo {
                port: 15000,
                public_url: "http://localhost:15000/".into(),
                connections: ConnectionTracker::new(),
            },
            max_depth,
        )
    }

    fn session() -> Option<Session> {
        Some(Session {
            user_id: "1".into(),
            token: "t".into(),
        })
    }

    #[test]
    fn test_conditional_follows_session() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), 32);
        let source = "{{if(isGuest) Hello Guest else Hello User}}";

        assert_eq!(engine.render(source, &RenderContext::new()), "Hello Guest");
        assert_eq!(engine.render(source, &RenderContext::new().with_session(session())), "Hello User");
    }

    #[test]
    fn test_unknown_command_renders_empty() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), 32);
        assert_eq!(engine.render("a{{unknownCmd(foo)}}b{{getServerPort}}", &RenderContext::new()), "ab15000");
        assert_eq!(engine.render("[{{nobody}}]", &RenderContext::new()), "[]");
    }

    #[test]
    fn test_unparseable_placeholder_kept() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), 32);
        assert_eq!(engine.render("x {{ !! }} y", &RenderContext::new()), "x {{ !! }} y");
    }

    #[test]
    fn test_variables_not_reexpanded() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), 32);
        let ctx = RenderContext::new().with("name", "{{getServerPort}}");
        assert_eq!(engine.render("hi {{name}}", &ctx), "hi {{getServerPort}}");
    }

    #[test]
    fn test_nested_commands() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("user.html"), "user on {{getServerPort}}").unwrap();
        let engine = engine(dir.path(), 32);
        let source = r#"{{if(isLoggedIn) {{renderPartial("user.html")}} else guest}}"#;
        assert_eq!(engine.render(source, &RenderContext::new().with_session(session())), "user on 15000");
        assert_eq!(engine.render(source, &RenderContext::new()), "guest");
    }

    #[test]
    fn test_self_including_partial_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("loop.html"), r#"x{{renderPartial("loop.html")}}"#).unwrap();
        let engine = engine(dir.path(), 4);

        let rendered = engine.render_file("loop.html", &RenderContext::new()).unwrap();
        assert_eq!(rendered, "xxxxx");

        let page = engine.render(r#"<p>{{renderPartial("loop.html")}}</p>done"#, &RenderContext::new());
        assert!(page.starts_with("<p>x"));
        assert!(page.ends_with("</p>done"));
    }

    #[test]
    fn test_fan_out_is_bounded_by_budget() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("fork.html"),
            r#"x{{renderPartial("fork.html")}}{{renderPartial("fork.html")}}"#,
        )
        .unwrap();
        let engine = engine(dir.path(), 32).with_expansion_budget(100);

        let rendered = engine.render_file("fork.html", &RenderContext::new()).unwrap();
        assert_eq!(rendered.matches('x').count(), 101);

        // The budget is per render, not per engine.
        let again = engine.render_file("fork.html", &RenderContext::new()).unwrap();
        assert_eq!(again, rendered);
    }

    #[test]
    fn test_missing_partial_renders_empty() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), 32);
        assert_eq!(engine.render(r#"a{{renderPartial("nope.html")}}b"#, &RenderContext::new()), "ab");
    }

    #[test]
    fn test_assemble_page() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("_base.html"), "<main>{{_BODY_CONTENT_}}</main>").unwrap();
        fs::write(dir.path().join("_home.html"), "{{if(isGuest) welcome {{who}}}}").unwrap();
        let engine = engine(dir.path(), 32);
        let ctx = RenderContext::new().with("who", "ana");

        assert_eq!(engine.assemble_page("_base.html", "_home.html", &ctx).unwrap(), "<main>welcome ana</main>");
        assert_eq!(
            engine.assemble_page_with_content("_base.html", "{{raw}}", &ctx).unwrap(),
            "<main>{{raw}}</main>"
        );
        assert!(matches!(
            engine.assemble_page("_missing.html", "_home.html", &ctx),
            Err(TemplateError::NotFound(_))
        ));
    }
}
