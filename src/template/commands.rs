//! Command registry and built-in commands.
//!
//! A command receives the parsed invocation and returns either final text
//! or template text that the engine expands one level deeper.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::template::cache::TemplateCache;
use crate::template::context::{RenderContext, ServerInfo};
use crate::template::scanner::{split_else, Invocation};
use crate::template::TemplateError;

/// What a command produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expansion {
    /// Inserted as-is.
    Text(String),
    /// Expanded again before insertion.
    Template(String),
}

/// Everything a command may read while executing.
#[derive(Debug, Clone, Copy)]
pub struct CommandScope<'a> {
    pub context: &'a RenderContext,
    pub cache: &'a TemplateCache,
    pub server: &'a ServerInfo,
    /// Current expansion depth, 0 for the outermost template.
    pub depth: usize,
}

pub trait Command: Send + Sync {
    fn execute(&self, invocation: &Invocation<'_>, scope: &CommandScope<'_>) -> Result<Expansion, TemplateError>;
}

impl<F> Command for F
where
    F: Fn(&Invocation<'_>, &CommandScope<'_>) -> Result<Expansion, TemplateError> + Send + Sync,
{
    fn execute(&self, invocation: &Invocation<'_>, scope: &CommandScope<'_>) -> Result<Expansion, TemplateError> {
        self(invocation, scope)
    }
}

/// Name → command mapping, filled at startup.
#[derive(Clone, Default)]
pub struct CommandRegistry {
    commands: HashMap<String, Arc<dyn Command>>,
}

impl CommandRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding `if`, `renderPartial`, `getPathFor`,
    /// `getServerPort` and `getCurrentConnections`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("if", If);
        registry.register("renderPartial", RenderPartial);
        registry.register("getPathFor", GetPathFor);
        registry.register("getServerPort", GetServerPort);
        registry.register("getCurrentConnections", GetCurrentConnections);
        registry
    }

    /// Add or replace a command.
    pub fn register<C>(&mut self, name: impl Into<String>, command: C) -> &mut Self
    where
        C: Command + 'static,
    {
        let name = name.into();
        if self.commands.insert(name.clone(), Arc::new(command)).is_some() {
            tracing::debug!(command = %name, "Command replaced");
        }
        self
    }

    pub fn register_fn<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&Invocation<'_>, &CommandScope<'_>) -> Result<Expansion, TemplateError> + Send + Sync + 'static,
    {
        self.register(name, f)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Command>> {
        self.commands.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.names())
            .finish()
    }
}

/// `{{if(isGuest) yes else no}}`, also `{{if isLoggedIn yes}}`.
#[derive(Debug, Clone, Copy)]
pub struct If;

impl Command for If {
    fn execute(&self, invocation: &Invocation<'_>, scope: &CommandScope<'_>) -> Result<Expansion, TemplateError> {
        let (condition, content) = match invocation.args {
            Some(args) => (args, invocation.body),
            None => match invocation.body.split_once(char::is_whitespace) {
                Some((condition, rest)) => (condition, rest.trim_start()),
                None => (invocation.body, ""),
            },
        };
        if condition.is_empty() {
            return Err(TemplateError::MissingArgument { command: "if" });
        }

        let (when_true, when_false) = split_else(content);
        let branch = if evaluate(condition, scope.context) {
            when_true
        } else {
            when_false.unwrap_or("")
        };
        Ok(Expansion::Template(branch.to_string()))
    }
}

fn evaluate(condition: &str, context: &RenderContext) -> bool {
    let condition: String = condition.chars().filter(|c| !c.is_whitespace()).collect();
    let condition = condition.strip_suffix("()").unwrap_or(&condition);
    match condition {
        "isLoggedIn" => context.is_logged_in(),
        "isGuest" => !context.is_logged_in(),
        other => {
            tracing::warn!(condition = other, "Unknown condition, treating as false");
            false
        }
    }
}

/// `{{renderPartial("_body.html")}}`
#[derive(Debug, Clone, Copy)]
pub struct RenderPartial;

impl Command for RenderPartial {
    fn execute(&self, invocation: &Invocation<'_>, scope: &CommandScope<'_>) -> Result<Expansion, TemplateError> {
        let name = first_argument(invocation, "renderPartial")?;
        let source = scope.cache.load(&name)?;
        Ok(Expansion::Template(source.to_string()))
    }
}

/// `{{getPathFor("css/main.css")}}`
#[derive(Debug, Clone, Copy)]
pub struct GetPathFor;

impl Command for GetPathFor {
    fn execute(&self, invocation: &Invocation<'_>, scope: &CommandScope<'_>) -> Result<Expansion, TemplateError> {
        let path = first_argument(invocation, "getPathFor")?;
        Ok(Expansion::Text(scope.server.path_for(&path)))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GetServerPort;

impl Command for GetServerPort {
    fn execute(&self, _: &Invocation<'_>, scope: &CommandScope<'_>) -> Result<Expansion, TemplateError> {
        Ok(Expansion::Text(scope.server.port.to_string()))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GetCurrentConnections;

impl Command for GetCurrentConnections {
    fn execute(&self, _: &Invocation<'_>, scope: &CommandScope<'_>) -> Result<Expansion, TemplateError> {
        Ok(Expansion::Text(scope.server.connections.active_count().to_string()))
    }
}

fn first_argument(invocation: &Invocation<'_>, command: &'static str) -> Result<String, TemplateError> {
    invocation
        .arguments()
        .into_iter()
        .next()
        .filter(|arg| !arg.is_empty())
        .ok_or(TemplateError::MissingArgument { command })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Session;
    use crate::net::ConnectionTracker;
    use crate::template::scanner::parse_invocation;

    struct Fixture {
        cache: TemplateCache,
        server: ServerInfo,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("nav.html"), "<nav>{{getServerPort}}</nav>").unwrap();
        Fixture {
            cache: TemplateCache::new(dir.path(), true),
            server: ServerInfo {
                port: 8080,
                public_url: "http://example.test/".into(),
                connections: ConnectionTracker::new(),
            },
            _dir: dir,
        }
    }

    fn run(fx: &Fixture, ctx: &RenderContext, text: &str) -> Result<Expansion, TemplateError> {
        let registry = CommandRegistry::with_builtins();
        let invocation = parse_invocation(text).unwrap();
        let scope = CommandScope {
            context: ctx,
            cache: &fx.cache,
            server: &fx.server,
            depth: 0,
        };
        registry.get(invocation.name).unwrap().execute(&invocation, &scope)
    }

    fn logged_in() -> RenderContext {
        RenderContext::new().with_session(Some(Session {
            user_id: "1".into(),
            token: "t".into(),
        }))
    }

    #[test]
    fn test_if_branches() {
        let fx = fixture();
        let guest = RenderContext::new();
        let text = "if(isGuest) Hello Guest else Hello User";
        assert_eq!(run(&fx, &guest, text).unwrap(), Expansion::Template("Hello Guest".into()));
        assert_eq!(run(&fx, &logged_in(), text).unwrap(), Expansion::Template("Hello User".into()));
    }

    #[test]
    fn test_if_without_parentheses_and_else() {
        let fx = fixture();
        let text = "if isLoggedIn() welcome back";
        assert_eq!(run(&fx, &logged_in(), text).unwrap(), Expansion::Template("welcome back".into()));
        assert_eq!(run(&fx, &RenderContext::new(), text).unwrap(), Expansion::Template(String::new()));
    }

    #[test]
    fn test_if_unknown_condition_is_false() {
        let fx = fixture();
        let result = run(&fx, &logged_in(), "if(isAdmin) yes else no").unwrap();
        assert_eq!(result, Expansion::Template("no".into()));
    }

    #[test]
    fn test_render_partial_returns_template_source() {
        let fx = fixture();
        let result = run(&fx, &RenderContext::new(), r#"renderPartial("nav.html")"#).unwrap();
        assert_eq!(result, Expansion::Template("<nav>{{getServerPort}}</nav>".into()));

        let err = run(&fx, &RenderContext::new(), "renderPartial()").unwrap_err();
        assert!(matches!(err, TemplateError::MissingArgument { command: "renderPartial" }));
    }

    #[test]
    fn test_introspection() {
        let fx = fixture();
        let _a = fx.server.connections.track();
        let _b = fx.server.connections.track();
        let ctx = RenderContext::new();
        assert_eq!(run(&fx, &ctx, "getServerPort").unwrap(), Expansion::Text("8080".into()));
        assert_eq!(run(&fx, &ctx, "getCurrentConnections").unwrap(), Expansion::Text("2".into()));
        assert_eq!(
            run(&fx, &ctx, r#"getPathFor("login")"#).unwrap(),
            Expansion::Text("http://example.test/login".into())
        );
    }

    #[test]
    fn test_register_fn() {
        let mut registry = CommandRegistry::new();
        registry.register_fn("shout", |inv, _| Ok(Expansion::Text(inv.body.to_uppercase())));
        assert!(registry.contains("shout"));
        assert_eq!(registry.names(), vec!["shout"]);
    }
}
