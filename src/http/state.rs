//! Shared, read-only application state handed to every handler.

use std::sync::{Arc, OnceLock};

use http::StatusCode;

use crate::auth::{MemoryCredentials, TokenAuthority};
use crate::config::ServerConfig;
use crate::http::error::HandlerError;
use crate::http::request::HttpRequest;
use crate::http::response::HttpResponse;
use crate::net::ConnectionTracker;
use crate::persistence::Database;
use crate::template::{RenderContext, TemplateEngine};

/// Page shell every HTML view is assembled into.
pub const BASE_TEMPLATE: &str = "_base.html";

#[derive(Clone)]
pub struct AppState {
    config: Arc<ServerConfig>,
    templates: Arc<TemplateEngine>,
    connections: ConnectionTracker,
    tokens: TokenAuthority,
    database: Arc<OnceLock<Arc<dyn Database>>>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("connections", &self.connections)
            .field("tokens", &self.tokens)
            .field("database", &self.database.get().is_some())
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(
        config: Arc<ServerConfig>,
        templates: Arc<TemplateEngine>,
        connections: ConnectionTracker,
        tokens: TokenAuthority,
    ) -> Self {
        Self {
            config,
            templates,
            connections,
            tokens,
            database: Arc::new(OnceLock::new()),
        }
    }

    /// State built entirely from configuration: built-in commands and the
    /// in-memory credential store seeded from `auth.users`.
    pub fn from_config(config: ServerConfig, connections: ConnectionTracker) -> Self {
        let templates = TemplateEngine::from_config(&config, connections.clone());
        let credentials = MemoryCredentials::from_accounts(&config.auth.secret, &config.auth.users);
        let tokens = TokenAuthority::from_config(&config.auth, Arc::new(credentials));
        Self::new(Arc::new(config), Arc::new(templates), connections, tokens)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn templates(&self) -> &TemplateEngine {
        &self.templates
    }

    pub fn connections(&self) -> &ConnectionTracker {
        &self.connections
    }

    pub fn tokens(&self) -> &TokenAuthority {
        &self.tokens
    }

    /// Attach the persistence backend. Only the first call wins.
    pub fn attach_database(&self, database: Arc<dyn Database>) -> bool {
        self.database.set(database).is_ok()
    }

    /// The attached backend, or 503 when the server runs without one.
    pub fn database(&self) -> Result<&dyn Database, HandlerError> {
        self.database
            .get()
            .map(|db| &**db)
            .ok_or_else(|| HandlerError::client(StatusCode::SERVICE_UNAVAILABLE, "No database attached"))
    }

    /// Render context for `request`: its parameters and session.
    pub fn render_context(&self, request: &HttpRequest) -> RenderContext {
        RenderContext::from_request(request)
    }

    /// Render `partial` inside the base page.
    pub fn page(&self, partial: &str, context: &RenderContext) -> Result<HttpResponse, HandlerError> {
        let html = self.templates.assemble_page(BASE_TEMPLATE, partial, context)?;
        Ok(HttpResponse::html(StatusCode::OK, html))
    }

    /// Wrap already rendered `content` in the base page.
    pub fn page_with_content(
        &self,
        status: StatusCode,
        content: &str,
        context: &RenderContext,
    ) -> Result<HttpResponse, HandlerError> {
        let html = self
            .templates
            .assemble_page_with_content(BASE_TEMPLATE, content, context)?;
        Ok(HttpResponse::html(status, html))
    }
}
