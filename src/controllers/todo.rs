//! Per-user todo list stored through the attached [`Database`].
//!
//! Every route needs a session; a user only ever sees and deletes their
//! own rows. Without an attached backend the routes answer 503.

use http::StatusCode;
use serde::Serialize;
use serde_json::Value;

use crate::auth::Session;
use crate::controllers::Controller;
use crate::http::api::ApiResponse;
use crate::http::error::HandlerError;
use crate::http::request::HttpRequest;
use crate::http::response::HttpResponse;
use crate::http::state::AppState;
use crate::persistence::{in_transaction, Database, PageRequest, Row, SortDirection, TransactionOptions};
use crate::routing::Route;

const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_CONTENT_LEN: usize = 1024;

#[derive(Debug, Default, Clone, Copy)]
pub struct TodoController;

impl Controller for TodoController {
    fn routes(&self) -> Vec<Route> {
        vec![
            Route::get("/api/v1/todos", list_todos).json().requires_session(),
            Route::post("/api/v1/todos", create_todo).json().requires_session(),
            Route::delete("/api/v1/todos/:id", delete_todo).json().requires_session(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Todo {
    pub id: i64,
    pub user_id: String,
    pub content: String,
    pub created_at: i64,
}

impl Todo {
    fn from_row(row: &Row) -> Option<Self> {
        Some(Self {
            id: row.get_i64("id")?,
            user_id: row.get("user_id").map(value_to_string)?,
            content: row.get_str("content")?.to_string(),
            created_at: row.get_i64("created_at").unwrap_or(0),
        })
    }
}

#[derive(Debug, Serialize)]
struct TodoPage {
    todos: Vec<Todo>,
    page: u32,
    size: u32,
    total_elements: u64,
    total_pages: u64,
    has_next: bool,
    has_previous: bool,
}

fn list_todos(request: &HttpRequest, state: &AppState) -> Result<HttpResponse, HandlerError> {
    let user = session(request)?;
    let page = page_request(request)?;
    let db = state.database()?;

    let page = in_transaction(db, TransactionOptions::read_only(), |db| {
        db.get_page(
            "SELECT id, user_id, content, created_at FROM TODO WHERE user_id = ?",
            &page,
            &[Value::from(user.user_id.as_str())],
        )
    })?;

    let body = TodoPage {
        page: page.request().page(),
        size: page.request().size(),
        total_elements: page.total_elements(),
        total_pages: page.total_pages(),
        has_next: page.has_next(),
        has_previous: page.has_previous(),
        todos: page.into_content().iter().filter_map(Todo::from_row).collect(),
    };
    Ok(ApiResponse::ok(body).into_response(StatusCode::OK))
}

fn create_todo(request: &HttpRequest, state: &AppState) -> Result<HttpResponse, HandlerError> {
    let user = session(request)?;
    let content = request
        .body_param("content")
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| HandlerError::bad_request("content is required"))?;
    if content.len() > MAX_CONTENT_LEN {
        return Err(HandlerError::bad_request(format!(
            "content exceeds {MAX_CONTENT_LEN} bytes"
        )));
    }
    let db = state.database()?;

    let todo = in_transaction(db, TransactionOptions::default(), |db| insert(db, &user.user_id, content))?;
    tracing::debug!(user_id = %user.user_id, todo_id = todo.id, "Todo created");
    Ok(ApiResponse::ok(todo).into_response(StatusCode::CREATED))
}

fn insert(db: &dyn Database, user_id: &str, content: &str) -> Result<Todo, HandlerError> {
    let created_at = chrono::Utc::now().timestamp();
    let inserted = db.execute_sql(
        "INSERT INTO TODO (user_id, content, created_at) VALUES (?, ?, ?)",
        &[Value::from(user_id), Value::from(content), Value::from(created_at)],
    )?;
    if inserted == 0 {
        return Err(HandlerError::internal("todo insert affected no rows"));
    }
    db.get_row("SELECT id, user_id, content, created_at FROM TODO WHERE id = last_insert_rowid()", &[])?
        .as_ref()
        .and_then(Todo::from_row)
        .ok_or_else(|| HandlerError::internal("inserted todo could not be read back"))
}

fn delete_todo(request: &HttpRequest, state: &AppState) -> Result<HttpResponse, HandlerError> {
    let user = session(request)?;
    let id: i64 = request
        .param("id")
        .and_then(|id| id.parse().ok())
        .ok_or_else(|| HandlerError::bad_request("id must be an integer"))?;
    let db = state.database()?;

    let deleted = in_transaction::<_, _, HandlerError, _>(db, TransactionOptions::default(), |db| {
        Ok(db.execute_sql(
            "DELETE FROM TODO WHERE id = ? AND user_id = ?",
            &[Value::from(id), Value::from(user.user_id.as_str())],
        )?)
    })?;
    if deleted == 0 {
        return Err(HandlerError::not_found("No such todo"));
    }
    Ok(HttpResponse::new(StatusCode::NO_CONTENT))
}

fn page_request(request: &HttpRequest) -> Result<PageRequest, HandlerError> {
    let number = |key: &str, default: u32| -> Result<u32, HandlerError> {
        match request.query_param(key) {
            None => Ok(default),
            Some(raw) => raw
                .parse()
                .map_err(|_| HandlerError::bad_request(format!("{key} must be a non-negative integer"))),
        }
    };
    PageRequest::new(number("page", 0)?, number("size", DEFAULT_PAGE_SIZE)?)
        .and_then(|page| page.sorted_by("created_at", SortDirection::Desc))
        .map_err(|e| HandlerError::bad_request(e.to_string()))
}

fn session(request: &HttpRequest) -> Result<&Session, HandlerError> {
    request
        .extensions()
        .get::<Session>()
        .ok_or_else(|| HandlerError::unauthorized("Authentication required"))
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
