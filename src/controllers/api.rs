//! JSON API: server status and token endpoints.

use http::StatusCode;
use serde::Serialize;

use crate::auth::Session;
use crate::controllers::Controller;
use crate::http::api::{api_error, ApiResponse};
use crate::http::error::HandlerError;
use crate::http::request::HttpRequest;
use crate::http::response::HttpResponse;
use crate::http::state::AppState;
use crate::routing::Route;

#[derive(Debug, Default, Clone, Copy)]
pub struct ApiController;

impl Controller for ApiController {
    fn routes(&self) -> Vec<Route> {
        vec![
            Route::get("/api/v1/status", status).json(),
            Route::post("/api/v1/auth/token", create_token).json(),
            Route::post("/api/v1/auth/refresh", refresh_token).json(),
            Route::post("/api/v1/auth/revoke", revoke_token).json().requires_session(),
            Route::get("/api/v1/session", current_session).json().requires_session(),
        ]
    }
}

#[derive(Debug, Serialize)]
struct ServerStatus {
    version: &'static str,
    port: u16,
    public_url: String,
    connections: u64,
}

#[derive(Debug, Serialize)]
struct SessionInfo {
    user_id: String,
}

fn status(_: &HttpRequest, state: &AppState) -> Result<HttpResponse, HandlerError> {
    let server = state.templates().server();
    Ok(ApiResponse::ok(ServerStatus {
        version: env!("CARGO_PKG_VERSION"),
        port: server.port,
        public_url: server.public_url.clone(),
        connections: state.connections().active_count(),
    })
    .into_response(StatusCode::OK))
}

fn create_token(request: &HttpRequest, state: &AppState) -> Result<HttpResponse, HandlerError> {
    let (Some(username), Some(password)) = (request.body_param("user"), request.body_param("password")) else {
        return Err(HandlerError::bad_request("user and password are required"));
    };
    match state.tokens().create_token(username, password) {
        Some(pair) => Ok(ApiResponse::ok(pair).into_response(StatusCode::OK)),
        None => Ok(api_error(StatusCode::UNAUTHORIZED, "Invalid credentials")),
    }
}

fn refresh_token(request: &HttpRequest, state: &AppState) -> Result<HttpResponse, HandlerError> {
    let Some(refresh) = request.body_param("refresh_token") else {
        return Err(HandlerError::bad_request("refresh_token is required"));
    };
    match state.tokens().refresh(refresh) {
        Some(pair) => Ok(ApiResponse::ok(pair).into_response(StatusCode::OK)),
        None => Ok(api_error(StatusCode::UNAUTHORIZED, "Invalid or expired refresh token")),
    }
}

fn revoke_token(request: &HttpRequest, state: &AppState) -> Result<HttpResponse, HandlerError> {
    let session = session(request)?;
    state.tokens().revoke(&session.token);
    Ok(HttpResponse::new(StatusCode::NO_CONTENT))
}

fn current_session(request: &HttpRequest, _: &AppState) -> Result<HttpResponse, HandlerError> {
    let session = session(request)?;
    Ok(ApiResponse::ok(SessionInfo {
        user_id: session.user_id.clone(),
    })
    .into_response(StatusCode::OK))
}

fn session(request: &HttpRequest) -> Result<&Session, HandlerError> {
    request
        .extensions()
        .get::<Session>()
        .ok_or_else(|| HandlerError::unauthorized("Authentication required"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SessionValidator;
    use crate::config::{ServerConfig, UserAccount};
    use crate::net::ConnectionTracker;
    use http::Method;
    use serde_json::Value;

    fn state() -> AppState {
        let mut config = ServerConfig::default();
        config.documents.root = std::env::temp_dir();
        config.auth.users = vec![UserAccount {
            username: "ana".into(),
            user_id: "7".into(),
            password: "pw".into(),
        }];
        AppState::from_config(config, ConnectionTracker::new())
    }

    fn json(response: &HttpResponse) -> Value {
        serde_json::from_slice(response.body_bytes().unwrap()).unwrap()
    }

    fn post_json(path: &str, body: &str) -> HttpRequest {
        HttpRequest::builder(Method::POST, path)
            .header("content-type", "application/json")
            .body(body.to_string())
            .build()
    }

    #[test]
    fn test_status_reports_port_and_connections() {
        let state = state();
        let _guard = state.connections().track();
        let response = status(&HttpRequest::builder(Method::GET, "/api/v1/status").build(), &state).unwrap();
        let body = json(&response);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["port"], 15000);
        assert_eq!(body["data"]["connections"], 1);
    }

    #[test]
    fn test_token_flow() {
        let state = state();
        let issued = create_token(&post_json("/api/v1/auth/token", r#"{"user":"ana","password":"pw"}"#), &state).unwrap();
        let body = json(&issued);
        let access = body["data"]["access_token"].as_str().unwrap().to_string();
        let refresh = body["data"]["refresh_token"].as_str().unwrap().to_string();
        assert!(state.tokens().is_token_valid(&access));

        let rotated = refresh_token(
            &post_json("/api/v1/auth/refresh", &format!(r#"{{"refresh_token":"{refresh}"}}"#)),
            &state,
        )
        .unwrap();
        assert_eq!(rotated.status(), StatusCode::OK);
        assert!(!state.tokens().is_token_valid(&access));
    }

    #[test]
    fn test_bad_credentials() {
        let state = state();
        let response = create_token(&post_json("/api/v1/auth/token", r#"{"user":"ana","password":"no"}"#), &state).unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json(&response)["success"], false);

        let missing = create_token(&post_json("/api/v1/auth/token", r#"{"user":"ana"}"#), &state).unwrap_err();
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_current_session() {
        let state = state();
        let mut request = HttpRequest::builder(Method::GET, "/api/v1/session").build();
        assert_eq!(
            current_session(&request, &state).unwrap_err().status(),
            StatusCode::UNAUTHORIZED
        );

        request.extensions_mut().insert(Session {
            user_id: "7".into(),
            token: "t".into(),
        });
        let body = json(&current_session(&request, &state).unwrap());
        assert_eq!(body["data"]["user_id"], "7");
    }
}
