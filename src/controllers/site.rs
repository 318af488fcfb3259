//! HTML pages: home, login/logout and the signed-in profile.

use http::header::SET_COOKIE;
use http::StatusCode;

use crate::auth::Session;
use crate::controllers::{Controller, AUTH_COOKIE};
use crate::http::error::HandlerError;
use crate::http::request::HttpRequest;
use crate::http::response::HttpResponse;
use crate::http::state::AppState;
use crate::routing::Route;
use crate::template::RenderContext;

pub const HOME_TEMPLATE: &str = "_home.html";
pub const LOGIN_TEMPLATE: &str = "_login.html";
pub const PROFILE_TEMPLATE: &str = "_profile.html";

#[derive(Debug, Default, Clone, Copy)]
pub struct SiteController;

impl Controller for SiteController {
    fn routes(&self) -> Vec<Route> {
        vec![
            Route::get("/", home),
            Route::get("/login", login_form),
            Route::post("/login", login),
            Route::post("/logout", logout),
            Route::get("/profile", profile).requires_session(),
        ]
    }
}

fn home(request: &HttpRequest, state: &AppState) -> Result<HttpResponse, HandlerError> {
    state.page(HOME_TEMPLATE, &state.render_context(request))
}

fn login_form(request: &HttpRequest, state: &AppState) -> Result<HttpResponse, HandlerError> {
    if request.extensions().get::<Session>().is_some() {
        return Ok(HttpResponse::redirect("/profile"));
    }
    state.page(LOGIN_TEMPLATE, &state.render_context(request))
}

fn login(request: &HttpRequest, state: &AppState) -> Result<HttpResponse, HandlerError> {
    let username = request.body_param("user").unwrap_or_default();
    let password = request.body_param("password").unwrap_or_default();

    match state.tokens().create_token(username, password) {
        Some(pair) => Ok(HttpResponse::redirect("/profile").append_header(
            SET_COOKIE,
            format!(
                "{AUTH_COOKIE}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
                pair.access_token, pair.expires_in
            ),
        )),
        None => {
            // Fresh context so the submitted password never reaches the template.
            let context = RenderContext::new()
                .with("user", username)
                .with("error", "Invalid username or password");
            let content = state.templates().render_file(LOGIN_TEMPLATE, &context)?;
            state.page_with_content(StatusCode::UNAUTHORIZED, &content, &context)
        }
    }
}

fn logout(request: &HttpRequest, state: &AppState) -> Result<HttpResponse, HandlerError> {
    if let Some(token) = request.token() {
        state.tokens().revoke(token);
    }
    Ok(HttpResponse::redirect("/").append_header(
        SET_COOKIE,
        format!("{AUTH_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"),
    ))
}

fn profile(request: &HttpRequest, state: &AppState) -> Result<HttpResponse, HandlerError> {
    let mut context = state.render_context(request);
    if let Some(session) = context.session().cloned() {
        context.insert("userId", session.user_id);
    }
    state.page(PROFILE_TEMPLATE, &context)
}
