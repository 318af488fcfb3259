//! JSON envelope used by API routes.

use http::StatusCode;
use serde::Serialize;

use crate::http::response::HttpResponse;

/// `{ "success": .., "code": "404 Not Found", "info": .., "data": .. }`
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub code: String,
    pub info: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            code: status_text(StatusCode::OK),
            info: "OK".to_string(),
            data: Some(data),
        }
    }

    pub fn into_response(self, status: StatusCode) -> HttpResponse {
        HttpResponse::json(status, &self)
    }
}

impl ApiResponse<()> {
    pub fn error(status: StatusCode, info: impl Into<String>) -> Self {
        Self {
            success: false,
            code: status_text(status),
            info: info.into(),
            data: None,
        }
    }
}

/// Shorthand for an error envelope with a matching status line.
pub fn api_error(status: StatusCode, info: impl Into<String>) -> HttpResponse {
    ApiResponse::error(status, info).into_response(status)
}

fn status_text(status: StatusCode) -> String {
    format!(
        "{} {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_envelope() {
        let response = api_error(StatusCode::UNAUTHORIZED, "Session required");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body: serde_json::Value = serde_json::from_slice(response.body_bytes().unwrap()).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "401 Unauthorized");
        assert_eq!(body["info"], "Session required");
        assert!(body.get("data").is_none());
    }

    #[test]
    fn test_ok_envelope() {
        let response = ApiResponse::ok(vec![1, 2]).into_response(StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(response.body_bytes().unwrap()).unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["data"], serde_json::json!([1, 2]));
    }
}
