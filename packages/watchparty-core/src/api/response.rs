//! HTTP response helper functions for consistent API responses.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use serde_json::json;

/// Standard API success response with JSON data.
pub fn api_success<T: Serialize>(data: T) -> impl IntoResponse {
    api_status(StatusCode::OK, data)
}

/// JSON body with an explicit status, for answers that are not errors
/// (e.g. `404 {"exists":false}`).
pub fn api_status<T: Serialize>(status: StatusCode, data: T) -> impl IntoResponse {
    (status, Json(data))
}

/// Standard API error response with code and message.
pub fn api_error(
    status: StatusCode,
    code: &str,
    message: impl std::fmt::Display,
) -> impl IntoResponse {
    (
        status,
        Json(json!({
            "error": code,
            "message": message.to_string()
        })),
    )
}
