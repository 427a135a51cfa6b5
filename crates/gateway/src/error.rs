//! Maps `PlatformError` (and every crate's own error type via `Into`) onto
//! the `{error: {code, message, details?}}` response body (spec §7).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use platform_core::error::PlatformError;
use serde_json::json;

pub struct ApiError(pub PlatformError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(json!({
            "error": {
                "code": self.0.code(),
                "message": self.0.to_string(),
            }
        }));
        (status, body).into_response()
    }
}

impl<E> From<E> for ApiError
where
    E: Into<PlatformError>,
{
    fn from(e: E) -> Self {
        ApiError(e.into())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
