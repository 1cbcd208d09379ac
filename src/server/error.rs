use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::foundation::error::Mp3ifyError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Error returned by API handlers.
#[derive(Debug)]
pub enum ApiError {
    NotFound(&'static str),
    BadRequest(String),
    Session(Mp3ifyError),
}

impl From<Mp3ifyError> for ApiError {
    fn from(e: Mp3ifyError) -> Self {
        Self::Session(e)
    }
}

/// HTTP status for a session error.
pub fn status_for(err: &Mp3ifyError) -> StatusCode {
    match err {
        Mp3ifyError::NoInputSelected | Mp3ifyError::InvalidUrlFormat(_) => StatusCode::BAD_REQUEST,
        Mp3ifyError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Mp3ifyError::Busy => StatusCode::CONFLICT,
        Mp3ifyError::DownloadFailed { .. } => StatusCode::BAD_GATEWAY,
        Mp3ifyError::TimedOut(_) => StatusCode::GATEWAY_TIMEOUT,
        // Client closed request.
        Mp3ifyError::Cancelled => {
            StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
        }
        Mp3ifyError::Load(_)
        | Mp3ifyError::Convert(_)
        | Mp3ifyError::Config(_)
        | Mp3ifyError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(what) => (StatusCode::NOT_FOUND, format!("{what} not found")),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Session(e) => (status_for(&e), e.to_string()),
        };
        if status.is_server_error() {
            tracing::warn!(%status, error = %message, "request failed");
        } else {
            tracing::debug!(%status, error = %message, "request rejected");
        }
        (status, Json(ErrorBody { error: message })).into_response()
    }
}
