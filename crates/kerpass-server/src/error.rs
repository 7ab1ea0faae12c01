//! Maps [`ProtoError`] onto HTTP status codes for the enrollment endpoint.

use axum::http::StatusCode;
use axum::response;
use kerpass_proto::ProtoError;

/// Wraps a [`ProtoError`] so it can be returned directly from an axum handler.
#[derive(Debug)]
pub struct HttpError(pub ProtoError);

impl From<ProtoError> for HttpError {
    fn from(e: ProtoError) -> Self {
        Self(e)
    }
}

impl response::IntoResponse for HttpError {
    fn into_response(self) -> response::Response {
        if !self.0.is_client_fault() {
            tracing::error!(error = %self.0, "internal error handling enrollment step");
            return (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response();
        }
        let status = match &self.0 {
            ProtoError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_REQUEST,
        };
        (status, self.0.to_string()).into_response()
    }
}
