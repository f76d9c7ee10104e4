use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::warn;

use lti_shared::LtiError;
use lti_store::StoreError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Lti(#[from] LtiError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl ServerError {
    fn status(&self) -> StatusCode {
        match self {
            ServerError::Lti(e) if e.is_auth_failure() => StatusCode::UNAUTHORIZED,
            ServerError::Lti(LtiError::NoPendingState(_)) => StatusCode::CONFLICT,
            ServerError::Lti(LtiError::KeySourceUnavailable(_) | LtiError::SigningDisabled) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ServerError::Lti(_) | ServerError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "Request failed");
            "Internal server error".to_string()
        } else {
            if status == StatusCode::UNAUTHORIZED {
                warn!(error = %self, "Launch rejected");
            }
            self.to_string()
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
