use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::openid::OpenIDError;
use crate::store::StoreError;

/// Failures while assembling the application state.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("database unavailable: {0}")]
    Database(#[from] StoreError),
    #[error("openid provider unavailable: {0}")]
    OpenID(#[from] OpenIDError),
}

/// Handler errors. Details are logged; clients only see an opaque message.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("template error: {0}")]
    Render(#[from] tera::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    OpenID(#[from] OpenIDError),
    #[error("bad request: {0}")]
    BadRequest(&'static str),
    #[error("unauthorized: {0}")]
    Unauthorized(&'static str),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, *msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, *msg),
            AppError::Render(_) | AppError::Store(_) | AppError::OpenID(_) => {
                tracing::error!(error = %self, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };
        tracing::debug!("{}, {}", status, error_message);

        let body = Json(json!({
            "error": error_message,
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_failures_are_opaque() {
        let response = AppError::OpenID(OpenIDError::MissingIdToken).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn client_errors_keep_their_status() {
        assert_eq!(
            AppError::BadRequest("invalid login state").into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Unauthorized("login was not completed")
                .into_response()
                .status(),
            StatusCode::UNAUTHORIZED
        );
    }
}
