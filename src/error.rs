use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{render::RenderError, repository::RepositoryError, storage::StorageError};

pub type AppResult<T> = Result<T, AppError>;

/// AppError
///
/// Every failure a handler can surface. Form validation failures and rejected
/// ownership checks are not errors: they re-render the form or redirect.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found")]
    NotFound,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("render error: {0}")]
    Render(#[from] RenderError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Repository(_) | AppError::Render(_) | AppError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            // Internal details stay in the logs.
            tracing::error!(error = %self, "request failed");
            return (status, "internal server error").into_response();
        }
        (status, self.to_string()).into_response()
    }
}
