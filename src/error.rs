use crate::auth::oauth::OAuthError;
use crate::llm::LlmError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("Unauthorized.")]
    Unauthorized,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Request limit reached.")]
    RateLimited,
    #[error("The model {model} is temporarily unavailable.")]
    ModelUnavailable {
        model: &'static str,
        #[source]
        source: LlmError,
    },
    #[error("Could not fetch the page.")]
    Fetch(#[source] reqwest::Error),
    #[error("Page is larger than {0} bytes.")]
    PageTooLarge(usize),
    #[error("Sign-in failed.")]
    OAuth(#[from] OAuthError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::ModelUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Fetch(_) | AppError::PageTooLarge(_) | AppError::OAuth(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            AppError::ModelUnavailable { model, source } => {
                warn!(model, error = %source, "model unavailable");
                json!({ "status": "error", "error": self.to_string() })
            }
            AppError::Fetch(source) => {
                warn!(error = %source, "page fetch failed");
                json!({ "error": self.to_string() })
            }
            AppError::OAuth(source) => {
                warn!(error = %source, "oauth callback failed");
                json!({ "error": self.to_string() })
            }
            AppError::Database(_) | AppError::Internal(_) => {
                error!(error = ?self, "request failed");
                json!({ "error": "Internal error." })
            }
            _ => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
