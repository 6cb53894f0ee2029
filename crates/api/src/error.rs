//! API Error Types

use crate::page::{self, FormValues, PageView};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use thiserror::Error;
use waterfall_chart::ChartError;

/// Errors surfaced by request handlers
#[derive(Debug, Error)]
pub enum ApiError {
    /// Input the model cannot be evaluated on; the form is shown again
    #[error("{message}")]
    InvalidInput {
        message: String,
        form: Box<FormValues>,
    },
    /// Malformed request outside what the form can produce
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Chart rendering failed: {0}")]
    Chart(#[from] ChartError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::InvalidInput { message, form } => {
                let view = PageView {
                    form: *form,
                    result: None,
                    error: Some(message),
                };
                (StatusCode::UNPROCESSABLE_ENTITY, Html(page::render(&view))).into_response()
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            err @ (ApiError::Chart(_) | ApiError::Internal(_)) => {
                tracing::error!("{}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
            }
        }
    }
}
