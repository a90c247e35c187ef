use std::any::Any;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, trace};

/// JSON body of every HTTP-level error.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(rename = "type")]
    pub kind: String,
}
impl ErrorResponse {
    pub fn new<E: Into<String>, K: Into<String>>(error: E, kind: K) -> Self {
        Self {
            error: error.into(),
            kind: kind.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::BadRequest(msg) => {
                trace!(%msg, "Bad request");
                (StatusCode::BAD_REQUEST, ErrorResponse::new(msg.as_str(), "bad_request"))
            }
            Self::NotFound(msg) => {
                trace!(%msg, "Not found");
                (StatusCode::NOT_FOUND, ErrorResponse::new(msg.as_str(), "not_found"))
            }
            Self::Internal(e) => {
                error!(?e, "Internal error while handling request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("Internal server error", "internal"),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

/// Response for a panic inside a request handler.
pub fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let details = err
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| err.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    error!(%details, "Request handler panicked");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new("Internal server error", "panic")),
    )
        .into_response()
}
