//! HTTP-facing error type. Upstream details are logged where they happen;
//! responses only carry generic messages.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::protocol::ErrorOut;
use crate::session::SessionError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unknown session")]
    SessionNotFound,
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("Something went wrong")]
    Upstream,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::SessionNotFound => StatusCode::NOT_FOUND,
            ApiError::Session(_) => StatusCode::CONFLICT,
            ApiError::Upstream => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(ErrorOut { error: self.to_string() })).into_response()
    }
}
