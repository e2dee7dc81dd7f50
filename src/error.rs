//! # Errors
//! One taxonomy for every failure a request can hit, from malformed bodies to
//! backend faults. Each variant maps to a status code; responses carry a
//! `{"message": ...}` body, and backend detail only reaches the logs.

use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::scoring::ScoringError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Not authorized, user identity missing.")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("scoring rejected input: {0}")]
    Scoring(#[from] ScoringError),

    #[error("storage error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(msg) => Error::Conflict(msg),
            other => Error::Store(other),
        }
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Error::InvalidInput(rejection.body_text())
    }
}

impl From<PathRejection> for Error {
    fn from(rejection: PathRejection) -> Self {
        Error::InvalidInput(rejection.body_text())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::InvalidInput(_) | Error::Scoring(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> String {
        match self {
            Error::Scoring(_) => {
                "Please add alternatives and criteria to calculate outcome.".to_string()
            }
            Error::Store(_) => "Server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        if let Error::Store(e) = &self {
            // Backend detail stays in the logs.
            error!(target: "api", error = %e, "storage failure");
        }
        let status = self.status();
        (status, Json(json!({ "message": self.public_message() }))).into_response()
    }
}
