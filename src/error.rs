use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Startup configuration failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
    #[error("invalid CORS configuration: {0}")]
    InvalidCors(String),
}

/// Persistence failures surfaced by a `Repository`.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("username `{0}` is already taken")]
    UsernameTaken(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Failures of the token and credential checks.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authorization header is not a bearer token")]
    MalformedHeader,
    #[error("token is invalid")]
    InvalidToken,
    #[error("token has expired")]
    ExpiredToken,
    #[error("token subject `{0}` does not exist")]
    UnknownUser(String),
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error("token signing failed: {0}")]
    Signing(String),
    #[error(transparent)]
    Store(#[from] RepoError),
}

/// ApiError
///
/// Every error a handler or middleware can answer with. Each variant maps to
/// one status code; the body is always `{"error": "<message>"}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication required")]
    Unauthorized,
    #[error("access denied")]
    Forbidden,
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(String),
    #[error("not found")]
    NotFound,
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized | ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            // The detail goes to the log, never to the caller.
            ApiError::Internal(detail) => {
                tracing::error!(%detail, "request failed");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => ApiError::InvalidCredentials,
            AuthError::MalformedHeader
            | AuthError::InvalidToken
            | AuthError::ExpiredToken
            | AuthError::UnknownUser(_) => ApiError::Unauthorized,
            AuthError::Hashing(detail) | AuthError::Signing(detail) => ApiError::Internal(detail),
            AuthError::Store(repo) => repo.into(),
        }
    }
}

impl From<RepoError> for ApiError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::UsernameTaken(_) => ApiError::Conflict(err.to_string()),
            RepoError::Database(e) => ApiError::Internal(e.to_string()),
        }
    }
}
