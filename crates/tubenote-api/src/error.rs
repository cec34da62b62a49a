use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use tubenote_types::api::ErrorBody;

pub type ApiResult<T> = Result<T, ApiError>;

/// Every error a handler can return. All variants except `Internal` are
/// operational: expected outcomes of bad input or state, reported verbatim.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("{0}")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(&'static str),

    #[error("Too many attempts, try again later")]
    TooManyRequests { retry_after_secs: u64 },

    #[error("{0}")]
    Upstream(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_operational(&self) -> bool {
        !matches!(self, Self::Internal(_))
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// A write to `users` that lost a race on a unique column is a conflict,
    /// the same answer the up-front availability check gives.
    pub fn from_user_write(e: anyhow::Error) -> Self {
        let conflict = match tubenote_db::unique_violation(&e) {
            Some("users.username") => Some(Self::Conflict("Username is already taken")),
            Some("users.email") => Some(Self::Conflict("Email is already registered")),
            _ => None,
        };
        conflict.unwrap_or_else(|| Self::Internal(e))
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Internal(anyhow::anyhow!("spawn_blocking join error: {}", e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(ref e) = self {
            error!("Internal error: {:#}", e);
        }

        let status = self.status();
        let body = Json(ErrorBody {
            error: self.to_string(),
            status: status.as_u16(),
        });
        let mut response = (status, body).into_response();

        if let Self::TooManyRequests { retry_after_secs } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
