use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Auth errors
    #[error("login failed")]
    LoginFail,
    #[error("no auth token found")]
    AuthFailNoToken,
    #[error("auth token wrong format")]
    AuthFailTokenWrongFormat,
    #[error("auth context missing")]
    AuthFailCtxNotInRequestExt,

    // Domain errors
    #[error("{0} not found")]
    NotFound(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Two writers raced on the same record. Recovered internally by the
    /// store; only surfaces if recovery itself is impossible.
    #[error("conflict: {0}")]
    Conflict(String),
    /// The persistent store could not be reached. Fatal to the in-flight
    /// operation; never retried here.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    // Generic
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = core::result::Result<T, Error>;

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match self {
            Error::LoginFail | Error::AuthFailNoToken | Error::AuthFailTokenWrongFormat => {
                StatusCode::UNAUTHORIZED
            }
            Error::AuthFailCtxNotInRequestExt => StatusCode::INTERNAL_SERVER_ERROR,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": {
                "message": self.to_string()
            }
        }));

        (status, body).into_response()
    }
}

// Allow conversion from manager internals (anyhow) the easy way
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Internal(err.to_string())
    }
}
