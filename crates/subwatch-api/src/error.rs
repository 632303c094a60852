//! HTTP error mapping
//!
//! Handlers reject with [`ApiError`]; [`handle_rejection`] turns every
//! rejection into a JSON body `{ "error": <kind>, "message": <text> }`.
//!
//! | error | status |
//! |---|---|
//! | validation | 400 |
//! | unauthorized | 401 |
//! | not_found | 404 |
//! | rate_limited | 429 + `Retry-After` |
//! | dependency / store | 503 |

use serde::Serialize;
use std::convert::Infallible;
use subwatch_core::MonitorError;
use warp::http::header::{HeaderValue, RETRY_AFTER};
use warp::http::StatusCode;
use warp::{Rejection, Reply};

/// Errors surfaced by the HTTP layer
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Monitor(#[from] MonitorError),

    #[error("missing or invalid admin token")]
    Unauthorized,
}

impl warp::reject::Reject for ApiError {}

impl ApiError {
    /// HTTP status for this error
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Monitor(e) => match e {
                MonitorError::Validation(_) => StatusCode::BAD_REQUEST,
                MonitorError::NotFound { .. } => StatusCode::NOT_FOUND,
                MonitorError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
                MonitorError::Dependency(_) | MonitorError::Store(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
            },
        }
    }

    /// Machine-readable kind
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::Monitor(e) => match e {
                MonitorError::Validation(_) => "validation",
                MonitorError::NotFound { .. } => "not_found",
                MonitorError::RateLimited { .. } => "rate_limited",
                MonitorError::Dependency(_) => "dependency",
                MonitorError::Store(_) => "unavailable",
            },
        }
    }

    fn retry_after(&self) -> Option<u64> {
        match self {
            Self::Monitor(MonitorError::RateLimited { retry_after_secs }) => Some(*retry_after_secs),
            _ => None,
        }
    }
}

/// Reject with a monitor error
pub fn reject(err: impl Into<ApiError>) -> Rejection {
    warp::reject::custom(err.into())
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

fn error_reply(status: StatusCode, kind: &str, message: String) -> warp::reply::Response {
    let body = warp::reply::json(&ErrorBody {
        error: kind,
        message,
    });
    warp::reply::with_status(body, status).into_response()
}

/// Convert any rejection into a JSON error response
///
/// # Errors
/// Never; the signature satisfies `Filter::recover`
pub async fn handle_rejection(err: Rejection) -> Result<warp::reply::Response, Infallible> {
    if let Some(api) = err.find::<ApiError>() {
        let status = api.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", api);
        }
        let mut response = error_reply(status, api.kind(), api.to_string());
        if let Some(secs) = api.retry_after() {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(secs.max(1)));
        }
        return Ok(response);
    }

    if err.is_not_found() {
        return Ok(error_reply(
            StatusCode::NOT_FOUND,
            "not_found",
            "no such route".to_string(),
        ));
    }
    if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        return Ok(error_reply(StatusCode::BAD_REQUEST, "validation", e.to_string()));
    }
    if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        return Ok(error_reply(
            StatusCode::METHOD_NOT_ALLOWED,
            "method_not_allowed",
            "method not allowed".to_string(),
        ));
    }

    tracing::error!("Unhandled rejection: {:?}", err);
    Ok(error_reply(
        StatusCode::SERVICE_UNAVAILABLE,
        "unavailable",
        "request could not be served".to_string(),
    ))
}
