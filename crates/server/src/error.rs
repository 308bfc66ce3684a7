use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{error, warn};
use uuid::Uuid;

use quotecraft_core::errors::{ApplicationError, DomainError, InterfaceError};
use quotecraft_db::RepositoryError;

/// HTTP face of [`InterfaceError`]; every failure carries a correlation id
/// that also appears in the log line.
#[derive(Debug)]
pub struct ApiError(pub InterfaceError);

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    detail: &'a str,
    correlation_id: &'a str,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self(InterfaceError::BadRequest { message: message.into(), correlation_id: new_id() })
    }

    fn status(&self) -> StatusCode {
        match &self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            InterfaceError::Forbidden { .. } => StatusCode::FORBIDDEN,
            InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
            InterfaceError::BadGateway { .. } => StatusCode::BAD_GATEWAY,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        let interface = error.into_interface(new_id());
        match &interface {
            InterfaceError::Internal { message, correlation_id }
            | InterfaceError::ServiceUnavailable { message, correlation_id } => {
                error!(
                    event_name = "api.request.failed",
                    correlation_id = %correlation_id,
                    error = %message,
                    "request failed"
                );
            }
            InterfaceError::BadGateway { message, correlation_id } => {
                warn!(
                    event_name = "api.request.delivery_failed",
                    correlation_id = %correlation_id,
                    error = %message,
                    "downstream delivery failed"
                );
            }
            _ => {}
        }
        Self(interface)
    }
}

impl From<RepositoryError> for ApiError {
    fn from(error: RepositoryError) -> Self {
        ApplicationError::from(error).into()
    }
}

impl From<DomainError> for ApiError {
    fn from(error: DomainError) -> Self {
        ApplicationError::from(error).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Storage and configuration details stay in the logs.
        let detail = match &self.0 {
            InterfaceError::Internal { .. } | InterfaceError::ServiceUnavailable { .. } => {
                self.0.user_message()
            }
            other => other.message(),
        };
        let body = ErrorBody {
            error: self.0.user_message(),
            detail,
            correlation_id: self.0.correlation_id(),
        };

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Basic realm=\"quotecraft\""),
            );
        }
        response
    }
}
