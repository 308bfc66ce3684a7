use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::domain::quote::QuoteStatus;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Client,
    Service,
    Quote,
    User,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Client => "client",
            Self::Service => "service",
            Self::Quote => "quote",
            Self::User => "user",
        };
        f.write_str(label)
    }
}

/// Unique-constraint and referential guards surfaced to callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    DuplicateEmail,
    DuplicateUsername,
    DuplicateQuoteNumber,
    DuplicateToken,
    ClientHasQuotes,
    ServiceInUse,
    LastAdmin,
    SelfDeletion,
}

impl ConflictKind {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::DuplicateEmail => "a record with this email already exists",
            Self::DuplicateUsername => "a user with this username already exists",
            Self::DuplicateQuoteNumber => "the quote number was taken by a concurrent writer",
            Self::DuplicateToken => "the share token collided with an existing token",
            Self::ClientHasQuotes => "the client is referenced by existing quotes",
            Self::ServiceInUse => {
                "the service is referenced by existing quote items; deactivate it instead"
            }
            Self::LastAdmin => "the last active administrator cannot be removed or demoted",
            Self::SelfDeletion => "users cannot delete their own account",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },
    #[error("invalid quote transition from {from:?} to {to:?}")]
    InvalidQuoteTransition { from: QuoteStatus, to: QuoteStatus },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

impl DomainError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation { field, reason: reason.into() }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("conflict: {}", .0.describe())]
    Conflict(ConflictKind),
    #[error("{0} not found")]
    NotFound(EntityKind),
    #[error("permission denied: {action}")]
    Forbidden { action: &'static str },
    #[error("invalid credentials")]
    Unauthenticated,
    #[error("mail transport failure: {0}")]
    Transport(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("unauthorized: {message}")]
    Unauthorized { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("bad gateway: {message}")]
    BadGateway { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

/// Outward message for every missing or policy-hidden lookup.
pub const NOT_FOUND_MESSAGE: &str = "the requested resource was not found";

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Unauthorized { .. } => "Authentication is required.",
            Self::Forbidden { .. } => "You do not have permission to perform this action.",
            Self::NotFound { .. } => "The requested resource was not found.",
            Self::Conflict { .. } => "The request conflicts with existing data.",
            Self::BadGateway { .. } => {
                "The notification could not be delivered. The quote itself was saved."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. }
            | Self::Unauthorized { message, .. }
            | Self::Forbidden { message, .. }
            | Self::NotFound { message, .. }
            | Self::Conflict { message, .. }
            | Self::BadGateway { message, .. }
            | Self::ServiceUnavailable { message, .. }
            | Self::Internal { message, .. } => message,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Unauthorized { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::BadGateway { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Unauthorized { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::BadGateway { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Domain(error) => {
                Self::BadRequest { message: error.to_string(), correlation_id }
            }
            ApplicationError::Conflict(kind) => {
                Self::Conflict { message: kind.describe().to_owned(), correlation_id }
            }
            ApplicationError::NotFound(_) => {
                Self::NotFound { message: NOT_FOUND_MESSAGE.to_owned(), correlation_id }
            }
            ApplicationError::Forbidden { action } => {
                Self::Forbidden { message: format!("not allowed to {action}"), correlation_id }
            }
            ApplicationError::Unauthenticated => {
                Self::Unauthorized { message: "invalid credentials".to_owned(), correlation_id }
            }
            ApplicationError::Transport(message) => Self::BadGateway { message, correlation_id },
            ApplicationError::Persistence(message) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            ApplicationError::Configuration(message) => Self::Internal { message, correlation_id },
        }
    }
}
