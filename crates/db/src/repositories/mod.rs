use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};
use thiserror::Error;

use quotecraft_core::domain::client::{Client, ClientId, ClientInput};
use quotecraft_core::domain::quote::{
    Quote, QuoteDetails, QuoteDraft, QuoteFilter, QuoteId, QuoteStatus, QuoteSummary, QuoteUpdate,
};
use quotecraft_core::domain::service::{Service, ServiceId, ServiceInput};
use quotecraft_core::domain::user::{NewUser, User, UserId, UserUpdate};
use quotecraft_core::errors::{ApplicationError, ConflictKind, DomainError};
use quotecraft_core::numbering::QuoteNumber;
use quotecraft_core::sharing::ShareGrant;
use quotecraft_core::visibility::{Principal, VisibilityScope};

pub mod client;
pub mod quote;
pub mod service;
pub mod user;

pub use client::SqlClientRepository;
pub use quote::{QuoteRepositorySettings, SqlQuoteRepository};
pub use service::SqlServiceRepository;
pub use user::{hash_password, verify_password, SqlUserRepository};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error(transparent)]
    Application(#[from] ApplicationError),
}

impl From<DomainError> for RepositoryError {
    fn from(error: DomainError) -> Self {
        Self::Application(ApplicationError::Domain(error))
    }
}

impl RepositoryError {
    /// Unique-constraint violations mapped to the invariant they protect.
    pub fn conflict_kind(&self) -> Option<ConflictKind> {
        match self {
            Self::Application(ApplicationError::Conflict(kind)) => Some(*kind),
            Self::Database(sqlx::Error::Database(error)) if error.is_unique_violation() => {
                conflict_for_constraint(error.message())
            }
            _ => None,
        }
    }

    /// SQLite lock contention (`SQLITE_BUSY`, `SQLITE_LOCKED` and their extended codes).
    pub fn is_busy(&self) -> bool {
        match self {
            Self::Database(sqlx::Error::Database(error)) => {
                matches!(error.code().as_deref(), Some("5" | "6" | "261" | "262" | "517"))
            }
            _ => false,
        }
    }
}

fn conflict_for_constraint(message: &str) -> Option<ConflictKind> {
    const TARGETS: &[(&str, ConflictKind)] = &[
        ("clients.email", ConflictKind::DuplicateEmail),
        ("users.email", ConflictKind::DuplicateEmail),
        ("users.username", ConflictKind::DuplicateUsername),
        ("quotes.quote_number", ConflictKind::DuplicateQuoteNumber),
        ("quotes.view_token", ConflictKind::DuplicateToken),
    ];

    TARGETS.iter().find(|(target, _)| message.contains(target)).map(|(_, kind)| *kind)
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        if let Some(kind) = error.conflict_kind() {
            return Self::Conflict(kind);
        }
        match error {
            RepositoryError::Application(error) => error,
            RepositoryError::Database(error) => Self::Persistence(error.to_string()),
            RepositoryError::Decode(message) => {
                Self::Persistence(format!("stored data could not be decoded: {message}"))
            }
        }
    }
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Inactive accounts and wrong passwords are indistinguishable.
    async fn authenticate(&self, username: &str, password: &str) -> Result<User, RepositoryError>;
    /// Creates the first administrator when the users table is empty.
    async fn bootstrap_admin(
        &self,
        admin: NewUser,
        password: &str,
    ) -> Result<Option<User>, RepositoryError>;
    async fn create(
        &self,
        actor: &Principal,
        user: NewUser,
        password: &str,
    ) -> Result<User, RepositoryError>;
    async fn get(&self, actor: &Principal, id: UserId) -> Result<User, RepositoryError>;
    async fn list(&self, actor: &Principal) -> Result<Vec<User>, RepositoryError>;
    async fn update(
        &self,
        actor: &Principal,
        id: UserId,
        update: UserUpdate,
    ) -> Result<User, RepositoryError>;
    async fn set_password(
        &self,
        actor: &Principal,
        id: UserId,
        password: &str,
    ) -> Result<(), RepositoryError>;
    async fn delete(&self, actor: &Principal, id: UserId) -> Result<(), RepositoryError>;
    async fn display_name_for(&self, owner: Option<UserId>) -> Result<String, RepositoryError>;
}

#[async_trait]
pub trait ClientRepository: Send + Sync {
    async fn create(&self, actor: &Principal, input: ClientInput)
        -> Result<Client, RepositoryError>;
    async fn get(&self, actor: &Principal, id: ClientId) -> Result<Client, RepositoryError>;
    async fn list(&self, actor: &Principal) -> Result<Vec<Client>, RepositoryError>;
    async fn search(&self, actor: &Principal, term: &str) -> Result<Vec<Client>, RepositoryError>;
    async fn update(
        &self,
        actor: &Principal,
        id: ClientId,
        input: ClientInput,
    ) -> Result<Client, RepositoryError>;
    async fn delete(&self, actor: &Principal, id: ClientId) -> Result<(), RepositoryError>;
    async fn toggle_visibility(
        &self,
        actor: &Principal,
        id: ClientId,
    ) -> Result<Client, RepositoryError>;
}

#[async_trait]
pub trait ServiceRepository: Send + Sync {
    async fn create(
        &self,
        actor: &Principal,
        input: ServiceInput,
    ) -> Result<Service, RepositoryError>;
    async fn get(&self, actor: &Principal, id: ServiceId) -> Result<Service, RepositoryError>;
    async fn list(
        &self,
        actor: &Principal,
        active_only: bool,
    ) -> Result<Vec<Service>, RepositoryError>;
    async fn update(
        &self,
        actor: &Principal,
        id: ServiceId,
        input: ServiceInput,
    ) -> Result<Service, RepositoryError>;
    async fn set_active(
        &self,
        actor: &Principal,
        id: ServiceId,
        active: bool,
    ) -> Result<Service, RepositoryError>;
    async fn toggle_active(
        &self,
        actor: &Principal,
        id: ServiceId,
    ) -> Result<Service, RepositoryError>;
    async fn delete(&self, actor: &Principal, id: ServiceId) -> Result<(), RepositoryError>;
    async fn toggle_visibility(
        &self,
        actor: &Principal,
        id: ServiceId,
    ) -> Result<Service, RepositoryError>;
}

#[async_trait]
pub trait QuoteRepository: Send + Sync {
    async fn create(&self, actor: &Principal, draft: QuoteDraft) -> Result<Quote, RepositoryError>;
    async fn get_details(
        &self,
        actor: &Principal,
        id: QuoteId,
    ) -> Result<QuoteDetails, RepositoryError>;
    async fn list(
        &self,
        actor: &Principal,
        filter: &QuoteFilter,
    ) -> Result<Vec<QuoteSummary>, RepositoryError>;
    async fn update(
        &self,
        actor: &Principal,
        id: QuoteId,
        update: QuoteUpdate,
    ) -> Result<QuoteDetails, RepositoryError>;
    async fn set_status(
        &self,
        actor: &Principal,
        id: QuoteId,
        status: QuoteStatus,
    ) -> Result<Quote, RepositoryError>;
    async fn delete(&self, actor: &Principal, id: QuoteId) -> Result<(), RepositoryError>;
    async fn toggle_visibility(
        &self,
        actor: &Principal,
        id: QuoteId,
    ) -> Result<Quote, RepositoryError>;
    async fn preview_next_number(&self, year: i32) -> Result<QuoteNumber, RepositoryError>;
    /// Conditional `draft -> sent` after a confirmed delivery. Returns the
    /// stored status afterwards.
    async fn mark_delivered(
        &self,
        actor: &Principal,
        id: QuoteId,
    ) -> Result<QuoteStatus, RepositoryError>;
    /// Returns the live grant if one exists, otherwise mints and stores one.
    async fn ensure_token(
        &self,
        actor: &Principal,
        id: QuoteId,
    ) -> Result<ShareGrant, RepositoryError>;
    async fn resolve_token(&self, token: &str) -> Result<Option<QuoteId>, RepositoryError>;
    async fn revoke_token(&self, actor: &Principal, id: QuoteId) -> Result<(), RepositoryError>;
    async fn get_shared_details(&self, token: &str) -> Result<QuoteDetails, RepositoryError>;
}

pub(crate) fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, RepositoryError>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(name).map_err(|e| RepositoryError::Decode(e.to_string()))
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid timestamp `{raw}`: {e}")))
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, RepositoryError> {
    NaiveDate::from_str(raw)
        .map_err(|e| RepositoryError::Decode(format!("invalid date `{raw}`: {e}")))
}

pub(crate) fn parse_decimal(raw: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(raw)
        .map_err(|e| RepositoryError::Decode(format!("invalid decimal `{raw}`: {e}")))
}

pub(crate) fn parse_label<T>(raw: &str) -> Result<T, RepositoryError>
where
    T: FromStr<Err = DomainError>,
{
    raw.parse().map_err(|e: DomainError| RepositoryError::Decode(e.to_string()))
}

pub(crate) fn optional_owner(raw: Option<i64>) -> Option<UserId> {
    raw.map(UserId)
}

/// Appends the row filter for `scope` to a query that already has a WHERE clause.
pub(crate) fn push_scope(builder: &mut QueryBuilder<'_, Sqlite>, scope: VisibilityScope, alias: &str) {
    if let VisibilityScope::OwnedOrPublic(user) = scope {
        builder.push(format!(" AND ({alias}.is_public = 1 OR {alias}.owner_id = "));
        builder.push_bind(user.0);
        builder.push(")");
    }
}

/// `%term%` with LIKE wildcards escaped; pair with `ESCAPE '\'`.
pub(crate) fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for ch in term.trim().chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}
