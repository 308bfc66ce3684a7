use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::validation::{required_text, validate_email};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
        }
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "user" => Ok(Self::User),
            other => Err(DomainError::validation(
                "role",
                format!("unsupported role `{other}` (expected admin|user)"),
            )),
        }
    }
}

/// Account record. The password hash never leaves the persistence layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub is_active: bool,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub display_name: Option<String>,
    pub role: Role,
}

impl NewUser {
    pub fn validate(self) -> Result<Self, DomainError> {
        let username = required_text("username", &self.username)?;
        if username.chars().any(char::is_whitespace) {
            return Err(DomainError::validation("username", "must not contain whitespace"));
        }
        let display_name = self
            .display_name
            .as_deref()
            .map(|name| required_text("display_name", name))
            .transpose()?
            .unwrap_or_else(|| username.clone());

        Ok(Self {
            email: validate_email(&self.email)?,
            display_name: Some(display_name),
            username,
            role: self.role,
        })
    }
}

/// Partial update; `None` keeps the stored value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct UserUpdate {
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

impl UserUpdate {
    pub fn validate(self) -> Result<Self, DomainError> {
        Ok(Self {
            email: self.email.as_deref().map(validate_email).transpose()?,
            display_name: self
                .display_name
                .as_deref()
                .map(|name| required_text("display_name", name))
                .transpose()?,
            role: self.role,
            is_active: self.is_active,
        })
    }

    /// True when applying the update would leave `user` without active admin rights.
    pub fn revokes_admin(&self, user: &User) -> bool {
        let was_admin = user.role == Role::Admin && user.is_active;
        let stays_admin = self.role.unwrap_or(user.role) == Role::Admin
            && self.is_active.unwrap_or(user.is_active);
        was_admin && !stays_admin
    }
}

pub const SYSTEM_DISPLAY_NAME: &str = "System";
pub const UNKNOWN_DISPLAY_NAME: &str = "Unknown";
pub const MIN_PASSWORD_LEN: usize = 8;

pub fn validate_password(password: &str) -> Result<(), DomainError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(DomainError::validation(
            "password",
            format!("must have at least {MIN_PASSWORD_LEN} characters"),
        ));
    }
    Ok(())
}
