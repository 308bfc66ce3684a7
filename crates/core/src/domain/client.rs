use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::user::UserId;
use crate::errors::DomainError;
use crate::validation::{optional_text, required_text, validate_email, validate_phone};
use crate::visibility::Owned;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(pub i64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub address: Option<String>,
    pub owner: Option<UserId>,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Owned for Client {
    fn owner(&self) -> Option<UserId> {
        self.owner
    }

    fn is_public(&self) -> bool {
        self.is_public
    }
}

/// Form payload for both create and full replace.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInput {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub is_public: bool,
}

impl ClientInput {
    pub fn validate(self) -> Result<Self, DomainError> {
        Ok(Self {
            name: required_text("name", &self.name)?,
            email: validate_email(&self.email)?,
            phone: validate_phone(self.phone.as_deref())?,
            company: optional_text(self.company.as_deref()),
            address: optional_text(self.address.as_deref()),
            is_public: self.is_public,
        })
    }
}
