use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::user::UserId;
use crate::errors::DomainError;
use crate::validation::{optional_text, required_text, validate_amount};
use crate::visibility::Owned;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceId(pub i64);

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Catalogue entry. `is_active` is the soft-delete flag: inactive services
/// stay referenced by historical items but cannot back new ones.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub name: String,
    pub description: Option<String>,
    pub base_price: Decimal,
    pub category: Option<String>,
    pub is_active: bool,
    pub owner: Option<UserId>,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Owned for Service {
    fn owner(&self) -> Option<UserId> {
        self.owner
    }

    fn is_public(&self) -> bool {
        self.is_public
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub base_price: Decimal,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub is_public: bool,
}

fn default_active() -> bool {
    true
}

impl ServiceInput {
    pub fn new(name: impl Into<String>, base_price: Decimal) -> Self {
        Self {
            name: name.into(),
            description: None,
            base_price,
            category: None,
            is_active: true,
            is_public: false,
        }
    }

    pub fn validate(self) -> Result<Self, DomainError> {
        Ok(Self {
            name: required_text("name", &self.name)?,
            description: optional_text(self.description.as_deref()),
            base_price: validate_amount("base_price", self.base_price)?,
            category: optional_text(self.category.as_deref()),
            is_active: self.is_active,
            is_public: self.is_public,
        })
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::ServiceInput;

    #[test]
    fn negative_base_price_is_rejected() {
        assert!(ServiceInput::new("Consulting", Decimal::new(-100, 2)).validate().is_err());
    }

    #[test]
    fn new_services_start_active_and_private() {
        let service =
            ServiceInput::new(" Consulting ", Decimal::new(10000, 2)).validate().expect("valid");
        assert_eq!(service.name, "Consulting");
        assert_eq!(service.base_price, Decimal::new(100, 0));
        assert!(service.is_active);
        assert!(!service.is_public);
    }

    #[test]
    fn missing_active_flag_defaults_to_true_when_deserialized() {
        let service: ServiceInput =
            serde_json::from_str(r#"{"name":"Audit","base_price":"250.00"}"#).expect("json");
        assert!(service.is_active);
        assert_eq!(service.base_price, Decimal::new(25000, 2));
    }
}
