//! Ownership and visibility rules shared by every read and write path.
//!
//! Two tiers only: administrators (and the system principal) see and modify
//! everything; regular users see rows they own or that are public, and modify
//! only rows they own. Missing and hidden rows produce the same
//! [`ApplicationError::NotFound`].

use serde::{Deserialize, Serialize};

use crate::domain::user::{Role, UserId};
use crate::errors::{ApplicationError, EntityKind};

/// Acting identity for one interaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Principal {
    /// Unattended bootstrap, migrations and operator tooling.
    System,
    User { id: UserId, role: Role },
}

impl Principal {
    pub fn user(id: UserId, role: Role) -> Self {
        Self::User { id, role }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Self::System | Self::User { role: Role::Admin, .. })
    }

    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Self::System => None,
            Self::User { id, .. } => Some(*id),
        }
    }

    /// Owner recorded on rows this principal creates; `None` means system-owned.
    pub fn owner_for_new_records(&self) -> Option<UserId> {
        self.user_id()
    }

    pub fn scope(&self) -> VisibilityScope {
        match self {
            Self::User { id, role: Role::User } => VisibilityScope::OwnedOrPublic(*id),
            _ => VisibilityScope::Unrestricted,
        }
    }
}

/// Row filter derived from a principal. Repositories translate the same value
/// into SQL, so list queries and detail checks cannot disagree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VisibilityScope {
    Unrestricted,
    OwnedOrPublic(UserId),
}

impl VisibilityScope {
    pub fn admits(&self, owner: Option<UserId>, is_public: bool) -> bool {
        match self {
            Self::Unrestricted => true,
            Self::OwnedOrPublic(id) => is_public || owner == Some(*id),
        }
    }
}

pub trait Owned {
    fn owner(&self) -> Option<UserId>;
    fn is_public(&self) -> bool;
}

pub fn can_see<E: Owned + ?Sized>(entity: &E, principal: &Principal) -> bool {
    principal.scope().admits(entity.owner(), entity.is_public())
}

/// Public visibility never grants write access to a non-owner.
pub fn can_modify<E: Owned + ?Sized>(entity: &E, principal: &Principal) -> bool {
    if principal.is_admin() {
        return true;
    }
    match (principal.user_id(), entity.owner()) {
        (Some(actor), Some(owner)) => actor == owner,
        _ => false,
    }
}

pub fn list_visible<E: Owned>(entities: Vec<E>, principal: &Principal) -> Vec<E> {
    entities.into_iter().filter(|entity| can_see(entity, principal)).collect()
}

/// Resolves a detail lookup: absent and hidden rows are indistinguishable.
pub fn require_visible<E: Owned>(
    entity: Option<E>,
    principal: &Principal,
    kind: EntityKind,
) -> Result<E, ApplicationError> {
    match entity {
        Some(entity) if can_see(&entity, principal) => Ok(entity),
        _ => Err(ApplicationError::NotFound(kind)),
    }
}

pub fn require_modifiable<E: Owned + ?Sized>(
    entity: &E,
    principal: &Principal,
    action: &'static str,
) -> Result<(), ApplicationError> {
    if can_modify(entity, principal) {
        Ok(())
    } else {
        Err(ApplicationError::Forbidden { action })
    }
}
