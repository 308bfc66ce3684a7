use std::sync::Arc;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use sqlx::sqlite::SqliteRow;
use sqlx::SqliteConnection;
use tracing::{info, warn};

use quotecraft_core::clock::Clock;
use quotecraft_core::domain::user::{
    validate_password, NewUser, Role, User, UserId, UserUpdate, SYSTEM_DISPLAY_NAME,
    UNKNOWN_DISPLAY_NAME,
};
use quotecraft_core::errors::{ApplicationError, ConflictKind, EntityKind};
use quotecraft_core::visibility::Principal;

use super::{column, parse_label, parse_timestamp, RepositoryError, UserRepository};
use crate::DbPool;

const USER_COLUMNS: &str = "id, username, email, display_name, role, is_active, created_by, \
                            created_at, updated_at";

pub struct SqlUserRepository {
    pool: DbPool,
    clock: Arc<dyn Clock>,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    async fn insert(
        &self,
        user: NewUser,
        password: &str,
        created_by: Option<UserId>,
    ) -> Result<User, RepositoryError> {
        let user = user.validate()?;
        validate_password(password)?;
        let password_hash = hash_password(password)?;
        let now = self.clock.now();
        let display_name = user.display_name.unwrap_or_else(|| user.username.clone());

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO users (username, email, password_hash, display_name, role, is_active,
                                created_by, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, 1, ?, ?, ?)
             RETURNING id",
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&password_hash)
        .bind(&display_name)
        .bind(user.role.as_str())
        .bind(created_by.map(|id| id.0))
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .fetch_one(&self.pool)
        .await?;

        info!(
            event_name = "user.created",
            user_id = id,
            username = %user.username,
            role = user.role.as_str(),
            "user account created"
        );

        Ok(User {
            id: UserId(id),
            username: user.username,
            email: user.email,
            display_name,
            role: user.role,
            is_active: true,
            created_by,
            created_at: now,
            updated_at: now,
        })
    }

    async fn find(&self, id: UserId) -> Result<User, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        fetch_user(&mut conn, id).await?.ok_or(ApplicationError::NotFound(EntityKind::User).into())
    }

    async fn active_admin_count(&self) -> Result<i64, RepositoryError> {
        let count = sqlx::query_scalar(
            "SELECT COUNT(1) FROM users WHERE role = 'admin' AND is_active = 1",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

pub fn hash_password(password: &str) -> Result<String, RepositoryError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            ApplicationError::Configuration(format!("failed to hash password: {e}")).into()
        })
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok()
}

fn require_admin(actor: &Principal, action: &'static str) -> Result<(), RepositoryError> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(ApplicationError::Forbidden { action }.into())
    }
}

fn row_to_user(row: &SqliteRow) -> Result<User, RepositoryError> {
    let role: String = column(row, "role")?;
    let created_at: String = column(row, "created_at")?;
    let updated_at: String = column(row, "updated_at")?;

    Ok(User {
        id: UserId(column(row, "id")?),
        username: column(row, "username")?,
        email: column(row, "email")?,
        display_name: column(row, "display_name")?,
        role: parse_label::<Role>(&role)?,
        is_active: column(row, "is_active")?,
        created_by: column::<Option<i64>>(row, "created_by")?.map(UserId),
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

async fn fetch_user(conn: &mut SqliteConnection, id: UserId) -> Result<Option<User>, RepositoryError> {
    let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
        .bind(id.0)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(row_to_user).transpose()
}

/// `"System"` for system-owned rows, `"Unknown"` when the owner no longer resolves.
pub(crate) async fn owner_display_name(
    conn: &mut SqliteConnection,
    owner: Option<UserId>,
) -> Result<String, RepositoryError> {
    let Some(owner) = owner else {
        return Ok(SYSTEM_DISPLAY_NAME.to_string());
    };

    let name: Option<String> = sqlx::query_scalar("SELECT display_name FROM users WHERE id = ?")
        .bind(owner.0)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(name.unwrap_or_else(|| UNKNOWN_DISPLAY_NAME.to_string()))
}

#[async_trait::async_trait]
impl UserRepository for SqlUserRepository {
    async fn authenticate(&self, username: &str, password: &str) -> Result<User, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS}, password_hash FROM users WHERE username = ?"
        ))
        .bind(username.trim())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            warn!(event_name = "auth.login.failed", username = %username, "unknown username");
            return Err(ApplicationError::Unauthenticated.into());
        };

        let password_hash: String = column(&row, "password_hash")?;
        let user = row_to_user(&row)?;
        if !user.is_active || !verify_password(password, &password_hash) {
            warn!(event_name = "auth.login.failed", username = %username, "credentials rejected");
            return Err(ApplicationError::Unauthenticated.into());
        }

        Ok(user)
    }

    async fn bootstrap_admin(
        &self,
        admin: NewUser,
        password: &str,
    ) -> Result<Option<User>, RepositoryError> {
        let existing: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM users").fetch_one(&self.pool).await?;
        if existing > 0 {
            return Ok(None);
        }

        let admin = NewUser { role: Role::Admin, ..admin };
        self.insert(admin, password, None).await.map(Some)
    }

    async fn create(
        &self,
        actor: &Principal,
        user: NewUser,
        password: &str,
    ) -> Result<User, RepositoryError> {
        require_admin(actor, "create users")?;
        self.insert(user, password, actor.user_id()).await
    }

    async fn get(&self, actor: &Principal, id: UserId) -> Result<User, RepositoryError> {
        if !actor.is_admin() && actor.user_id() != Some(id) {
            return Err(ApplicationError::NotFound(EntityKind::User).into());
        }
        self.find(id).await
    }

    async fn list(&self, actor: &Principal) -> Result<Vec<User>, RepositoryError> {
        require_admin(actor, "list users")?;
        let rows = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY username"))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_user).collect()
    }

    async fn update(
        &self,
        actor: &Principal,
        id: UserId,
        update: UserUpdate,
    ) -> Result<User, RepositoryError> {
        require_admin(actor, "modify users")?;
        let update = update.validate()?;
        let current = self.find(id).await?;

        if update.revokes_admin(&current) && self.active_admin_count().await? <= 1 {
            return Err(ApplicationError::Conflict(ConflictKind::LastAdmin).into());
        }

        let now = self.clock.now();
        let updated = User {
            email: update.email.unwrap_or(current.email),
            display_name: update.display_name.unwrap_or(current.display_name),
            role: update.role.unwrap_or(current.role),
            is_active: update.is_active.unwrap_or(current.is_active),
            updated_at: now,
            ..current
        };

        sqlx::query(
            "UPDATE users SET email = ?, display_name = ?, role = ?, is_active = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&updated.email)
        .bind(&updated.display_name)
        .bind(updated.role.as_str())
        .bind(updated.is_active)
        .bind(now.to_rfc3339())
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        Ok(updated)
    }

    async fn set_password(
        &self,
        actor: &Principal,
        id: UserId,
        password: &str,
    ) -> Result<(), RepositoryError> {
        if !actor.is_admin() && actor.user_id() != Some(id) {
            return Err(ApplicationError::Forbidden { action: "change another user's password" }
                .into());
        }
        validate_password(password)?;
        let password_hash = hash_password(password)?;

        let result = sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
            .bind(&password_hash)
            .bind(self.clock.now().to_rfc3339())
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ApplicationError::NotFound(EntityKind::User).into());
        }
        Ok(())
    }

    async fn delete(&self, actor: &Principal, id: UserId) -> Result<(), RepositoryError> {
        require_admin(actor, "delete users")?;
        if actor.user_id() == Some(id) {
            return Err(ApplicationError::Conflict(ConflictKind::SelfDeletion).into());
        }

        let current = self.find(id).await?;
        let is_active_admin = current.role == Role::Admin && current.is_active;
        if is_active_admin && self.active_admin_count().await? <= 1 {
            return Err(ApplicationError::Conflict(ConflictKind::LastAdmin).into());
        }

        sqlx::query("DELETE FROM users WHERE id = ?").bind(id.0).execute(&self.pool).await?;
        info!(event_name = "user.deleted", user_id = id.0, "user account deleted");
        Ok(())
    }

    async fn display_name_for(&self, owner: Option<UserId>) -> Result<String, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        owner_display_name(&mut conn, owner).await
    }
}
