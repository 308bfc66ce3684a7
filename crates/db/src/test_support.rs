use quotecraft_core::domain::user::{Role, UserId};

use crate::{connect_with_settings, migrations, DbPool};

/// Single-connection in-memory database with the schema applied.
pub(crate) async fn memory_pool() -> DbPool {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");
    pool
}

/// Inserts an active account directly; the display name equals the username.
pub(crate) async fn insert_user(pool: &DbPool, username: &str, role: Role) -> UserId {
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO users (username, email, password_hash, display_name, role, is_active,
                            created_at, updated_at)
         VALUES (?, ?, 'unused', ?, ?, 1, '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')
         RETURNING id",
    )
    .bind(username)
    .bind(format!("{username}@example.com"))
    .bind(username)
    .bind(role.as_str())
    .fetch_one(pool)
    .await
    .expect("insert user");
    UserId(id)
}
