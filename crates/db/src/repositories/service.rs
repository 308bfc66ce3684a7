use std::sync::Arc;

use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::info;

use quotecraft_core::clock::Clock;
use quotecraft_core::domain::service::{Service, ServiceId, ServiceInput};
use quotecraft_core::errors::{ApplicationError, ConflictKind, EntityKind};
use quotecraft_core::visibility::{require_modifiable, require_visible, Principal};

use super::{
    column, optional_owner, parse_decimal, parse_timestamp, push_scope, RepositoryError,
    ServiceRepository,
};
use crate::DbPool;

const SERVICE_COLUMNS: &str = "s.id, s.name, s.description, s.base_price, s.category, \
                               s.is_active, s.owner_id, s.is_public, s.created_at, s.updated_at";

pub struct SqlServiceRepository {
    pool: DbPool,
    clock: Arc<dyn Clock>,
}

impl SqlServiceRepository {
    pub fn new(pool: DbPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    async fn modifiable(
        &self,
        conn: &mut SqliteConnection,
        actor: &Principal,
        id: ServiceId,
        action: &'static str,
    ) -> Result<Service, RepositoryError> {
        let service = require_visible(fetch_service(conn, id).await?, actor, EntityKind::Service)?;
        require_modifiable(&service, actor, action)?;
        Ok(service)
    }

    async fn write_flags(
        &self,
        conn: &mut SqliteConnection,
        current: Service,
        is_active: bool,
        is_public: bool,
    ) -> Result<Service, RepositoryError> {
        let now = self.clock.now();
        sqlx::query("UPDATE services SET is_active = ?, is_public = ?, updated_at = ? WHERE id = ?")
            .bind(is_active)
            .bind(is_public)
            .bind(now.to_rfc3339())
            .bind(current.id.0)
            .execute(&mut *conn)
            .await?;

        Ok(Service { is_active, is_public, updated_at: now, ..current })
    }
}

fn row_to_service(row: &SqliteRow) -> Result<Service, RepositoryError> {
    let base_price: String = column(row, "base_price")?;
    let created_at: String = column(row, "created_at")?;
    let updated_at: String = column(row, "updated_at")?;

    Ok(Service {
        id: ServiceId(column(row, "id")?),
        name: column(row, "name")?,
        description: column(row, "description")?,
        base_price: parse_decimal(&base_price)?,
        category: column(row, "category")?,
        is_active: column(row, "is_active")?,
        owner: optional_owner(column(row, "owner_id")?),
        is_public: column(row, "is_public")?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

pub(crate) async fn fetch_service(
    conn: &mut SqliteConnection,
    id: ServiceId,
) -> Result<Option<Service>, RepositoryError> {
    let row = sqlx::query(&format!("SELECT {SERVICE_COLUMNS} FROM services s WHERE s.id = ?"))
        .bind(id.0)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(row_to_service).transpose()
}

#[async_trait::async_trait]
impl ServiceRepository for SqlServiceRepository {
    async fn create(
        &self,
        actor: &Principal,
        input: ServiceInput,
    ) -> Result<Service, RepositoryError> {
        let input = input.validate()?;
        let owner = actor.owner_for_new_records();
        let now = self.clock.now();

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO services (name, description, base_price, category, is_active, owner_id,
                                   is_public, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.base_price.to_string())
        .bind(&input.category)
        .bind(input.is_active)
        .bind(owner.map(|id| id.0))
        .bind(input.is_public)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .fetch_one(&self.pool)
        .await?;

        info!(event_name = "service.created", service_id = id, "service created");

        Ok(Service {
            id: ServiceId(id),
            name: input.name,
            description: input.description,
            base_price: input.base_price,
            category: input.category,
            is_active: input.is_active,
            owner,
            is_public: input.is_public,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get(&self, actor: &Principal, id: ServiceId) -> Result<Service, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        Ok(require_visible(fetch_service(&mut conn, id).await?, actor, EntityKind::Service)?)
    }

    async fn list(
        &self,
        actor: &Principal,
        active_only: bool,
    ) -> Result<Vec<Service>, RepositoryError> {
        let mut builder: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("SELECT {SERVICE_COLUMNS} FROM services s WHERE 1 = 1"));
        if active_only {
            builder.push(" AND s.is_active = 1");
        }
        push_scope(&mut builder, actor.scope(), "s");
        builder.push(" ORDER BY s.category IS NULL, s.category, s.name COLLATE NOCASE, s.id");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_service).collect()
    }

    async fn update(
        &self,
        actor: &Principal,
        id: ServiceId,
        input: ServiceInput,
    ) -> Result<Service, RepositoryError> {
        let input = input.validate()?;
        let mut conn = self.pool.acquire().await?;
        let current = self.modifiable(&mut conn, actor, id, "modify this service").await?;
        let now = self.clock.now();

        sqlx::query(
            "UPDATE services
             SET name = ?, description = ?, base_price = ?, category = ?, is_active = ?,
                 is_public = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.base_price.to_string())
        .bind(&input.category)
        .bind(input.is_active)
        .bind(input.is_public)
        .bind(now.to_rfc3339())
        .bind(id.0)
        .execute(&mut *conn)
        .await?;

        Ok(Service {
            name: input.name,
            description: input.description,
            base_price: input.base_price,
            category: input.category,
            is_active: input.is_active,
            is_public: input.is_public,
            updated_at: now,
            ..current
        })
    }

    async fn set_active(
        &self,
        actor: &Principal,
        id: ServiceId,
        active: bool,
    ) -> Result<Service, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        let current = self.modifiable(&mut conn, actor, id, "change service status").await?;
        let is_public = current.is_public;
        self.write_flags(&mut conn, current, active, is_public).await
    }

    async fn toggle_active(
        &self,
        actor: &Principal,
        id: ServiceId,
    ) -> Result<Service, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        let current = self.modifiable(&mut conn, actor, id, "change service status").await?;
        let (is_active, is_public) = (!current.is_active, current.is_public);
        self.write_flags(&mut conn, current, is_active, is_public).await
    }

    async fn delete(&self, actor: &Principal, id: ServiceId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        self.modifiable(&mut tx, actor, id, "delete this service").await?;

        let referenced: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM quote_items WHERE service_id = ?")
                .bind(id.0)
                .fetch_one(&mut *tx)
                .await?;
        if referenced > 0 {
            return Err(ApplicationError::Conflict(ConflictKind::ServiceInUse).into());
        }

        sqlx::query("DELETE FROM services WHERE id = ?").bind(id.0).execute(&mut *tx).await?;
        tx.commit().await?;

        info!(event_name = "service.deleted", service_id = id.0, "service deleted");
        Ok(())
    }

    async fn toggle_visibility(
        &self,
        actor: &Principal,
        id: ServiceId,
    ) -> Result<Service, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        let current = self.modifiable(&mut conn, actor, id, "change service visibility").await?;
        let (is_active, is_public) = (current.is_active, !current.is_public);
        self.write_flags(&mut conn, current, is_active, is_public).await
    }
}
