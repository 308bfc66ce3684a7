use std::sync::Arc;

use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::info;

use quotecraft_core::clock::Clock;
use quotecraft_core::domain::client::{Client, ClientId, ClientInput};
use quotecraft_core::errors::{ApplicationError, ConflictKind, EntityKind};
use quotecraft_core::visibility::{require_modifiable, require_visible, Principal};

use super::{
    column, like_pattern, optional_owner, parse_timestamp, push_scope, ClientRepository,
    RepositoryError,
};
use crate::DbPool;

const CLIENT_COLUMNS: &str = "c.id, c.name, c.email, c.phone, c.company, c.address, c.owner_id, \
                              c.is_public, c.created_at, c.updated_at";

pub struct SqlClientRepository {
    pool: DbPool,
    clock: Arc<dyn Clock>,
}

impl SqlClientRepository {
    pub fn new(pool: DbPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    async fn modifiable(
        &self,
        conn: &mut SqliteConnection,
        actor: &Principal,
        id: ClientId,
        action: &'static str,
    ) -> Result<Client, RepositoryError> {
        let client = require_visible(fetch_client(conn, id).await?, actor, EntityKind::Client)?;
        require_modifiable(&client, actor, action)?;
        Ok(client)
    }
}

pub(crate) fn row_to_client(row: &SqliteRow) -> Result<Client, RepositoryError> {
    let created_at: String = column(row, "created_at")?;
    let updated_at: String = column(row, "updated_at")?;

    Ok(Client {
        id: ClientId(column(row, "id")?),
        name: column(row, "name")?,
        email: column(row, "email")?,
        phone: column(row, "phone")?,
        company: column(row, "company")?,
        address: column(row, "address")?,
        owner: optional_owner(column(row, "owner_id")?),
        is_public: column(row, "is_public")?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

/// Unfiltered lookup; callers pass the result through the visibility policy.
pub(crate) async fn fetch_client(
    conn: &mut SqliteConnection,
    id: ClientId,
) -> Result<Option<Client>, RepositoryError> {
    let row = sqlx::query(&format!("SELECT {CLIENT_COLUMNS} FROM clients c WHERE c.id = ?"))
        .bind(id.0)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(row_to_client).transpose()
}

#[async_trait::async_trait]
impl ClientRepository for SqlClientRepository {
    async fn create(
        &self,
        actor: &Principal,
        input: ClientInput,
    ) -> Result<Client, RepositoryError> {
        let input = input.validate()?;
        let owner = actor.owner_for_new_records();
        let now = self.clock.now();

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO clients (name, email, phone, company, address, owner_id, is_public,
                                  created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(&input.name)
        .bind(&input.email)
        .bind(&input.phone)
        .bind(&input.company)
        .bind(&input.address)
        .bind(owner.map(|id| id.0))
        .bind(input.is_public)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .fetch_one(&self.pool)
        .await?;

        info!(event_name = "client.created", client_id = id, "client created");

        Ok(Client {
            id: ClientId(id),
            name: input.name,
            email: input.email,
            phone: input.phone,
            company: input.company,
            address: input.address,
            owner,
            is_public: input.is_public,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get(&self, actor: &Principal, id: ClientId) -> Result<Client, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        Ok(require_visible(fetch_client(&mut conn, id).await?, actor, EntityKind::Client)?)
    }

    async fn list(&self, actor: &Principal) -> Result<Vec<Client>, RepositoryError> {
        let mut builder: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("SELECT {CLIENT_COLUMNS} FROM clients c WHERE 1 = 1"));
        push_scope(&mut builder, actor.scope(), "c");
        builder.push(" ORDER BY c.name COLLATE NOCASE, c.id");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_client).collect()
    }

    async fn search(&self, actor: &Principal, term: &str) -> Result<Vec<Client>, RepositoryError> {
        if term.trim().is_empty() {
            return self.list(actor).await;
        }

        let pattern = like_pattern(term);
        let mut builder: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("SELECT {CLIENT_COLUMNS} FROM clients c WHERE ("));
        builder.push("c.name LIKE ").push_bind(pattern.clone()).push(" ESCAPE '\\'");
        builder.push(" OR c.email LIKE ").push_bind(pattern.clone()).push(" ESCAPE '\\'");
        builder.push(" OR c.company LIKE ").push_bind(pattern).push(" ESCAPE '\\')");
        push_scope(&mut builder, actor.scope(), "c");
        builder.push(" ORDER BY c.name COLLATE NOCASE, c.id");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_client).collect()
    }

    async fn update(
        &self,
        actor: &Principal,
        id: ClientId,
        input: ClientInput,
    ) -> Result<Client, RepositoryError> {
        let input = input.validate()?;
        let mut conn = self.pool.acquire().await?;
        let current = self.modifiable(&mut conn, actor, id, "modify this client").await?;
        let now = self.clock.now();

        sqlx::query(
            "UPDATE clients
             SET name = ?, email = ?, phone = ?, company = ?, address = ?, is_public = ?,
                 updated_at = ?
             WHERE id = ?",
        )
        .bind(&input.name)
        .bind(&input.email)
        .bind(&input.phone)
        .bind(&input.company)
        .bind(&input.address)
        .bind(input.is_public)
        .bind(now.to_rfc3339())
        .bind(id.0)
        .execute(&mut *conn)
        .await?;

        Ok(Client {
            name: input.name,
            email: input.email,
            phone: input.phone,
            company: input.company,
            address: input.address,
            is_public: input.is_public,
            updated_at: now,
            ..current
        })
    }

    async fn delete(&self, actor: &Principal, id: ClientId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        self.modifiable(&mut tx, actor, id, "delete this client").await?;

        let referenced: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM quotes WHERE client_id = ?")
            .bind(id.0)
            .fetch_one(&mut *tx)
            .await?;
        if referenced > 0 {
            return Err(ApplicationError::Conflict(ConflictKind::ClientHasQuotes).into());
        }

        sqlx::query("DELETE FROM clients WHERE id = ?").bind(id.0).execute(&mut *tx).await?;
        tx.commit().await?;

        info!(event_name = "client.deleted", client_id = id.0, "client deleted");
        Ok(())
    }

    async fn toggle_visibility(
        &self,
        actor: &Principal,
        id: ClientId,
    ) -> Result<Client, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        let current = self.modifiable(&mut conn, actor, id, "change client visibility").await?;
        let now = self.clock.now();
        let is_public = !current.is_public;

        sqlx::query("UPDATE clients SET is_public = ?, updated_at = ? WHERE id = ?")
            .bind(is_public)
            .bind(now.to_rfc3339())
            .bind(id.0)
            .execute(&mut *conn)
            .await?;

        Ok(Client { is_public, updated_at: now, ..current })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use quotecraft_core::clock::SystemClock;
    use quotecraft_core::domain::client::{ClientId, ClientInput};
    use quotecraft_core::domain::user::{Role, UserId};
    use quotecraft_core::errors::{ApplicationError, ConflictKind, EntityKind};
    use quotecraft_core::visibility::Principal;

    use super::SqlClientRepository;
    use crate::repositories::{ClientRepository, RepositoryError};
    use crate::test_support::{insert_user, memory_pool};

    fn input(name: &str, email: &str, is_public: bool) -> ClientInput {
        ClientInput {
            name: name.to_string(),
            email: email.to_string(),
            is_public,
            ..ClientInput::default()
        }
    }

    fn application(error: RepositoryError) -> ApplicationError {
        ApplicationError::from(error)
    }

    async fn setup() -> (SqlClientRepository, Principal, Principal) {
        let pool = memory_pool().await;
        let alice = insert_user(&pool, "alice", Role::User).await;
        let bob = insert_user(&pool, "bob", Role::User).await;
        (
            SqlClientRepository::new(pool, Arc::new(SystemClock)),
            Principal::user(alice, Role::User),
            Principal::user(bob, Role::User),
        )
    }

    #[tokio::test]
    async fn duplicate_email_fails_and_keeps_the_first_client() {
        let (repo, alice, _) = setup().await;
        let first = repo.create(&alice, input("Ana", "ana@x.com", false)).await.expect("create");

        let error = repo
            .create(&alice, input("Ana Clone", "ANA@x.com", false))
            .await
            .expect_err("duplicate email");
        assert_eq!(application(error), ApplicationError::Conflict(ConflictKind::DuplicateEmail));

        let stored = repo.get(&alice, first.id).await.expect("first client intact");
        assert_eq!(stored.name, "Ana");
        assert_eq!(stored.email, "ana@x.com");
    }

    #[tokio::test]
    async fn private_clients_are_hidden_from_other_users() {
        let (repo, alice, bob) = setup().await;
        let private = repo.create(&bob, input("Bob Co", "bob@co.com", false)).await.expect("create");
        repo.create(&bob, input("Bob Public", "pub@co.com", true)).await.expect("create");
        repo.create(&alice, input("Alice Co", "alice@co.com", false)).await.expect("create");

        let names: Vec<String> =
            repo.list(&alice).await.expect("list").into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Alice Co".to_string(), "Bob Public".to_string()]);

        let hidden = repo.get(&alice, private.id).await.expect_err("hidden");
        let missing = repo.get(&alice, ClientId(9_999)).await.expect_err("missing");
        assert_eq!(application(hidden), ApplicationError::NotFound(EntityKind::Client));
        assert_eq!(application(missing), ApplicationError::NotFound(EntityKind::Client));

        assert_eq!(repo.list(&Principal::System).await.expect("admin list").len(), 3);
    }

    #[tokio::test]
    async fn public_clients_are_read_only_for_non_owners() {
        let (repo, alice, bob) = setup().await;
        let shared = repo.create(&bob, input("Shared", "shared@co.com", true)).await.expect("create");

        assert_eq!(repo.get(&alice, shared.id).await.expect("visible").name, "Shared");
        let error = repo
            .update(&alice, shared.id, input("Hijack", "shared@co.com", true))
            .await
            .expect_err("not owner");
        assert!(matches!(application(error), ApplicationError::Forbidden { .. }));
        assert!(repo.toggle_visibility(&alice, shared.id).await.is_err());
        assert!(repo.delete(&alice, shared.id).await.is_err());
    }

    #[tokio::test]
    async fn toggling_visibility_exposes_the_client() {
        let (repo, alice, bob) = setup().await;
        let client = repo.create(&bob, input("Bob Co", "bob@co.com", false)).await.expect("create");
        assert!(repo.get(&alice, client.id).await.is_err());

        let toggled = repo.toggle_visibility(&bob, client.id).await.expect("toggle");
        assert!(toggled.is_public);
        assert!(repo.get(&alice, client.id).await.is_ok());
    }

    #[tokio::test]
    async fn search_matches_name_or_email_within_scope() {
        let (repo, alice, bob) = setup().await;
        repo.create(&alice, input("Acme Ltd", "hello@acme.com", false)).await.expect("create");
        repo.create(&alice, input("Globex", "acme-buyer@globex.com", false)).await.expect("create");
        repo.create(&bob, input("Acme Hidden", "hidden@acme.com", false)).await.expect("create");

        let found = repo.search(&alice, "ACME").await.expect("search");
        let names: Vec<&str> = found.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Acme Ltd", "Globex"]);
    }

    #[tokio::test]
    async fn system_created_clients_have_no_owner() {
        let (repo, alice, _) = setup().await;
        let client =
            repo.create(&Principal::System, input("Seed", "seed@co.com", true)).await.expect("create");
        assert_eq!(client.owner, None);
        assert!(repo.update(&alice, client.id, input("Seed", "seed@co.com", true)).await.is_err());

        let admin = Principal::user(UserId(42), Role::Admin);
        assert!(repo.update(&admin, client.id, input("Seed 2", "seed@co.com", true)).await.is_ok());
    }
}
