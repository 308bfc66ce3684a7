use std::sync::Arc;

use quotecraft_core::clock::{Clock, SystemClock};
use quotecraft_core::config::{AppConfig, ConfigError, LoadOptions};
use quotecraft_core::delivery::DeliveryError;
use quotecraft_core::domain::user::{NewUser, Role};
use quotecraft_db::{connect_with_settings, migrations, DbPool, RepositoryError};
use secrecy::ExposeSecret;
use thiserror::Error;
use tracing::info;

use crate::state::{transport_for, AppState};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("quote templates failed to load: {0}")]
    Templates(#[from] DeliveryError),
    #[error("initial administrator could not be created: {0}")]
    Admin(#[source] RepositoryError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let state =
        AppState::new(&config, db_pool.clone(), clock, transport_for(&config.mail))?;

    if let Some(password) = &config.admin.password {
        let admin = NewUser {
            username: config.admin.username.clone(),
            email: config.admin.email.clone(),
            display_name: None,
            role: Role::Admin,
        };
        let created = state
            .users
            .bootstrap_admin(admin, password.expose_secret())
            .await
            .map_err(BootstrapError::Admin)?;
        if let Some(user) = created {
            info!(
                event_name = "system.bootstrap.admin_created",
                username = %user.username,
                "initial administrator created"
            );
        }
    }

    Ok(Application { config, db_pool, state })
}

#[cfg(test)]
mod tests {
    use quotecraft_core::config::AppConfig;

    use crate::bootstrap::{bootstrap_with_config, BootstrapError};

    fn file_config(dir: &tempfile::TempDir) -> AppConfig {
        let mut config = AppConfig::default();
        config.database.url =
            format!("sqlite://{}?mode=rwc", dir.path().join("quotecraft.db").display());
        config.mail.outbox_dir = dir.path().join("outbox");
        config
    }

    #[tokio::test]
    async fn bootstrap_applies_schema_and_creates_the_first_admin_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = file_config(&dir);
        config.admin.password = Some("correct-horse-battery".to_string().into());

        let app = bootstrap_with_config(config.clone()).await.expect("bootstrap");
        let (tables,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master
             WHERE type = 'table' AND name IN ('users', 'clients', 'services', 'quotes', 'quote_items')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("schema");
        assert_eq!(tables, 5);

        let admin = app
            .state
            .users
            .authenticate("admin", "correct-horse-battery")
            .await
            .expect("admin can log in");
        assert_eq!(admin.username, "admin");
        app.db_pool.close().await;

        let again = bootstrap_with_config(config).await.expect("second bootstrap");
        let (users,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM users").fetch_one(&again.db_pool).await.expect("count");
        assert_eq!(users, 1);
        again.db_pool.close().await;
    }

    #[tokio::test]
    async fn unreachable_database_fails_fast() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = file_config(&dir);
        config.database.url =
            format!("sqlite://{}", dir.path().join("missing").join("nested.db").display());
        config.database.timeout_secs = 1;

        let result = bootstrap_with_config(config).await;
        assert!(matches!(result, Err(BootstrapError::DatabaseConnect(_))));
    }
}
