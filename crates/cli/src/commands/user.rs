use std::sync::Arc;

use quotecraft_core::clock::SystemClock;
use quotecraft_core::config::AppConfig;
use quotecraft_core::domain::user::{NewUser, Role};
use quotecraft_core::visibility::Principal;
use quotecraft_db::{DbPool, SqlUserRepository, UserRepository};
use serde_json::json;

use crate::commands::{
    block_on, connect_and_migrate, load_config, CommandResult, Failure, EXIT_OPERATION,
};

#[derive(Debug, Clone)]
pub struct AddUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
    pub role: Role,
}

pub fn add(request: AddUser) -> CommandResult {
    match load_config() {
        Ok(config) => add_with(&config, request),
        Err(failure) => CommandResult::from_failure("user add", failure),
    }
}

pub fn list() -> CommandResult {
    match load_config() {
        Ok(config) => list_with(&config),
        Err(failure) => CommandResult::from_failure("user list", failure),
    }
}

/// Operator tooling acts as the system principal.
pub fn add_with(config: &AppConfig, request: AddUser) -> CommandResult {
    let result = with_repository(config, |repository| async move {
        let user = NewUser {
            username: request.username,
            email: request.email,
            display_name: request.display_name,
            role: request.role,
        };
        repository
            .create(&Principal::System, user, &request.password)
            .await
            .map_err(|error| ("user_operation", error.to_string(), EXIT_OPERATION))
    });

    match result {
        Ok(user) => CommandResult::success_with_data(
            "user add",
            format!("created {} `{}`", user.role.as_str(), user.username),
            Some(json!({ "id": user.id.0, "username": user.username, "role": user.role })),
        ),
        Err(failure) => CommandResult::from_failure("user add", failure),
    }
}

pub fn list_with(config: &AppConfig) -> CommandResult {
    let result = with_repository(config, |repository| async move {
        repository
            .list(&Principal::System)
            .await
            .map_err(|error| ("user_operation", error.to_string(), EXIT_OPERATION))
    });

    match result {
        Ok(users) => {
            let rows = users
                .iter()
                .map(|user| {
                    json!({
                        "id": user.id.0,
                        "username": user.username,
                        "email": user.email,
                        "role": user.role,
                        "is_active": user.is_active,
                    })
                })
                .collect::<Vec<_>>();
            CommandResult::success_with_data(
                "user list",
                format!("{} user(s)", users.len()),
                Some(json!(rows)),
            )
        }
        Err(failure) => CommandResult::from_failure("user list", failure),
    }
}

fn with_repository<T, F, Fut>(config: &AppConfig, operation: F) -> Result<T, Failure>
where
    F: FnOnce(SqlUserRepository) -> Fut,
    Fut: std::future::Future<Output = Result<T, Failure>>,
{
    block_on(async {
        let pool: DbPool = connect_and_migrate(config).await?;
        let outcome = operation(SqlUserRepository::new(pool.clone(), Arc::new(SystemClock))).await;
        pool.close().await;
        outcome
    })
}

#[cfg(test)]
mod tests {
    use quotecraft_core::domain::user::Role;
    use serde_json::Value;

    use super::{add_with, list_with, AddUser};
    use crate::commands::test_support::file_config;

    fn request(username: &str, password: &str) -> AddUser {
        AddUser {
            username: username.to_string(),
            email: format!("{username}@example.com"),
            password: password.to_string(),
            display_name: None,
            role: Role::Admin,
        }
    }

    #[test]
    fn added_users_are_listed_without_secrets() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = file_config(&dir);

        let added = add_with(&config, request("ops", "long-enough-password"));
        assert_eq!(added.exit_code, 0, "{}", added.output);

        let listed: Value = serde_json::from_str(&list_with(&config).output).expect("json");
        assert_eq!(listed["data"][0]["username"], "ops");
        assert_eq!(listed["data"][0]["role"], "admin");
        assert!(!listed.to_string().contains("long-enough-password"));
    }

    #[test]
    fn short_passwords_and_duplicates_are_operation_failures() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = file_config(&dir);

        let short = add_with(&config, request("ops", "short"));
        assert_eq!(short.exit_code, 6);
        assert!(short.output.contains("password"));

        assert_eq!(add_with(&config, request("ops", "long-enough-password")).exit_code, 0);
        let duplicate = add_with(&config, request("ops", "long-enough-password"));
        assert_eq!(duplicate.exit_code, 6);
    }
}
