use quotecraft_core::config::AppConfig;

use crate::commands::{block_on, connect_and_migrate, load_config, CommandResult, Failure};

pub fn run() -> CommandResult {
    match load_config() {
        Ok(config) => run_with(&config),
        Err(failure) => CommandResult::from_failure("migrate", failure),
    }
}

pub fn run_with(config: &AppConfig) -> CommandResult {
    let result = block_on(async {
        let pool = connect_and_migrate(config).await?;
        pool.close().await;
        Ok::<(), Failure>(())
    });

    match result {
        Ok(()) => CommandResult::success("migrate", "applied pending migrations"),
        Err(failure) => CommandResult::from_failure("migrate", failure),
    }
}
