use chrono::Utc;
use quotecraft_core::config::AppConfig;
use quotecraft_db::DemoCatalogue;
use serde_json::json;

use crate::commands::{
    block_on, connect_and_migrate, load_config, CommandResult, Failure, EXIT_OPERATION,
};

pub fn run() -> CommandResult {
    match load_config() {
        Ok(config) => run_with(&config),
        Err(failure) => CommandResult::from_failure("seed", failure),
    }
}

pub fn run_with(config: &AppConfig) -> CommandResult {
    let result = block_on(async {
        let pool = connect_and_migrate(config).await?;

        let outcome = async {
            let seeded = DemoCatalogue::load(&pool, Utc::now())
                .await
                .map_err(|error| ("seed_execution", error.to_string(), EXIT_OPERATION))?;
            let verification = DemoCatalogue::verify(&pool)
                .await
                .map_err(|error| ("seed_verification", error.to_string(), EXIT_OPERATION))?;

            if !verification.all_present {
                return Err((
                    "seed_verification",
                    verification_message(&verification.checks),
                    EXIT_OPERATION,
                ));
            }
            Ok::<_, Failure>(seeded)
        }
        .await;

        pool.close().await;
        outcome
    });

    match result {
        Ok(seeded) => CommandResult::success_with_data(
            "seed",
            format!(
                "demo catalogue ready: {} service(s) and {} client(s) inserted",
                seeded.services_inserted, seeded.clients_inserted
            ),
            Some(json!({
                "services_inserted": seeded.services_inserted,
                "clients_inserted": seeded.clients_inserted,
            })),
        ),
        Err(failure) => CommandResult::from_failure("seed", failure),
    }
}

fn verification_message(checks: &[(&'static str, bool)]) -> String {
    let failed_checks =
        checks.iter().filter_map(|(check, passed)| (!passed).then_some(*check)).collect::<Vec<_>>();

    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::{run_with, verification_message};
    use crate::commands::test_support::file_config;

    #[test]
    fn verification_error_message_targets_failed_checks() {
        let checks = [("Consulting", true), ("Logo Design", false), ("Acme Demo Co", false)];

        assert_eq!(
            verification_message(&checks),
            "Seed verification failed for checks: Logo Design, Acme Demo Co"
        );
    }

    #[test]
    fn verification_error_message_falls_back_to_generic_when_no_labels() {
        let checks = [("Consulting", true)];
        assert_eq!(verification_message(&checks), "Some seed data failed to load");
    }

    #[test]
    fn seeding_twice_inserts_nothing_the_second_time() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = file_config(&dir);

        let first: Value = serde_json::from_str(&run_with(&config).output).expect("json");
        assert_eq!(first["status"], "ok");
        assert_eq!(first["data"]["clients_inserted"], 1);

        let second: Value = serde_json::from_str(&run_with(&config).output).expect("json");
        assert_eq!(second["data"]["services_inserted"], 0);
        assert_eq!(second["data"]["clients_inserted"], 0);
    }
}
