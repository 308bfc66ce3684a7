use std::fs;

use quotecraft_core::config::{AppConfig, LoadOptions};
use quotecraft_db::migrations::MIGRATOR;
use serde::Serialize;

use crate::commands::{block_on, connect, Failure};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => build_report(&config),
        Err(error) => config_failure_report(error.to_string()),
    };
    render(&report, json_output)
}

fn render(report: &DoctorReport, json_output: bool) -> String {
    if json_output {
        return serde_json::to_string_pretty(report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(report)
}

fn build_report(config: &AppConfig) -> DoctorReport {
    let mut checks = vec![DoctorCheck {
        name: "config_validation",
        status: CheckStatus::Pass,
        details: "configuration loaded and validated".to_string(),
    }];
    checks.extend(check_database(config));
    checks.push(check_mail_outbox(config));
    finish(checks)
}

fn config_failure_report(error: String) -> DoctorReport {
    let skipped = |name| DoctorCheck {
        name,
        status: CheckStatus::Skipped,
        details: "skipped because configuration did not load".to_string(),
    };
    finish(vec![
        DoctorCheck { name: "config_validation", status: CheckStatus::Fail, details: error },
        skipped("database_connectivity"),
        skipped("schema_migrations"),
        skipped("mail_outbox"),
    ])
}

fn finish(checks: Vec<DoctorCheck>) -> DoctorReport {
    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

/// Connectivity plus applied-versus-known migration count. Read-only: the
/// doctor never migrates.
fn check_database(config: &AppConfig) -> [DoctorCheck; 2] {
    let result = block_on(async {
        let pool = connect(config).await?;
        let applied = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1",
        )
        .fetch_one(&pool)
        .await
        .unwrap_or(0);
        pool.close().await;
        Ok::<i64, Failure>(applied)
    });

    match result {
        Ok(applied) => {
            let known = MIGRATOR
                .iter()
                .filter(|migration| !migration.migration_type.is_down_migration())
                .count() as i64;
            let schema = if applied >= known {
                DoctorCheck {
                    name: "schema_migrations",
                    status: CheckStatus::Pass,
                    details: format!("{applied} of {known} migration(s) applied"),
                }
            } else {
                DoctorCheck {
                    name: "schema_migrations",
                    status: CheckStatus::Fail,
                    details: format!(
                        "{applied} of {known} migration(s) applied; run `quotecraft migrate`"
                    ),
                }
            };
            [
                DoctorCheck {
                    name: "database_connectivity",
                    status: CheckStatus::Pass,
                    details: format!("connected using `{}`", config.database.url),
                },
                schema,
            ]
        }
        Err((_, message, _)) => [
            DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to connect to database: {message}"),
            },
            DoctorCheck {
                name: "schema_migrations",
                status: CheckStatus::Skipped,
                details: "skipped because the database is unreachable".to_string(),
            },
        ],
    }
}

fn check_mail_outbox(config: &AppConfig) -> DoctorCheck {
    if !config.mail.enabled {
        return DoctorCheck {
            name: "mail_outbox",
            status: CheckStatus::Skipped,
            details: "mail delivery is disabled".to_string(),
        };
    }

    let dir = &config.mail.outbox_dir;
    let probe = dir.join(".doctor-probe");
    let writable = fs::create_dir_all(dir)
        .and_then(|()| fs::write(&probe, b"ok"))
        .and_then(|()| fs::remove_file(&probe));

    match writable {
        Ok(()) => DoctorCheck {
            name: "mail_outbox",
            status: CheckStatus::Pass,
            details: format!("outbox `{}` is writable", dir.display()),
        },
        Err(error) => DoctorCheck {
            name: "mail_outbox",
            status: CheckStatus::Fail,
            details: format!("outbox `{}` is not writable: {error}", dir.display()),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::{build_report, config_failure_report, render, CheckStatus};
    use crate::commands::migrate;
    use crate::commands::test_support::file_config;

    fn status_of(report: &super::DoctorReport, name: &str) -> CheckStatus {
        report.checks.iter().find(|check| check.name == name).expect("check present").status
    }

    #[test]
    fn unmigrated_database_fails_the_schema_check() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = file_config(&dir);

        let report = build_report(&config);

        assert_eq!(status_of(&report, "database_connectivity"), CheckStatus::Pass);
        assert_eq!(status_of(&report, "schema_migrations"), CheckStatus::Fail);
        assert_eq!(report.overall_status, CheckStatus::Fail);
    }

    #[test]
    fn migrated_database_with_writable_outbox_passes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = file_config(&dir);
        assert_eq!(migrate::run_with(&config).exit_code, 0);

        let report = build_report(&config);

        assert_eq!(report.overall_status, CheckStatus::Pass, "{}", render(&report, false));
        let json: Value = serde_json::from_str(&render(&report, true)).expect("json");
        assert_eq!(json["overall_status"], "pass");
    }

    #[test]
    fn config_failures_skip_dependent_checks() {
        let report = config_failure_report("database.url must be a sqlite URL".to_string());
        let human = render(&report, false);

        assert!(human.contains("- [fail] config_validation: database.url must be a sqlite URL"));
        assert!(human.contains("- [skip] database_connectivity"));
        assert_eq!(report.overall_status, CheckStatus::Fail);
    }
}
