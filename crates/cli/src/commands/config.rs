use std::env;
use std::fs;
use std::path::Path;

use quotecraft_core::config::{resolve_config_path, AppConfig, LoadOptions, LEGACY_TOKEN_EXPIRY_ENV};
use toml::Value;

struct Field {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = resolve_config_path(None);
    render(&config, config_file_path.as_deref())
}

fn render(config: &AppConfig, config_file_path: Option<&Path>) -> String {
    let config_file_doc = load_config_file_doc(config_file_path);

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(config) {
        let source =
            field_source(field.key, field.env_keys, config_file_doc.as_ref(), config_file_path);
        lines.push(render_line(field.key, &field.value, source));
    }
    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let admin_password = if config.admin.password.is_some() { "<redacted>" } else { "<unset>" };

    vec![
        Field {
            key: "database.url",
            value: config.database.url.clone(),
            env_keys: &["QUOTECRAFT_DATABASE_URL"],
        },
        Field {
            key: "database.max_connections",
            value: config.database.max_connections.to_string(),
            env_keys: &["QUOTECRAFT_DATABASE_MAX_CONNECTIONS"],
        },
        Field {
            key: "database.timeout_secs",
            value: config.database.timeout_secs.to_string(),
            env_keys: &["QUOTECRAFT_DATABASE_TIMEOUT_SECS"],
        },
        Field {
            key: "server.bind_address",
            value: config.server.bind_address.clone(),
            env_keys: &["QUOTECRAFT_SERVER_BIND_ADDRESS"],
        },
        Field {
            key: "server.port",
            value: config.server.port.to_string(),
            env_keys: &["QUOTECRAFT_SERVER_PORT"],
        },
        Field {
            key: "server.graceful_shutdown_secs",
            value: config.server.graceful_shutdown_secs.to_string(),
            env_keys: &["QUOTECRAFT_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        },
        Field {
            key: "sharing.base_url",
            value: config.sharing.base_url.clone(),
            env_keys: &["QUOTECRAFT_SHARING_BASE_URL", "APP_BASE_URL"],
        },
        Field {
            key: "sharing.token_expiry_days",
            value: config.sharing.token_expiry_days.to_string(),
            env_keys: &["QUOTECRAFT_SHARING_TOKEN_EXPIRY_DAYS", LEGACY_TOKEN_EXPIRY_ENV],
        },
        Field {
            key: "quotes.default_valid_days",
            value: config.quotes.default_valid_days.to_string(),
            env_keys: &["QUOTECRAFT_QUOTES_DEFAULT_VALID_DAYS"],
        },
        Field {
            key: "quotes.number_reservation_attempts",
            value: config.quotes.number_reservation_attempts.to_string(),
            env_keys: &["QUOTECRAFT_QUOTES_NUMBER_RESERVATION_ATTEMPTS"],
        },
        Field {
            key: "mail.enabled",
            value: config.mail.enabled.to_string(),
            env_keys: &["QUOTECRAFT_MAIL_ENABLED"],
        },
        Field {
            key: "mail.from_address",
            value: config.mail.from_address.clone(),
            env_keys: &["QUOTECRAFT_MAIL_FROM_ADDRESS"],
        },
        Field {
            key: "mail.outbox_dir",
            value: config.mail.outbox_dir.display().to_string(),
            env_keys: &["QUOTECRAFT_MAIL_OUTBOX_DIR"],
        },
        Field {
            key: "admin.username",
            value: config.admin.username.clone(),
            env_keys: &["QUOTECRAFT_ADMIN_USERNAME"],
        },
        Field {
            key: "admin.email",
            value: config.admin.email.clone(),
            env_keys: &["QUOTECRAFT_ADMIN_EMAIL"],
        },
        Field {
            key: "admin.password",
            value: admin_password.to_string(),
            env_keys: &["QUOTECRAFT_ADMIN_PASSWORD"],
        },
        Field {
            key: "logging.level",
            value: config.logging.level.clone(),
            env_keys: &["QUOTECRAFT_LOGGING_LEVEL", "QUOTECRAFT_LOG_LEVEL"],
        },
        Field {
            key: "logging.format",
            value: config.logging.format.as_str().to_string(),
            env_keys: &["QUOTECRAFT_LOGGING_FORMAT", "QUOTECRAFT_LOG_FORMAT"],
        },
    ]
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

#[cfg(test)]
mod tests {
    use std::fs;

    use quotecraft_core::config::AppConfig;
    use toml::Value;

    use super::{contains_path, render};

    #[test]
    fn file_keys_are_attributed_to_the_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("quotecraft.toml");
        fs::write(&path, "[quotes]\ndefault_valid_days = 45\n").expect("write config");

        let output = render(&AppConfig::default(), Some(&path));

        let line = output
            .lines()
            .find(|line| line.starts_with("- quotes.default_valid_days"))
            .expect("field listed");
        assert!(line.contains("source: file ("), "{line}");
        assert!(output.contains("- mail.enabled = true (source: default)"));
    }

    #[test]
    fn admin_password_is_never_printed() {
        let mut config = AppConfig::default();
        config.admin.password = Some("correct-horse-battery".to_string().into());

        let output = render(&config, None);

        assert!(output.contains("- admin.password = <redacted>"));
        assert!(!output.contains("correct-horse-battery"));
    }

    #[test]
    fn nested_paths_are_resolved_segment_by_segment() {
        let doc: Value = "[sharing]\nbase_url = \"https://quotes.example\"\n".parse().expect("toml");
        assert!(contains_path(&doc, "sharing.base_url"));
        assert!(!contains_path(&doc, "sharing.token_expiry_days"));
    }
}
