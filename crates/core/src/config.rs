use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sharing::DEFAULT_TOKEN_EXPIRY_DAYS;
use crate::validation::is_valid_email;

pub const ENV_PREFIX: &str = "QUOTECRAFT_";
pub const LEGACY_TOKEN_EXPIRY_ENV: &str = "TOKEN_EXPIRY_DAYS";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub sharing: SharingConfig,
    pub quotes: QuotesConfig,
    pub mail: MailConfig,
    pub admin: AdminConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SharingConfig {
    /// Public origin used to build `/view?token=` links.
    pub base_url: String,
    pub token_expiry_days: u32,
}

#[derive(Clone, Debug)]
pub struct QuotesConfig {
    pub default_valid_days: u32,
    pub number_reservation_attempts: u32,
}

#[derive(Clone, Debug)]
pub struct MailConfig {
    pub enabled: bool,
    pub from_address: String,
    pub outbox_dir: PathBuf,
}

/// First administrator created by `quotecraft-server` on an empty users table.
#[derive(Clone, Debug)]
pub struct AdminConfig {
    pub username: String,
    pub email: String,
    pub password: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub server_port: Option<u16>,
    pub sharing_base_url: Option<String>,
    pub mail_outbox_dir: Option<PathBuf>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://quotecraft.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            sharing: SharingConfig {
                base_url: "http://localhost:8080".to_string(),
                token_expiry_days: DEFAULT_TOKEN_EXPIRY_DAYS,
            },
            quotes: QuotesConfig { default_valid_days: 30, number_reservation_attempts: 5 },
            mail: MailConfig {
                enabled: true,
                from_address: "quotes@localhost.localdomain".to_string(),
                outbox_dir: PathBuf::from("outbox"),
            },
            admin: AdminConfig {
                username: "admin".to_string(),
                email: "admin@localhost.localdomain".to_string(),
                password: None,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from("quotecraft.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(sharing) = patch.sharing {
            if let Some(base_url) = sharing.base_url {
                self.sharing.base_url = base_url;
            }
            if let Some(days) = sharing.token_expiry_days {
                self.sharing.token_expiry_days = days;
            }
        }

        if let Some(quotes) = patch.quotes {
            if let Some(days) = quotes.default_valid_days {
                self.quotes.default_valid_days = days;
            }
            if let Some(attempts) = quotes.number_reservation_attempts {
                self.quotes.number_reservation_attempts = attempts;
            }
        }

        if let Some(mail) = patch.mail {
            if let Some(enabled) = mail.enabled {
                self.mail.enabled = enabled;
            }
            if let Some(from_address) = mail.from_address {
                self.mail.from_address = from_address;
            }
            if let Some(outbox_dir) = mail.outbox_dir {
                self.mail.outbox_dir = outbox_dir;
            }
        }

        if let Some(admin) = patch.admin {
            if let Some(username) = admin.username {
                self.admin.username = username;
            }
            if let Some(email) = admin.email {
                self.admin.email = email;
            }
            if let Some(admin_password_value) = admin.password {
                self.admin.password = Some(admin_password_value.into());
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("QUOTECRAFT_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("QUOTECRAFT_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("QUOTECRAFT_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("QUOTECRAFT_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("QUOTECRAFT_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("QUOTECRAFT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("QUOTECRAFT_SERVER_PORT") {
            self.server.port = parse_u16("QUOTECRAFT_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("QUOTECRAFT_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("QUOTECRAFT_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let base_url =
            read_env("QUOTECRAFT_SHARING_BASE_URL").or_else(|| read_env("APP_BASE_URL"));
        if let Some(value) = base_url {
            self.sharing.base_url = value;
        }
        if let Some(value) = read_env(LEGACY_TOKEN_EXPIRY_ENV) {
            self.sharing.token_expiry_days = parse_u32(LEGACY_TOKEN_EXPIRY_ENV, &value)?;
        }
        if let Some(value) = read_env("QUOTECRAFT_SHARING_TOKEN_EXPIRY_DAYS") {
            self.sharing.token_expiry_days =
                parse_u32("QUOTECRAFT_SHARING_TOKEN_EXPIRY_DAYS", &value)?;
        }

        if let Some(value) = read_env("QUOTECRAFT_QUOTES_DEFAULT_VALID_DAYS") {
            self.quotes.default_valid_days =
                parse_u32("QUOTECRAFT_QUOTES_DEFAULT_VALID_DAYS", &value)?;
        }
        if let Some(value) = read_env("QUOTECRAFT_QUOTES_NUMBER_RESERVATION_ATTEMPTS") {
            self.quotes.number_reservation_attempts =
                parse_u32("QUOTECRAFT_QUOTES_NUMBER_RESERVATION_ATTEMPTS", &value)?;
        }

        if let Some(value) = read_env("QUOTECRAFT_MAIL_ENABLED") {
            self.mail.enabled = parse_bool("QUOTECRAFT_MAIL_ENABLED", &value)?;
        }
        if let Some(value) = read_env("QUOTECRAFT_MAIL_FROM_ADDRESS") {
            self.mail.from_address = value;
        }
        if let Some(value) = read_env("QUOTECRAFT_MAIL_OUTBOX_DIR") {
            self.mail.outbox_dir = PathBuf::from(value);
        }

        if let Some(value) = read_env("QUOTECRAFT_ADMIN_USERNAME") {
            self.admin.username = value;
        }
        if let Some(value) = read_env("QUOTECRAFT_ADMIN_EMAIL") {
            self.admin.email = value;
        }
        if let Some(value) = read_env("QUOTECRAFT_ADMIN_PASSWORD") {
            self.admin.password = Some(value.into());
        }

        let log_level =
            read_env("QUOTECRAFT_LOGGING_LEVEL").or_else(|| read_env("QUOTECRAFT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("QUOTECRAFT_LOGGING_FORMAT").or_else(|| read_env("QUOTECRAFT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(base_url) = overrides.sharing_base_url {
            self.sharing.base_url = base_url;
        }
        if let Some(outbox_dir) = overrides.mail_outbox_dir {
            self.mail.outbox_dir = outbox_dir;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_sharing(&self.sharing)?;
        validate_quotes(&self.quotes)?;
        validate_mail(&self.mail)?;
        validate_admin(&self.admin)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("quotecraft.toml"), PathBuf::from("config/quotecraft.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_sharing(sharing: &SharingConfig) -> Result<(), ConfigError> {
    let base_url = sharing.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "sharing.base_url must start with http:// or https://".to_string(),
        ));
    }
    // Share links are written into mail markup verbatim.
    if base_url.chars().any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '<' | '>' | '`')) {
        return Err(ConfigError::Validation(
            "sharing.base_url must not contain whitespace, quotes or angle brackets".to_string(),
        ));
    }

    if !(1..=365).contains(&sharing.token_expiry_days) {
        return Err(ConfigError::Validation(
            "sharing.token_expiry_days must be in range 1..=365".to_string(),
        ));
    }

    Ok(())
}

fn validate_quotes(quotes: &QuotesConfig) -> Result<(), ConfigError> {
    if quotes.default_valid_days == 0 || quotes.default_valid_days > crate::domain::quote::MAX_VALID_DAYS
    {
        return Err(ConfigError::Validation(format!(
            "quotes.default_valid_days must be in range 1..={}",
            crate::domain::quote::MAX_VALID_DAYS
        )));
    }

    if !(1..=20).contains(&quotes.number_reservation_attempts) {
        return Err(ConfigError::Validation(
            "quotes.number_reservation_attempts must be in range 1..=20".to_string(),
        ));
    }

    Ok(())
}

fn validate_mail(mail: &MailConfig) -> Result<(), ConfigError> {
    if !mail.enabled {
        return Ok(());
    }

    if !is_valid_email(&mail.from_address) {
        return Err(ConfigError::Validation(
            "mail.from_address must be a valid email address when mail.enabled is true"
                .to_string(),
        ));
    }

    if mail.outbox_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "mail.outbox_dir is required when mail.enabled is true".to_string(),
        ));
    }

    Ok(())
}

fn validate_admin(admin: &AdminConfig) -> Result<(), ConfigError> {
    let Some(password) = &admin.password else {
        return Ok(());
    };

    if admin.username.trim().is_empty() {
        return Err(ConfigError::Validation(
            "admin.username is required when admin.password is set".to_string(),
        ));
    }
    if !is_valid_email(&admin.email) {
        return Err(ConfigError::Validation(
            "admin.email must be a valid email address".to_string(),
        ));
    }
    if password.expose_secret().chars().count() < crate::domain::user::MIN_PASSWORD_LEN {
        return Err(ConfigError::Validation(format!(
            "admin.password must have at least {} characters",
            crate::domain::user::MIN_PASSWORD_LEN
        )));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    sharing: Option<SharingPatch>,
    quotes: Option<QuotesPatch>,
    mail: Option<MailPatch>,
    admin: Option<AdminPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SharingPatch {
    base_url: Option<String>,
    token_expiry_days: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct QuotesPatch {
    default_valid_days: Option<u32>,
    number_reservation_attempts: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct MailPatch {
    enabled: Option<bool>,
    from_address: Option<String>,
    outbox_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct AdminPatch {
    username: Option<String>,
    email: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    fn missing_path() -> std::path::PathBuf {
        std::path::PathBuf::from("does-not-exist/quotecraft.toml")
    }

    #[test]
    fn defaults_are_valid_without_any_file() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions {
            config_path: Some(missing_path()),
            ..LoadOptions::default()
        })
        .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.sharing.token_expiry_days == 30, "token expiry should default to 30 days")?;
        ensure(config.quotes.default_valid_days == 30, "validity should default to 30 days")?;
        ensure(
            config.sharing.base_url == "http://localhost:8080",
            "base url should default to the local server",
        )?;
        ensure(
            matches!(config.logging.format, LogFormat::Compact),
            "default logging format should be compact",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_QUOTECRAFT_PUBLIC_URL", "https://quotes.example.com");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("quotecraft.toml");
            fs::write(
                &path,
                r#"
[sharing]
base_url = "${TEST_QUOTECRAFT_PUBLIC_URL}"
token_expiry_days = 14
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.sharing.base_url == "https://quotes.example.com",
                "base url should be interpolated from the environment",
            )?;
            ensure(config.sharing.token_expiry_days == 14, "expiry days should come from file")
        })();

        clear_vars(&["TEST_QUOTECRAFT_PUBLIC_URL"]);
        result
    }

    #[test]
    fn legacy_token_expiry_variable_is_honoured() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TOKEN_EXPIRY_DAYS", "7");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions {
                config_path: Some(missing_path()),
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;
            ensure(config.sharing.token_expiry_days == 7, "legacy variable should apply")?;

            env::set_var("QUOTECRAFT_SHARING_TOKEN_EXPIRY_DAYS", "10");
            let config = AppConfig::load(LoadOptions {
                config_path: Some(missing_path()),
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;
            ensure(config.sharing.token_expiry_days == 10, "prefixed variable should win")
        })();

        clear_vars(&["TOKEN_EXPIRY_DAYS", "QUOTECRAFT_SHARING_TOKEN_EXPIRY_DAYS"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("QUOTECRAFT_LOG_LEVEL", "warn");
        env::set_var("QUOTECRAFT_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions {
                config_path: Some(missing_path()),
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )
        })();

        clear_vars(&["QUOTECRAFT_LOG_LEVEL", "QUOTECRAFT_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("QUOTECRAFT_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("QUOTECRAFT_SERVER_PORT", "9090");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("quotecraft.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[server]
port = 7070

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.server.port == 9090, "env port should win over file and defaults")
        })();

        clear_vars(&["QUOTECRAFT_DATABASE_URL", "QUOTECRAFT_SERVER_PORT"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("QUOTECRAFT_SHARING_TOKEN_EXPIRY_DAYS", "0");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions {
                config_path: Some(missing_path()),
                ..LoadOptions::default()
            }) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("sharing.token_expiry_days")
            );
            ensure(has_message, "validation failure should mention sharing.token_expiry_days")
        })();

        clear_vars(&["QUOTECRAFT_SHARING_TOKEN_EXPIRY_DAYS"]);
        result
    }

    #[test]
    fn admin_password_is_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("QUOTECRAFT_ADMIN_PASSWORD", "correct-horse-battery");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions {
                config_path: Some(missing_path()),
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("correct-horse-battery"),
                "debug output should not contain the admin password",
            )?;
            ensure(
                config
                    .admin
                    .password
                    .as_ref()
                    .is_some_and(|password| password.expose_secret() == "correct-horse-battery"),
                "admin password should be loaded from env",
            )
        })();

        clear_vars(&["QUOTECRAFT_ADMIN_PASSWORD"]);
        result
    }

    #[test]
    fn base_url_rejects_markup_characters() -> Result<(), String> {
        let mut config = AppConfig::default();
        config.sharing.base_url = "https://quotes.example/\"><script>".to_string();

        let rejected = matches!(
            config.validate(),
            Err(ConfigError::Validation(ref message)) if message.contains("sharing.base_url")
        );
        ensure(rejected, "base_url with markup characters should be rejected")?;

        config.sharing.base_url = "https://quotes.example/app".to_string();
        ensure(config.validate().is_ok(), "plain https base_url should validate")
    }
}
