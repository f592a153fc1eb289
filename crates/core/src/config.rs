use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::authorization::RouteGuard;
use crate::validation::ValidationMode;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub dashboard: DashboardConfig,
    pub auth: AuthConfig,
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
pub struct DashboardConfig {
    pub protected_prefix: String,
    pub home_path: String,
    pub login_path: String,
    pub invoices_path: String,
    pub search_debounce_ms: u64,
    pub page_size: u32,
    pub validation_mode: ValidationMode,
    pub data_errors: DataErrorPolicy,
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub session_cookie: String,
    pub session_token: SecretString,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// What a mutation handler does with a failed database write.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataErrorPolicy {
    /// Log it and hand a generic message back to the form.
    #[default]
    Report,
    /// Fail the request.
    Propagate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub server_port: Option<u16>,
    pub session_token: Option<String>,
    pub search_debounce_ms: Option<u64>,
    pub validation_mode: Option<ValidationMode>,
    pub data_errors: Option<DataErrorPolicy>,
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

const MIN_SESSION_TOKEN_LEN: usize = 16;

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://invoicer.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 3000,
                graceful_shutdown_secs: 15,
            },
            dashboard: DashboardConfig {
                protected_prefix: "/dashboard".to_string(),
                home_path: "/dashboard".to_string(),
                login_path: "/login".to_string(),
                invoices_path: "/dashboard/invoices".to_string(),
                search_debounce_ms: 300,
                page_size: 6,
                validation_mode: ValidationMode::Report,
                data_errors: DataErrorPolicy::Report,
            },
            auth: AuthConfig {
                session_cookie: "invoicer_session".to_string(),
                session_token: String::new().into(),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
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

impl std::str::FromStr for DataErrorPolicy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "report" => Ok(Self::Report),
            "propagate" => Ok(Self::Propagate),
            other => Err(ConfigError::Validation(format!(
                "unsupported data error policy `{other}` (expected report|propagate)"
            ))),
        }
    }
}

impl DashboardConfig {
    pub fn route_guard(&self) -> RouteGuard {
        RouteGuard::new(&self.protected_prefix, &self.home_path, &self.login_path)
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("invoicer.toml"));
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

        if let Some(dashboard) = patch.dashboard {
            if let Some(protected_prefix) = dashboard.protected_prefix {
                self.dashboard.protected_prefix = protected_prefix;
            }
            if let Some(home_path) = dashboard.home_path {
                self.dashboard.home_path = home_path;
            }
            if let Some(login_path) = dashboard.login_path {
                self.dashboard.login_path = login_path;
            }
            if let Some(invoices_path) = dashboard.invoices_path {
                self.dashboard.invoices_path = invoices_path;
            }
            if let Some(search_debounce_ms) = dashboard.search_debounce_ms {
                self.dashboard.search_debounce_ms = search_debounce_ms;
            }
            if let Some(page_size) = dashboard.page_size {
                self.dashboard.page_size = page_size;
            }
            if let Some(validation_mode) = dashboard.validation_mode {
                self.dashboard.validation_mode = validation_mode;
            }
            if let Some(data_errors) = dashboard.data_errors {
                self.dashboard.data_errors = data_errors;
            }
        }

        if let Some(auth) = patch.auth {
            if let Some(session_cookie) = auth.session_cookie {
                self.auth.session_cookie = session_cookie;
            }
            if let Some(session_token_value) = auth.session_token {
                self.auth.session_token = secret_value(session_token_value);
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
        if let Some(value) = read_env("INVOICER_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("INVOICER_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("INVOICER_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("INVOICER_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("INVOICER_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("INVOICER_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("INVOICER_SERVER_PORT") {
            self.server.port = parse_u16("INVOICER_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("INVOICER_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("INVOICER_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("INVOICER_DASHBOARD_SEARCH_DEBOUNCE_MS") {
            self.dashboard.search_debounce_ms =
                parse_u64("INVOICER_DASHBOARD_SEARCH_DEBOUNCE_MS", &value)?;
        }
        if let Some(value) = read_env("INVOICER_DASHBOARD_PAGE_SIZE") {
            self.dashboard.page_size = parse_u32("INVOICER_DASHBOARD_PAGE_SIZE", &value)?;
        }
        if let Some(value) = read_env("INVOICER_DASHBOARD_VALIDATION_MODE") {
            self.dashboard.validation_mode = value.parse().map_err(|_| {
                ConfigError::InvalidEnvOverride {
                    key: "INVOICER_DASHBOARD_VALIDATION_MODE".to_string(),
                    value: value.clone(),
                }
            })?;
        }
        if let Some(value) = read_env("INVOICER_DASHBOARD_DATA_ERRORS") {
            self.dashboard.data_errors = value.parse()?;
        }

        if let Some(value) = read_env("INVOICER_AUTH_SESSION_COOKIE") {
            self.auth.session_cookie = value;
        }
        if let Some(value) = read_env("INVOICER_AUTH_SESSION_TOKEN") {
            self.auth.session_token = secret_value(value);
        }

        let log_level =
            read_env("INVOICER_LOGGING_LEVEL").or_else(|| read_env("INVOICER_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("INVOICER_LOGGING_FORMAT").or_else(|| read_env("INVOICER_LOG_FORMAT"));
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
        if let Some(session_token) = overrides.session_token {
            self.auth.session_token = secret_value(session_token);
        }
        if let Some(search_debounce_ms) = overrides.search_debounce_ms {
            self.dashboard.search_debounce_ms = search_debounce_ms;
        }
        if let Some(validation_mode) = overrides.validation_mode {
            self.dashboard.validation_mode = validation_mode;
        }
        if let Some(data_errors) = overrides.data_errors {
            self.dashboard.data_errors = data_errors;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_dashboard(&self.dashboard)?;
        validate_auth(&self.auth)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("invoicer.toml"), PathBuf::from("config/invoicer.toml")]
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

fn validate_dashboard(dashboard: &DashboardConfig) -> Result<(), ConfigError> {
    for (key, value) in [
        ("dashboard.protected_prefix", &dashboard.protected_prefix),
        ("dashboard.home_path", &dashboard.home_path),
        ("dashboard.login_path", &dashboard.login_path),
        ("dashboard.invoices_path", &dashboard.invoices_path),
    ] {
        if !value.starts_with('/') {
            return Err(ConfigError::Validation(format!("{key} must start with `/`")));
        }
    }

    let guard = dashboard.route_guard();
    if guard.is_protected(&dashboard.login_path) {
        return Err(ConfigError::Validation(
            "dashboard.login_path must live outside dashboard.protected_prefix".to_string(),
        ));
    }
    if !guard.is_protected(&dashboard.home_path) || !guard.is_protected(&dashboard.invoices_path)
    {
        return Err(ConfigError::Validation(
            "dashboard.home_path and dashboard.invoices_path must live under dashboard.protected_prefix"
                .to_string(),
        ));
    }

    // the dashboard router mounts both paths, so they must differ
    if dashboard.home_path.trim_end_matches('/') == dashboard.invoices_path.trim_end_matches('/') {
        return Err(ConfigError::Validation(
            "dashboard.home_path and dashboard.invoices_path must differ".to_string(),
        ));
    }

    if dashboard.search_debounce_ms > 10_000 {
        return Err(ConfigError::Validation(
            "dashboard.search_debounce_ms must be in range 0..=10000".to_string(),
        ));
    }

    if dashboard.page_size == 0 || dashboard.page_size > 100 {
        return Err(ConfigError::Validation(
            "dashboard.page_size must be in range 1..=100".to_string(),
        ));
    }

    Ok(())
}

fn validate_auth(auth: &AuthConfig) -> Result<(), ConfigError> {
    let cookie = auth.session_cookie.trim();
    if cookie.is_empty() || cookie.contains([';', '=', ' ']) {
        return Err(ConfigError::Validation(
            "auth.session_cookie must be a non-empty cookie name without `;`, `=` or spaces"
                .to_string(),
        ));
    }

    let token = auth.session_token.expose_secret();
    if token.trim().is_empty() {
        return Err(ConfigError::Validation(
            "auth.session_token is required. Set INVOICER_AUTH_SESSION_TOKEN or [auth] session_token"
                .to_string(),
        ));
    }
    if token.len() < MIN_SESSION_TOKEN_LEN {
        return Err(ConfigError::Validation(format!(
            "auth.session_token must be at least {MIN_SESSION_TOKEN_LEN} characters"
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

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    dashboard: Option<DashboardPatch>,
    auth: Option<AuthPatch>,
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
struct DashboardPatch {
    protected_prefix: Option<String>,
    home_path: Option<String>,
    login_path: Option<String>,
    invoices_path: Option<String>,
    search_debounce_ms: Option<u64>,
    page_size: Option<u32>,
    validation_mode: Option<ValidationMode>,
    data_errors: Option<DataErrorPolicy>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthPatch {
    session_cookie: Option<String>,
    session_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
