use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use invoicer_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

use crate::commands::CommandResult;

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                2,
            )
        }
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let dashboard = &config.dashboard;
    let fields: Vec<(&str, String, &[&str])> = vec![
        ("database.url", config.database.url.clone(), &["INVOICER_DATABASE_URL"]),
        (
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["INVOICER_DATABASE_MAX_CONNECTIONS"],
        ),
        (
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            &["INVOICER_DATABASE_TIMEOUT_SECS"],
        ),
        (
            "server.bind_address",
            config.server.bind_address.clone(),
            &["INVOICER_SERVER_BIND_ADDRESS"],
        ),
        ("server.port", config.server.port.to_string(), &["INVOICER_SERVER_PORT"]),
        (
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            &["INVOICER_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        ),
        ("dashboard.protected_prefix", dashboard.protected_prefix.clone(), &[]),
        ("dashboard.home_path", dashboard.home_path.clone(), &[]),
        ("dashboard.login_path", dashboard.login_path.clone(), &[]),
        ("dashboard.invoices_path", dashboard.invoices_path.clone(), &[]),
        (
            "dashboard.search_debounce_ms",
            dashboard.search_debounce_ms.to_string(),
            &["INVOICER_DASHBOARD_SEARCH_DEBOUNCE_MS"],
        ),
        (
            "dashboard.page_size",
            dashboard.page_size.to_string(),
            &["INVOICER_DASHBOARD_PAGE_SIZE"],
        ),
        (
            "dashboard.validation_mode",
            format!("{:?}", dashboard.validation_mode),
            &["INVOICER_DASHBOARD_VALIDATION_MODE"],
        ),
        (
            "dashboard.data_errors",
            format!("{:?}", dashboard.data_errors),
            &["INVOICER_DASHBOARD_DATA_ERRORS"],
        ),
        (
            "auth.session_cookie",
            config.auth.session_cookie.clone(),
            &["INVOICER_AUTH_SESSION_COOKIE"],
        ),
        (
            "auth.session_token",
            redact_token(config.auth.session_token.expose_secret()),
            &["INVOICER_AUTH_SESSION_TOKEN"],
        ),
        (
            "logging.level",
            config.logging.level.clone(),
            &["INVOICER_LOGGING_LEVEL", "INVOICER_LOG_LEVEL"],
        ),
        (
            "logging.format",
            format!("{:?}", config.logging.format),
            &["INVOICER_LOGGING_FORMAT", "INVOICER_LOG_FORMAT"],
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(
        fields
            .into_iter()
            .map(|(key, value, env_keys)| render_line(key, &value, source(key, env_keys))),
    );

    CommandResult::success("config", lines.join("\n"))
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("invoicer.toml"), PathBuf::from("config/invoicer.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
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

    if config_file_doc.is_some_and(|doc| contains_path(doc, key_path)) {
        let file_path = config_file_path
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "config file".to_string());
        return format!("file ({file_path})");
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

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }
    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }
    "<redacted>".to_string()
}

#[cfg(test)]
mod tests {
    use toml::Value;

    use super::{contains_path, field_source, redact_token};

    #[test]
    fn redaction_keeps_only_the_token_prefix() {
        assert_eq!(redact_token("demo-session-token-0001"), "demo-***");
        assert_eq!(redact_token("opaquetokenwithoutdashes"), "<redacted>");
        assert_eq!(redact_token("   "), "<empty>");
    }

    #[test]
    fn file_source_requires_the_full_key_path() {
        let doc: Value = "[dashboard]\npage_size = 10\n".parse().expect("toml");

        assert!(contains_path(&doc, "dashboard.page_size"));
        assert!(!contains_path(&doc, "dashboard.search_debounce_ms"));
        assert_eq!(
            field_source("dashboard.page_size", &[], Some(&doc), None),
            "file (config file)"
        );
        assert_eq!(field_source("server.port", &[], Some(&doc), None), "default");
    }
}
