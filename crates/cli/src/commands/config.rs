use std::env;
use std::fs;
use std::path::Path;

use backoffice_core::config::{resolve_config_path, AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = resolve_config_path(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "database.url",
        &config.database.url,
        source("database.url", &["BACKOFFICE_DATABASE_URL"]),
    ));
    lines.push(render_line(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        source("database.max_connections", &["BACKOFFICE_DATABASE_MAX_CONNECTIONS"]),
    ));
    lines.push(render_line(
        "database.timeout_secs",
        &config.database.timeout_secs.to_string(),
        source("database.timeout_secs", &["BACKOFFICE_DATABASE_TIMEOUT_SECS"]),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", &["BACKOFFICE_LOGGING_LEVEL", "BACKOFFICE_LOG_LEVEL"]),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", &["BACKOFFICE_LOGGING_FORMAT", "BACKOFFICE_LOG_FORMAT"]),
    ));

    lines.push(render_line(
        "tickets.number_start",
        &config.tickets.number_start.to_string(),
        source("tickets.number_start", &["BACKOFFICE_TICKETS_NUMBER_START"]),
    ));
    lines.push(render_line(
        "tickets.allow_reopen",
        &config.tickets.allow_reopen.to_string(),
        source("tickets.allow_reopen", &["BACKOFFICE_TICKETS_ALLOW_REOPEN"]),
    ));

    lines.push(render_line(
        "requisitions.number_prefix",
        &config.requisitions.number_prefix,
        source("requisitions.number_prefix", &["BACKOFFICE_REQUISITIONS_NUMBER_PREFIX"]),
    ));
    lines.push(render_line(
        "requisitions.max_approval_levels",
        &config.requisitions.max_approval_levels.to_string(),
        source(
            "requisitions.max_approval_levels",
            &["BACKOFFICE_REQUISITIONS_MAX_APPROVAL_LEVELS"],
        ),
    ));

    if config.sla.priority_overrides.is_empty() {
        lines.push(render_line(
            "sla.priority_overrides",
            "<none>",
            source("sla.priority_overrides", &[]),
        ));
    }
    for (priority, targets) in &config.sla.priority_overrides {
        let key_path = format!("sla.priority_overrides.{priority}");
        lines.push(render_line(
            &key_path,
            &format!(
                "response {}h, resolution {}h",
                targets.response_hours, targets.resolution_hours
            ),
            source(&key_path, &[]),
        ));
    }

    lines.join("\n")
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
