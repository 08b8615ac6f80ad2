use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::approvals::DEFAULT_MAX_APPROVAL_LEVELS;
use crate::domain::category::SlaTargets;
use crate::domain::priority::Priority;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub sla: SlaConfig,
    pub tickets: TicketConfig,
    pub requisitions: RequisitionConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Priority-level targets that replace a category's own SLA at ticket creation.
#[derive(Clone, Debug, Default)]
pub struct SlaConfig {
    pub priority_overrides: BTreeMap<Priority, SlaTargets>,
}

#[derive(Clone, Debug)]
pub struct TicketConfig {
    pub number_start: u64,
    pub allow_reopen: bool,
}

#[derive(Clone, Debug)]
pub struct RequisitionConfig {
    pub number_prefix: String,
    pub max_approval_levels: u32,
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
    pub log_format: Option<LogFormat>,
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
                url: "sqlite://backoffice.db?mode=rwc".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
            sla: SlaConfig::default(),
            tickets: TicketConfig { number_start: 1, allow_reopen: true },
            requisitions: RequisitionConfig {
                number_prefix: "REQ-".to_string(),
                max_approval_levels: DEFAULT_MAX_APPROVAL_LEVELS,
            },
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
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("backoffice.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Formats a requisition number with the configured prefix, e.g. `REQ-000042`.
    pub fn requisition_reference(&self, number: u64) -> String {
        format_reference(&self.requisitions.number_prefix, number)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
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

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        if let Some(sla) = patch.sla {
            for (key, targets) in sla.priority_overrides.unwrap_or_default() {
                let priority = key.parse::<Priority>().map_err(|_| {
                    ConfigError::Validation(format!(
                        "sla.priority_overrides has unknown priority `{key}` (expected low|normal|high|urgent)"
                    ))
                })?;
                self.sla
                    .priority_overrides
                    .insert(priority, SlaTargets::new(targets.response_hours, targets.resolution_hours));
            }
        }

        if let Some(tickets) = patch.tickets {
            if let Some(number_start) = tickets.number_start {
                self.tickets.number_start = number_start;
            }
            if let Some(allow_reopen) = tickets.allow_reopen {
                self.tickets.allow_reopen = allow_reopen;
            }
        }

        if let Some(requisitions) = patch.requisitions {
            if let Some(number_prefix) = requisitions.number_prefix {
                self.requisitions.number_prefix = number_prefix;
            }
            if let Some(max_approval_levels) = requisitions.max_approval_levels {
                self.requisitions.max_approval_levels = max_approval_levels;
            }
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("BACKOFFICE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("BACKOFFICE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("BACKOFFICE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("BACKOFFICE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("BACKOFFICE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        let log_level =
            read_env("BACKOFFICE_LOGGING_LEVEL").or_else(|| read_env("BACKOFFICE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("BACKOFFICE_LOGGING_FORMAT").or_else(|| read_env("BACKOFFICE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        if let Some(value) = read_env("BACKOFFICE_TICKETS_NUMBER_START") {
            self.tickets.number_start = parse_u64("BACKOFFICE_TICKETS_NUMBER_START", &value)?;
        }
        if let Some(value) = read_env("BACKOFFICE_TICKETS_ALLOW_REOPEN") {
            self.tickets.allow_reopen = parse_bool("BACKOFFICE_TICKETS_ALLOW_REOPEN", &value)?;
        }

        if let Some(value) = read_env("BACKOFFICE_REQUISITIONS_NUMBER_PREFIX") {
            self.requisitions.number_prefix = value;
        }
        if let Some(value) = read_env("BACKOFFICE_REQUISITIONS_MAX_APPROVAL_LEVELS") {
            self.requisitions.max_approval_levels =
                parse_u32("BACKOFFICE_REQUISITIONS_MAX_APPROVAL_LEVELS", &value)?;
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
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_logging(&self.logging)?;
        validate_sla(&self.sla)?;
        validate_tickets(&self.tickets)?;
        validate_requisitions(&self.requisitions)?;
        Ok(())
    }
}

/// Human-facing requisition reference: the prefix followed by a zero-padded six digit number.
pub fn format_reference(prefix: &str, number: u64) -> String {
    format!("{prefix}{number:06}")
}

pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("backoffice.toml"), PathBuf::from("config/backoffice.toml")]
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

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn validate_sla(sla: &SlaConfig) -> Result<(), ConfigError> {
    for (priority, targets) in &sla.priority_overrides {
        if targets.response_hours == 0 || targets.resolution_hours == 0 {
            return Err(ConfigError::Validation(format!(
                "sla.priority_overrides.{priority} hours must be greater than zero"
            )));
        }
        if targets.resolution_hours > SlaTargets::MAX_HOURS {
            return Err(ConfigError::Validation(format!(
                "sla.priority_overrides.{priority} hours must not exceed {}",
                SlaTargets::MAX_HOURS
            )));
        }
        if targets.response_hours > targets.resolution_hours {
            return Err(ConfigError::Validation(format!(
                "sla.priority_overrides.{priority}.response_hours must not exceed resolution_hours"
            )));
        }
    }
    Ok(())
}

fn validate_tickets(tickets: &TicketConfig) -> Result<(), ConfigError> {
    if tickets.number_start == 0 {
        return Err(ConfigError::Validation(
            "tickets.number_start must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_requisitions(requisitions: &RequisitionConfig) -> Result<(), ConfigError> {
    if requisitions.number_prefix.trim().is_empty() {
        return Err(ConfigError::Validation(
            "requisitions.number_prefix must not be empty".to_string(),
        ));
    }
    if requisitions.max_approval_levels == 0 || requisitions.max_approval_levels > 10 {
        return Err(ConfigError::Validation(
            "requisitions.max_approval_levels must be in range 1..=10".to_string(),
        ));
    }
    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
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
    logging: Option<LoggingPatch>,
    sla: Option<SlaPatch>,
    tickets: Option<TicketsPatch>,
    requisitions: Option<RequisitionsPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[derive(Debug, Default, Deserialize)]
struct SlaPatch {
    priority_overrides: Option<BTreeMap<String, SlaTargetsPatch>>,
}

#[derive(Debug, Deserialize)]
struct SlaTargetsPatch {
    response_hours: u32,
    resolution_hours: u32,
}

#[derive(Debug, Default, Deserialize)]
struct TicketsPatch {
    number_start: Option<u64>,
    allow_reopen: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct RequisitionsPatch {
    number_prefix: Option<String>,
    max_approval_levels: Option<u32>,
}
