use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "chantier.toml";
pub const DEFAULT_ACTOR_HEADER: &str = "x-user-id";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
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

/// Identity is asserted upstream; the API only reads the acting user's id from this header.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub actor_header: String,
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

/// Without an explicit path, `chantier.toml` is looked up in the working directory and
/// then under `config/`. A missing file is not an error.
#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
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
                url: "sqlite://chantier.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            auth: AuthConfig { actor_header: DEFAULT_ACTOR_HEADER.to_string() },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl FromStr for LogFormat {
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

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }
}

impl AppConfig {
    /// Defaults, then the TOML file, then `CHANTIER_*` variables. The result is validated.
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(path) = resolve_config_path(options.config_path.as_deref()) {
            config.apply_patch(read_patch(&path)?);
        }
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.server.bind_address, self.server.port)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        let ConfigPatch { database, server, auth, logging } = patch;

        merge(&mut self.database.url, database.url);
        merge(&mut self.database.max_connections, database.max_connections);
        merge(&mut self.database.timeout_secs, database.timeout_secs);

        merge(&mut self.server.bind_address, server.bind_address);
        merge(&mut self.server.port, server.port);
        merge(&mut self.server.graceful_shutdown_secs, server.graceful_shutdown_secs);

        merge(&mut self.auth.actor_header, auth.actor_header);

        merge(&mut self.logging.level, logging.level);
        merge(&mut self.logging.format, logging.format);
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        merge(&mut self.database.url, read_env("CHANTIER_DATABASE_URL"));
        merge(
            &mut self.database.max_connections,
            parse_env("CHANTIER_DATABASE_MAX_CONNECTIONS")?,
        );
        merge(&mut self.database.timeout_secs, parse_env("CHANTIER_DATABASE_TIMEOUT_SECS")?);

        merge(&mut self.server.bind_address, read_env("CHANTIER_SERVER_BIND_ADDRESS"));
        merge(&mut self.server.port, parse_env("CHANTIER_SERVER_PORT")?);
        merge(
            &mut self.server.graceful_shutdown_secs,
            parse_env("CHANTIER_SERVER_GRACEFUL_SHUTDOWN_SECS")?,
        );

        merge(&mut self.auth.actor_header, read_env("CHANTIER_AUTH_ACTOR_HEADER"));

        // `CHANTIER_LOG_*` are accepted as short aliases.
        merge(
            &mut self.logging.level,
            read_env("CHANTIER_LOGGING_LEVEL").or_else(|| read_env("CHANTIER_LOG_LEVEL")),
        );
        let format =
            read_env("CHANTIER_LOGGING_FORMAT").or_else(|| read_env("CHANTIER_LOG_FORMAT"));
        if let Some(value) = format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_auth(&self.auth)?;
        validate_logging(&self.logging)
    }
}

fn merge<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), Path::new("config").join(DEFAULT_CONFIG_FILE)]
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

/// Replaces every `${VAR}` with the variable's value; an unset variable is an error.
fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or(ConfigError::UnterminatedInterpolation)?;
        let var = &after[..end];
        let value = env::var(var)
            .map_err(|_| ConfigError::MissingEnvInterpolation { var: var.to_string() })?;
        output.push_str(&value);
        rest = &after[end + 1..];
    }

    output.push_str(rest);
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
    if !(1..=300).contains(&database.timeout_secs) {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    let problem = if server.bind_address.trim().is_empty() {
        Some("server.bind_address must not be empty")
    } else if server.port == 0 {
        Some("server.port must be greater than zero")
    } else if server.graceful_shutdown_secs == 0 {
        Some("server.graceful_shutdown_secs must be greater than zero")
    } else {
        None
    };
    problem.map_or(Ok(()), |message| Err(ConfigError::Validation(message.to_string())))
}

fn validate_auth(auth: &AuthConfig) -> Result<(), ConfigError> {
    let header = auth.actor_header.trim();
    let valid = !header.is_empty()
        && header.bytes().all(|byte| byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_');
    if !valid {
        return Err(ConfigError::Validation(format!(
            "auth.actor_header `{header}` is not a valid HTTP header name (letters, digits, `-`, `_`)"
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

fn parse_env<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    read_env(key)
        .map(|value| {
            value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
                key: key.to_string(),
                value,
            })
        })
        .transpose()
}

/// Every table and key of `chantier.toml` is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigPatch {
    database: DatabasePatch,
    server: ServerPatch,
    auth: AuthPatch,
    logging: LoggingPatch,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AuthPatch {
    actor_header: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
