//! Layered settings: TOML file, then environment, then command-line flags.

use crate::cli::Cli;
use leadcall_telegram::DEFAULT_API_BASE;
use serde::Deserialize;
use serde_json::{Value, json};
use std::net::{AddrParseError, SocketAddr};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "leadcall.toml";
pub const DEFAULT_BIND: &str = "0.0.0.0:8000";
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 30;

const REDACTED: &str = "<redacted>";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("missing {0} (set it in the config file or the {1} environment variable)")]
    Missing(&'static str, &'static str),

    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("invalid bind address `{value}`: {source}")]
    InvalidBind {
        value: String,
        #[source]
        source: AddrParseError,
    },

    #[error("invalid PORT `{0}`")]
    InvalidPort(String),
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    bot_token: Option<String>,
    admin_password: Option<String>,
    bind: Option<String>,
    api_base: Option<String>,
    poll_timeout_secs: Option<u64>,
}

/// Values taken from the process environment.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub bot_token: Option<String>,
    pub admin_password: Option<String>,
    pub bind: Option<String>,
    pub port: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            bot_token: lookup("BOT_TOKEN"),
            admin_password: lookup("ADMIN_PASSWORD"),
            bind: lookup("LEADCALL_BIND"),
            port: lookup("PORT"),
        }
    }
}

/// Values taken from command-line flags.
#[derive(Debug, Clone, Default)]
pub struct FlagOverrides {
    pub config: Option<PathBuf>,
    pub bind: Option<String>,
    pub api_base: Option<String>,
    pub poll_timeout_secs: Option<u64>,
}

impl From<&Cli> for FlagOverrides {
    fn from(cli: &Cli) -> Self {
        Self {
            config: cli.config.as_ref().map(PathBuf::from),
            bind: cli.bind.clone(),
            api_base: cli.api_base.clone(),
            poll_timeout_secs: cli.poll_timeout,
        }
    }
}

#[derive(Clone)]
pub struct Settings {
    pub bot_token: String,
    pub admin_password: String,
    pub bind: SocketAddr,
    pub api_base: String,
    pub poll_timeout_secs: u64,
    pub source: Option<PathBuf>,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("bot_token", &REDACTED)
            .field("admin_password", &REDACTED)
            .field("bind", &self.bind)
            .field("api_base", &self.api_base)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .field("source", &self.source)
            .finish()
    }
}

impl Settings {
    /// Resolve settings. A missing file is only an error when the path was
    /// given explicitly.
    pub fn resolve(env: &EnvOverrides, flags: &FlagOverrides) -> Result<Self, ConfigError> {
        let (file, source) = match &flags.config {
            Some(path) => (load_file(path)?, Some(path.clone())),
            None => {
                let path = Path::new(DEFAULT_CONFIG_PATH);
                if path.exists() {
                    (load_file(path)?, Some(path.to_path_buf()))
                } else {
                    (FileConfig::default(), None)
                }
            }
        };

        let bot_token = env
            .bot_token
            .clone()
            .or(file.bot_token)
            .ok_or(ConfigError::Missing("bot_token", "BOT_TOKEN"))?;
        if bot_token.trim().is_empty() {
            return Err(ConfigError::Empty("bot_token"));
        }
        let admin_password = env
            .admin_password
            .clone()
            .or(file.admin_password)
            .ok_or(ConfigError::Missing("admin_password", "ADMIN_PASSWORD"))?;
        if admin_password.is_empty() {
            return Err(ConfigError::Empty("admin_password"));
        }

        let bind_text = env
            .bind
            .clone()
            .or(file.bind)
            .unwrap_or_else(|| DEFAULT_BIND.to_string());
        let mut bind = parse_bind(&bind_text)?;
        if let Some(port) = &env.port {
            let port: u16 = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidPort(port.clone()))?;
            bind.set_port(port);
        }
        if let Some(flag) = &flags.bind {
            bind = parse_bind(flag)?;
        }

        let api_base = flags
            .api_base
            .clone()
            .or(file.api_base)
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let poll_timeout_secs = flags
            .poll_timeout_secs
            .or(file.poll_timeout_secs)
            .unwrap_or(DEFAULT_POLL_TIMEOUT_SECS);

        Ok(Self {
            bot_token,
            admin_password,
            bind,
            api_base,
            poll_timeout_secs,
            source,
        })
    }

    pub fn redacted_json(&self) -> Value {
        json!({
            "bot_token": REDACTED,
            "admin_password": REDACTED,
            "bind": self.bind.to_string(),
            "api_base": self.api_base,
            "poll_timeout_secs": self.poll_timeout_secs,
            "source": self.source.as_ref().map(|path| path.display().to_string()),
        })
    }
}

fn load_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_bind(value: &str) -> Result<SocketAddr, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|source| ConfigError::InvalidBind {
            value: value.to_string(),
            source,
        })
}
