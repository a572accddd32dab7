use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::KilnError;

/// Process-wide settings read once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KilnConfig {
    /// Directory holding registry credentials (`DOCKER_CONFIG`).
    ///
    /// Kiln never talks to a registry itself; the value is carried for the
    /// push/pull collaborators that do.
    pub docker_config: Option<PathBuf>,

    /// Logging settings
    pub log: LogConfig,
}

impl KilnConfig {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self, KilnError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`, which maps a variable name to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, KilnError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let docker_config = lookup("DOCKER_CONFIG")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        let filter = lookup("KILN_LOG")
            .or_else(|| lookup("RUST_LOG"))
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| LogConfig::default().filter);

        let format = match lookup("KILN_LOG_FORMAT").filter(|v| !v.is_empty()) {
            Some(v) => v.parse().map_err(KilnError::Config)?,
            None => LogFormat::default(),
        };

        Ok(Self {
            docker_config,
            log: LogConfig { filter, format },
        })
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directive, e.g. `warn` or `kiln_image=debug`
    pub filter: String,

    /// Output format
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "warn".to_string(),
            format: LogFormat::default(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable lines on stderr (default).
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pretty => write!(f, "pretty"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(format!(
                "unknown log format: '{}' (supported: pretty, json)",
                s
            )),
        }
    }
}
