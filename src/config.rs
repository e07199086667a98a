use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Top-level configuration loaded from auto-continue.toml.
#[derive(Debug, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct AutoContinueConfig {
    #[serde(rename = "continue")]
    pub continuation: ContinueConfig,
    pub server: ServerConfig,
    pub reconnect: ReconnectConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContinueConfig {
    /// -1 = disabled, 0 = unlimited, >0 = limit per session.
    pub max_continues: i64,
    pub message: String,
    pub cooldown_ms: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub base_url: String,
    pub directory: Option<PathBuf>,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

/// How many continuations a session may receive, decoded from `max_continues`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinueLimit {
    Disabled,
    Unlimited,
    Capped(u32),
}

impl ContinueLimit {
    pub fn from_max(max_continues: i64) -> Self {
        match max_continues {
            n if n < 0 => ContinueLimit::Disabled,
            0 => ContinueLimit::Unlimited,
            n => ContinueLimit::Capped(u32::try_from(n).unwrap_or(u32::MAX)),
        }
    }
}

impl fmt::Display for ContinueLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContinueLimit::Disabled => write!(f, "disabled"),
            ContinueLimit::Unlimited => write!(f, "unlimited"),
            ContinueLimit::Capped(max) => write!(f, "{max}"),
        }
    }
}

impl ContinueConfig {
    pub fn limit(&self) -> ContinueLimit {
        ContinueLimit::from_max(self.max_continues)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl AutoContinueConfig {
    /// Load configuration from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }
}

// --- Default implementations ---

impl Default for ContinueConfig {
    fn default() -> Self {
        Self {
            max_continues: 0,
            message: "continue".to_string(),
            cooldown_ms: 1000,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:4096".to_string(),
            directory: None,
            request_timeout_secs: 30,
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = AutoContinueConfig::default();
        assert_eq!(config.continuation.max_continues, 0);
        assert_eq!(config.continuation.message, "continue");
        assert_eq!(config.continuation.cooldown_ms, 1000);
        assert_eq!(config.server.base_url, "http://127.0.0.1:4096");
        assert!(config.server.directory.is_none());
        assert_eq!(config.reconnect.max_delay_ms, 30_000);
    }

    #[test]
    fn test_parse_partial_file_keeps_other_defaults() {
        let config = AutoContinueConfig::parse(
            r#"
[continue]
max_continues = 5
"#,
        )
        .unwrap();
        assert_eq!(config.continuation.max_continues, 5);
        assert_eq!(config.continuation.message, "continue");
        assert_eq!(config.server.request_timeout_secs, 30);
    }

    #[test]
    fn test_parse_full_file() {
        let config = AutoContinueConfig::parse(
            r#"
[continue]
max_continues = -1
message = "keep going"
cooldown_ms = 2500

[server]
base_url = "http://localhost:9999"
directory = "/work/project"
request_timeout_secs = 5

[reconnect]
initial_delay_ms = 100
max_delay_ms = 800
"#,
        )
        .unwrap();
        assert_eq!(config.continuation.limit(), ContinueLimit::Disabled);
        assert_eq!(config.continuation.message, "keep going");
        assert_eq!(config.continuation.cooldown_ms, 2500);
        assert_eq!(config.server.base_url, "http://localhost:9999");
        assert_eq!(
            config.server.directory,
            Some(PathBuf::from("/work/project"))
        );
        assert_eq!(config.reconnect.initial_delay_ms, 100);
        assert_eq!(config.reconnect.max_delay_ms, 800);
    }

    #[test]
    fn test_limit_decoding() {
        assert_eq!(ContinueLimit::from_max(-1), ContinueLimit::Disabled);
        assert_eq!(ContinueLimit::from_max(-42), ContinueLimit::Disabled);
        assert_eq!(ContinueLimit::from_max(0), ContinueLimit::Unlimited);
        assert_eq!(ContinueLimit::from_max(3), ContinueLimit::Capped(3));
        assert_eq!(
            ContinueLimit::from_max(i64::MAX),
            ContinueLimit::Capped(u32::MAX)
        );
    }

    #[test]
    fn test_limit_display() {
        assert_eq!(ContinueLimit::Unlimited.to_string(), "unlimited");
        assert_eq!(ContinueLimit::Capped(7).to_string(), "7");
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = AutoContinueConfig::load(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.continuation.cooldown_ms, 1000);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("auto-continue.toml");
        std::fs::write(&path, "[continue]\ncooldown_ms = 42\n").unwrap();
        let config = AutoContinueConfig::load(&path).unwrap();
        assert_eq!(config.continuation.cooldown_ms, 42);
    }

    #[test]
    fn test_load_invalid_toml_reports_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[continue\nmax_continues = ").unwrap();
        let err = AutoContinueConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("broken.toml"));
    }
}
