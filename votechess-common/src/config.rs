//! Configuration loading and config file resolution
//!
//! File location priority:
//! 1. Command-line argument (highest priority)
//! 2. `VOTECHESS_CONFIG` environment variable
//! 3. OS config directory (`<config_dir>/votechess/config.toml`)
//!
//! A missing config file is not fatal: the service starts with compiled
//! defaults and a warning. A file that exists but fails to parse is a hard
//! configuration error.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Upstream game-service connection settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the upstream API
    pub base_url: String,
    /// Bearer token; may instead come from `LICHESS_API_TOKEN`
    pub token: Option<String>,
    /// Account id whose side the crowd controls
    pub account: Option<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://lichess.org/api".to_string(),
            token: None,
            account: None,
        }
    }
}

/// Voting round settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VotingConfig {
    pub duration_secs: u64,
}

impl Default for VotingConfig {
    fn default() -> Self {
        Self { duration_secs: 90 }
    }
}

/// Inbound stream reconnect/staleness settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub backoff_base_secs: u64,
    pub backoff_max_secs: u64,
    pub event_feed_stale_secs: u64,
    pub game_feed_stale_secs: u64,
    pub watchdog_period_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            backoff_base_secs: 1,
            backoff_max_secs: 30,
            event_feed_stale_secs: 300,
            game_feed_stale_secs: 120,
            watchdog_period_secs: 60,
        }
    }
}

/// HTTP listener settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

/// Root TOML configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub upstream: UpstreamConfig,
    pub voting: VotingConfig,
    pub stream: StreamConfig,
    pub server: ServerConfig,
    /// Challenges from this account id are auto-accepted
    pub allowed_challenger: Option<String>,
}

impl TomlConfig {
    /// Parse a config file; a missing file yields defaults with a warning
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path.map(Path::to_path_buf).or_else(default_config_path) {
            Some(path) => path,
            None => return Ok(Self::default()),
        };

        match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content)
                .map_err(|e| Error::Config(format!("{}: {}", path.display(), e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Config file {} not found, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    pub fn voting_duration(&self) -> Duration {
        Duration::from_secs(self.voting.duration_secs)
    }
}

/// Resolve the config file path by priority: CLI arg, env var, OS default
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }
    if let Ok(path) = std::env::var("VOTECHESS_CONFIG") {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("votechess").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let config = TomlConfig::default();
        assert_eq!(config.voting.duration_secs, 90);
        assert_eq!(config.stream.backoff_base_secs, 1);
        assert_eq!(config.stream.backoff_max_secs, 30);
        assert_eq!(config.stream.event_feed_stale_secs, 300);
        assert_eq!(config.stream.game_feed_stale_secs, 120);
        assert_eq!(config.upstream.base_url, "https://lichess.org/api");
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let path = PathBuf::from("/nonexistent/votechess/config.toml");
        let config = TomlConfig::load(Some(&path)).unwrap();
        assert_eq!(config.voting.duration_secs, 90);
    }

    #[test]
    fn partial_file_overrides_only_named_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "allowed_challenger = \"somefriend\"\n\n[voting]\nduration_secs = 30"
        )
        .unwrap();

        let config = TomlConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.voting.duration_secs, 30);
        assert_eq!(config.allowed_challenger.as_deref(), Some("somefriend"));
        // Untouched sections keep defaults
        assert_eq!(config.stream.backoff_max_secs, 30);
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[voting\nduration_secs = oops").unwrap();

        match TomlConfig::load(Some(file.path())) {
            Err(Error::Config(_)) => {}
            other => panic!("expected Config error, got {:?}", other),
        }
    }

    #[test]
    #[serial]
    fn env_var_resolves_path_when_no_cli_arg() {
        env::set_var("VOTECHESS_CONFIG", "/tmp/votechess-test.toml");
        let path = resolve_config_path(None).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/votechess-test.toml"));
        env::remove_var("VOTECHESS_CONFIG");
    }

    #[test]
    #[serial]
    fn cli_arg_wins_over_env_var() {
        env::set_var("VOTECHESS_CONFIG", "/tmp/from-env.toml");
        let cli = PathBuf::from("/tmp/from-cli.toml");
        let path = resolve_config_path(Some(&cli)).unwrap();
        assert_eq!(path, cli);
        env::remove_var("VOTECHESS_CONFIG");
    }
}
