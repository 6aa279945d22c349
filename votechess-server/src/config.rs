//! Runtime settings assembled from the TOML config and command line

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use votechess_common::config::TomlConfig;

use crate::coordinator::CoordinatorConfig;
use crate::error::{Error, Result};
use crate::lichess::stream::FeedSettings;

/// Fully resolved service settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub bind: SocketAddr,
    pub base_url: String,
    pub token: Option<String>,
    pub account: Option<String>,
    pub allowed_challenger: Option<String>,
    pub voting_duration: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub event_feed_stale: Duration,
    pub game_feed_stale: Duration,
    pub watchdog_period: Duration,
}

impl Settings {
    pub fn from_config(config: &TomlConfig, port_override: Option<u16>) -> Result<Self> {
        let port = port_override.unwrap_or(config.server.port);
        let bind = format!("{}:{}", config.server.host, port)
            .parse()
            .map_err(|e| Error::Config(format!("invalid bind address: {}", e)))?;

        let token = config.upstream.token.clone().or_else(|| {
            env::var("LICHESS_API_TOKEN")
                .ok()
                .filter(|token| !token.trim().is_empty())
        });

        Ok(Self {
            bind,
            base_url: config.upstream.base_url.clone(),
            token,
            account: config.upstream.account.clone(),
            allowed_challenger: config.allowed_challenger.clone(),
            voting_duration: config.voting_duration(),
            backoff_base: Duration::from_secs(config.stream.backoff_base_secs),
            backoff_max: Duration::from_secs(config.stream.backoff_max_secs),
            event_feed_stale: Duration::from_secs(config.stream.event_feed_stale_secs),
            game_feed_stale: Duration::from_secs(config.stream.game_feed_stale_secs),
            watchdog_period: Duration::from_secs(config.stream.watchdog_period_secs),
        })
    }

    pub fn event_feed_settings(&self) -> FeedSettings {
        FeedSettings {
            backoff_base: self.backoff_base,
            backoff_max: self.backoff_max,
            stale_after: self.event_feed_stale,
            watchdog_period: self.watchdog_period,
        }
    }

    pub fn game_feed_settings(&self) -> FeedSettings {
        FeedSettings {
            backoff_base: self.backoff_base,
            backoff_max: self.backoff_max,
            stale_after: self.game_feed_stale,
            watchdog_period: self.watchdog_period,
        }
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            account: self.account.clone(),
            allowed_challenger: self.allowed_challenger.clone(),
            voting_duration: self.voting_duration,
        }
    }
}
