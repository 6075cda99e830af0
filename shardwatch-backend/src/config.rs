use std::collections::HashMap;
use std::env::var;
use std::num::NonZeroU64;
use std::str::FromStr;
use std::time::Duration;

use chrono::TimeDelta;
use dotenvy::dotenv;
use poise::serenity_prelude::ChannelId;
use thiserror::Error;

use crate::monitor::Intervals;
use crate::notifier::{Audience, Recipient};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} has invalid value {value:?}")]
    Invalid { key: String, value: String },

    #[error("{key} must be greater than zero")]
    Zero { key: String },

    #[error("{key} lists Discord channels but DISCORD_TOKEN is not set")]
    DiscordTokenMissing { key: String },

    #[error("{key} lists Pushover users but PUSHOVER_APP_TOKEN is not set")]
    PushoverTokenMissing { key: String },
}

/// Application configuration with environment variable overrides
#[derive(Debug, Clone)]
pub struct Config {
    /// GraphQL endpoint of the game service
    /// Env: STATUS_API_URL
    pub status_api_url: String,

    /// Upper bound on one status request
    /// Env: STATUS_API_TIMEOUT_SECS (default: 10)
    pub status_api_timeout: Duration,

    /// Upper bound on delivering one notice to one recipient
    /// Env: NOTIFY_TIMEOUT_SECS (default: 10)
    pub notify_timeout: Duration,

    /// Poll and notice intervals
    /// Env: POLL_INTERVAL_SECS (default: 10), NOTIFY_INTERVAL_SECS (default: 1)
    pub intervals: Intervals,

    /// A server missing from snapshots for longer than this is reported stale
    /// Env: STALE_AFTER_SECS (default: 300)
    pub stale_after: TimeDelta,

    /// Database file path
    /// Env: DATABASE_PATH (default: "shardwatch.db")
    pub database_path: String,

    /// Query API port
    /// Env: PORT (default: 3000)
    pub port: u16,

    /// Request body size limit in bytes
    /// Env: REQUEST_BODY_LIMIT (default: 65536)
    pub request_body_limit: usize,

    /// Request timeout
    /// Env: REQUEST_TIMEOUT_SECS (default: 30)
    pub request_timeout: Duration,

    /// Query API rate limit (requests per second)
    /// Env: RATE_LIMIT_PER_SEC (default: 10)
    pub rate_limit_per_sec: u64,

    /// Query API burst size
    /// Env: RATE_LIMIT_BURST (default: 20)
    pub rate_limit_burst: u32,

    /// Title on push and webhook notices
    /// Env: NOTICE_TITLE (default: "[CU]")
    pub notice_title: String,

    /// Discord API token; enables the bot and Discord delivery
    /// Env: DISCORD_TOKEN (optional)
    pub discord_token: Option<String>,

    /// Pushover application token
    /// Env: PUSHOVER_APP_TOKEN (optional)
    pub pushover_app_token: Option<String>,

    /// Recipients per audience
    /// Env: NOTIFY_<AUDIENCE>_DISCORD, NOTIFY_<AUDIENCE>_PUSHOVER, NOTIFY_<AUDIENCE>_WEBHOOK
    /// (comma-separated, AUDIENCE one of ADMIN, IT, ALPHA, BETA1, BETA2, BETA3)
    pub recipients: HashMap<Audience, Vec<Recipient>>,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenv(); //for local runs mostly
        Self::from_lookup(|key| var(key).ok())
    }

    /// Build configuration from any key lookup, falling back to defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let env = Lookup(&lookup);

        let config = Self {
            status_api_url: env.string_or("STATUS_API_URL", &defaults.status_api_url),
            status_api_timeout: env.secs_or("STATUS_API_TIMEOUT_SECS", defaults.status_api_timeout)?,
            intervals: Intervals {
                poll: env.secs_or("POLL_INTERVAL_SECS", defaults.intervals.poll)?,
                notify: env.secs_or("NOTIFY_INTERVAL_SECS", defaults.intervals.notify)?,
            },
            notify_timeout: env.secs_or("NOTIFY_TIMEOUT_SECS", defaults.notify_timeout)?,
            stale_after: env.delta_or("STALE_AFTER_SECS", defaults.stale_after)?,
            database_path: env.string_or("DATABASE_PATH", &defaults.database_path),
            port: env.parse_or("PORT", defaults.port)?,
            request_body_limit: env.parse_or("REQUEST_BODY_LIMIT", defaults.request_body_limit)?,
            request_timeout: env.secs_or("REQUEST_TIMEOUT_SECS", defaults.request_timeout)?,
            rate_limit_per_sec: env.nonzero_or("RATE_LIMIT_PER_SEC", defaults.rate_limit_per_sec)?,
            rate_limit_burst: env.nonzero_or("RATE_LIMIT_BURST", defaults.rate_limit_burst)?,
            notice_title: env.string_or("NOTICE_TITLE", &defaults.notice_title),
            discord_token: env.optional("DISCORD_TOKEN"),
            pushover_app_token: env.optional("PUSHOVER_APP_TOKEN"),
            recipients: HashMap::new(),
        };

        let mut recipients = HashMap::new();
        for audience in Audience::ALL {
            let routed = env.recipients(audience, &config)?;
            if !routed.is_empty() {
                recipients.insert(audience, routed);
            }
        }

        Ok(Self { recipients, ..config })
    }

    /// Create configuration with all default values
    pub fn default() -> Self {
        Self {
            status_api_url: "http://api.camelotunchained.com/graphql".to_string(),
            status_api_timeout: Duration::from_secs(10),
            notify_timeout: Duration::from_secs(10),
            intervals: Intervals::default(),
            stale_after: TimeDelta::seconds(300),
            database_path: "shardwatch.db".to_string(),
            port: 3000,
            request_body_limit: 64 * 1024,
            request_timeout: Duration::from_secs(30),
            rate_limit_per_sec: 10,
            rate_limit_burst: 20,
            notice_title: "[CU]".to_string(),
            discord_token: None,
            pushover_app_token: None,
            recipients: HashMap::new(),
        }
    }

    /// Total number of configured recipients across every audience
    pub fn recipient_count(&self) -> usize {
        self.recipients.values().map(Vec::len).sum()
    }
}

struct Lookup<'a, F>(&'a F);

impl<F> Lookup<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Set and non-blank value for `key`
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string_or(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn parse_or<T: FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        match self.optional(key) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                key: key.to_string(),
                value,
            }),
        }
    }

    fn nonzero_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr + PartialEq + Default,
    {
        let value = self.parse_or(key, default)?;
        if value == T::default() {
            return Err(ConfigError::Zero {
                key: key.to_string(),
            });
        }
        Ok(value)
    }

    fn secs_or(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        self.nonzero_or(key, default.as_secs()).map(Duration::from_secs)
    }

    /// Like `secs_or`, for settings compared against wall-clock timestamps
    fn delta_or(&self, key: &str, default: TimeDelta) -> Result<TimeDelta, ConfigError> {
        let secs = self.secs_or(key, default.to_std().unwrap_or_default())?;
        TimeDelta::from_std(secs).map_err(|_| ConfigError::Invalid {
            key: key.to_string(),
            value: secs.as_secs().to_string(),
        })
    }

    fn list(&self, key: &str) -> Vec<String> {
        self.optional(key)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn recipients(&self, audience: Audience, config: &Config) -> Result<Vec<Recipient>, ConfigError> {
        let mut routed = Vec::new();

        let key = format!("NOTIFY_{}_DISCORD", audience.env_key());
        let channels = self.list(&key);
        if !channels.is_empty() && config.discord_token.is_none() {
            return Err(ConfigError::DiscordTokenMissing { key });
        }
        for raw in channels {
            let id: NonZeroU64 = raw.parse().map_err(|_| ConfigError::Invalid {
                key: key.clone(),
                value: raw.clone(),
            })?;
            routed.push(Recipient::Discord(ChannelId::new(id.get())));
        }

        let key = format!("NOTIFY_{}_PUSHOVER", audience.env_key());
        let users = self.list(&key);
        if !users.is_empty() && config.pushover_app_token.is_none() {
            return Err(ConfigError::PushoverTokenMissing { key });
        }
        routed.extend(users.into_iter().map(Recipient::Pushover));

        let key = format!("NOTIFY_{}_WEBHOOK", audience.env_key());
        for url in self.list(&key) {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::Invalid { key, value: url });
            }
            routed.push(Recipient::Webhook(url));
        }

        Ok(routed)
    }
}
