//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::game::physics::MovementMode;
use crate::game::MatchSettings;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS, comma-separated. Any origin when unset.
    pub client_origin: Option<String>,

    /// Room tunables
    pub match_settings: MatchSettings,
    /// Fixed RNG seed for reproducible boards
    pub rng_seed: Option<u64>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT; fall back to SERVER_ADDR or default
        let server_addr = match lookup("PORT") {
            Some(port) => format!("0.0.0.0:{}", port),
            None => lookup("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:8888".to_string()),
        };

        let defaults = MatchSettings::default();
        let match_settings = MatchSettings {
            room_wait_secs: parse_or(&lookup, "ROOM_WAIT_SECS", defaults.room_wait_secs)?,
            countdown_secs: parse_or(&lookup, "COUNTDOWN_SECS", defaults.countdown_secs)?,
            fuse: millis_or(&lookup, "FUSE_MS", defaults.fuse)?,
            game_over_check: millis_or(&lookup, "GAME_OVER_CHECK_MS", defaults.game_over_check)?,
            reset_grace: Duration::from_secs(parse_or(
                &lookup,
                "RESET_GRACE_SECS",
                defaults.reset_grace.as_secs(),
            )?),
            chat_max_len: parse_or(&lookup, "CHAT_MAX_LEN", defaults.chat_max_len)?,
            chat_history: parse_or(&lookup, "CHAT_HISTORY", defaults.chat_history)?,
            movement: parse_or(&lookup, "MOVEMENT_MODE", defaults.movement)?,
            ..defaults
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress(server_addr.clone()))?,

            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            client_origin: lookup("CLIENT_ORIGIN").filter(|origins| !origins.trim().is_empty()),

            match_settings,
            rng_seed: lookup("RNG_SEED")
                .map(|raw| parse_value("RNG_SEED", &raw))
                .transpose()?,
        })
    }
}

fn parse_value<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: raw.to_string(),
    })
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn millis_or(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    parse_or(lookup, key, default.as_millis() as u64).map(Duration::from_millis)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid server address: {0}")]
    InvalidAddress(String),

    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}
