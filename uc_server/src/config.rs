//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use std::net::SocketAddr;
use uncooperative::{GameConfig, db::DatabaseConfig, room::RoomConfig};

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind: SocketAddr,
    /// Prometheus scrape endpoint, disabled when unset
    pub metrics_bind: Option<SocketAddr>,
    /// Postgres settings, `None` keeps games in memory
    pub database: Option<DatabaseConfig>,
    /// Actor timing
    pub room: RoomConfig,
    /// Config for games created without one
    pub game_defaults: GameConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `bind_override` - Optional bind address override (from CLI args)
    /// * `database_url_override` - Optional database URL override (from CLI args)
    ///
    /// # Errors
    ///
    /// Returns error if a variable is set but can't be parsed
    pub fn from_env(
        bind_override: Option<SocketAddr>,
        database_url_override: Option<String>,
    ) -> Result<Self, ConfigError> {
        Self::from_lookup(
            bind_override,
            database_url_override,
            DatabaseConfig::from_env(),
            |key| std::env::var(key).ok(),
        )
    }

    /// Same as [`ServerConfig::from_env`] with variables read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns error if a variable is set but can't be parsed
    pub fn from_lookup<F>(
        bind_override: Option<SocketAddr>,
        database_url_override: Option<String>,
        database: Option<DatabaseConfig>,
        lookup: F,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind = match bind_override {
            Some(bind) => bind,
            None => parse_var(&lookup, "SERVER_BIND")?.unwrap_or(default_bind()),
        };
        let metrics_bind = parse_var(&lookup, "METRICS_BIND")?;

        let database = match database_url_override {
            Some(database_url) => Some(DatabaseConfig {
                database_url,
                ..database.unwrap_or_default()
            }),
            None => database,
        };

        let room_defaults = RoomConfig::default();
        let room = RoomConfig {
            summary_delay_ms: parse_var(&lookup, "SUMMARY_DELAY_MS")?
                .unwrap_or(room_defaults.summary_delay_ms),
            ..room_defaults
        };

        let defaults = GameConfig::default();
        let game_defaults = GameConfig {
            max_turns: parse_var(&lookup, "GAME_DEFAULT_TURNS")?.unwrap_or(defaults.max_turns),
            starting_treasury: parse_var(&lookup, "GAME_DEFAULT_TREASURY")?
                .unwrap_or(defaults.starting_treasury),
            max_extraction_per_player: parse_var(&lookup, "GAME_DEFAULT_MAX_EXTRACTION")?
                .unwrap_or(defaults.max_extraction_per_player),
            interest_rate: parse_var(&lookup, "GAME_DEFAULT_INTEREST_RATE")?
                .unwrap_or(defaults.interest_rate),
            ..defaults
        };

        Ok(ServerConfig {
            bind,
            metrics_bind,
            database,
            room,
            game_defaults,
        })
    }

    /// Validate configuration after loading
    ///
    /// # Errors
    ///
    /// Names the first variable holding an unusable value
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Err(reason) = self.room.validate() {
            return Err(ConfigError::Invalid {
                var: "SUMMARY_DELAY_MS".to_string(),
                reason,
            });
        }

        let game = &self.game_defaults;
        if game.max_turns == 0 {
            return Err(ConfigError::Invalid {
                var: "GAME_DEFAULT_TURNS".to_string(),
                reason: "Must be at least 1".to_string(),
            });
        }

        if !(0.0..=1.0).contains(&game.interest_rate) {
            return Err(ConfigError::Invalid {
                var: "GAME_DEFAULT_INTEREST_RATE".to_string(),
                reason: "Must be between 0 and 1".to_string(),
            });
        }

        if !game.starting_treasury.is_finite() || game.starting_treasury < 0.0 {
            return Err(ConfigError::Invalid {
                var: "GAME_DEFAULT_TREASURY".to_string(),
                reason: "Must be a non-negative amount".to_string(),
            });
        }

        if !game.max_extraction_per_player.is_finite() || game.max_extraction_per_player < 0.0 {
            return Err(ConfigError::Invalid {
                var: "GAME_DEFAULT_MAX_EXTRACTION".to_string(),
                reason: "Must be a non-negative amount".to_string(),
            });
        }

        if let Some(metrics_bind) = self.metrics_bind
            && metrics_bind == self.bind
        {
            return Err(ConfigError::Invalid {
                var: "METRICS_BIND".to_string(),
                reason: format!("Must differ from the server address ({})", self.bind),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 6969))
}

/// Parse a variable if it is set. Set but unparsable is an error.
fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid {
                var: key.to_string(),
                reason: format!("Could not parse {raw:?}"),
            }),
    }
}
