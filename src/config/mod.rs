//! Configuration module - environment variable parsing

use std::env;

use crate::game::zone::{Position, ZonePhase};

/// Match orchestration configuration loaded from environment variables.
///
/// Every field has a default so the server starts with no environment at
/// all; values are only rejected when present but unparseable.
#[derive(Clone, Debug)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Minimum roster size to arm the countdown
    pub min_players: usize,
    /// Maximum roster size
    pub max_players: usize,
    /// Lobby countdown length in seconds
    pub countdown_secs: u32,
    /// Match duration before deathmatch is forced (seconds)
    pub match_duration_secs: f32,
    /// Simulation tick interval in milliseconds
    pub tick_interval_ms: u64,

    /// World name the arena lives in
    pub arena_world: String,
    /// Arena center (z is vertical and ignored for containment)
    pub arena_center: Position,
    /// Initial zone radius
    pub zone_initial_radius: f32,
    /// Radius the zone collapses to when deathmatch triggers
    pub deathmatch_radius: f32,
    /// Deathmatch collapse duration in seconds
    pub deathmatch_shrink_secs: f32,

    /// Reclaim sweep interval for ended matches (seconds)
    pub reclaim_interval_secs: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            min_players: parse_var("MIN_PLAYERS", 2)?,
            max_players: parse_var("MAX_PLAYERS", 24)?,
            countdown_secs: parse_var("COUNTDOWN_SECS", 10)?,
            match_duration_secs: parse_var("MATCH_DURATION_SECS", 600.0)?,
            tick_interval_ms: parse_var("TICK_INTERVAL_MS", 250)?,

            arena_world: env::var("ARENA_WORLD").unwrap_or_else(|_| "arena".to_string()),
            arena_center: Position::new(
                parse_var("ARENA_CENTER_X", 0.0)?,
                parse_var("ARENA_CENTER_Y", 0.0)?,
                parse_var("ARENA_CENTER_Z", 64.0)?,
            ),
            zone_initial_radius: parse_var("ZONE_INITIAL_RADIUS", 1000.0)?,
            deathmatch_radius: parse_var("DEATHMATCH_RADIUS", 25.0)?,
            deathmatch_shrink_secs: parse_var("DEATHMATCH_SHRINK_SECS", 30.0)?,

            reclaim_interval_secs: parse_var("RECLAIM_INTERVAL_SECS", 5)?,
        })
    }

    /// Standard shrink sequence for a match on this configuration
    pub fn zone_phases(&self) -> Vec<ZonePhase> {
        ZonePhase::default_phases()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            min_players: 2,
            max_players: 24,
            countdown_secs: 10,
            match_duration_secs: 600.0,
            tick_interval_ms: 250,
            arena_world: "arena".to_string(),
            arena_center: Position::new(0.0, 0.0, 64.0),
            zone_initial_radius: 1000.0,
            deathmatch_radius: 25.0,
            deathmatch_shrink_secs: 30.0,
            reclaim_interval_secs: 5,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
