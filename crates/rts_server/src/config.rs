//! Server configuration.

use std::time::Duration;

use rts_core::commands::MAX_COMMAND_IDS;
use rts_core::setup::MAX_PLAYERS;
use rts_core::state::TICK_RATE;

use crate::error::ServerError;

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Interface to listen on.
    pub bind_address: String,
    /// Port to listen on.
    pub port: u16,
    /// Lobby capacity; at most four.
    pub max_players: usize,
    /// Ticks per second of wall-clock time.
    pub tick_rate: u64,
    /// Longest id list accepted in a command payload.
    pub max_command_ids: usize,
    /// Override for how long an attack alert stays quiet, in ticks.
    pub alert_cooldown_ticks: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 3000,
            max_players: MAX_PLAYERS,
            tick_rate: TICK_RATE,
            max_command_ids: MAX_COMMAND_IDS,
            alert_cooldown_ticks: None,
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `RTS_BIND`, `RTS_PORT` and `RTS_TICK_RATE`.
    pub fn from_env() -> Result<Self, ServerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ServerError> {
        let mut config = Self::default();
        if let Some(bind) = lookup("RTS_BIND") {
            config.bind_address = bind;
        }
        if let Some(port) = lookup("RTS_PORT") {
            config.port = port
                .trim()
                .parse()
                .map_err(|_| ServerError::Config(format!("RTS_PORT={port}")))?;
        }
        if let Some(rate) = lookup("RTS_TICK_RATE") {
            config.tick_rate = match rate.trim().parse() {
                Ok(n) if n > 0 => n,
                _ => return Err(ServerError::Config(format!("RTS_TICK_RATE={rate}"))),
            };
        }
        Ok(config)
    }

    /// `host:port` to bind.
    #[must_use]
    pub fn socket_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    /// Wall-clock time between ticks.
    #[must_use]
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(1000 / self.tick_rate.max(1))
    }

    /// Players a lobby holds, between two and four.
    #[must_use]
    pub fn lobby_capacity(&self) -> usize {
        self.max_players.clamp(2, MAX_PLAYERS)
    }
}
