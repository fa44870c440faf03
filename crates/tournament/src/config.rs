//! Tournament configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use rps_core::Sats;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Settings of the tournament service. Every field has a default, so a
/// config file only needs the values it changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TournamentConfig {
    /// Upper bound of the bracket size
    pub capacity: usize,
    /// Pause before every round
    pub round_pause_secs: u64,
    /// Minimum spacing between two commands of one participant
    pub op_timeout_secs: u64,
    /// How long a name or wallet edit waits for input
    pub modify_time_secs: u64,
    /// Decision window of a round
    pub round_time_secs: u64,
    /// How long a ticket invoice is watched
    pub pay_time_secs: u64,
    /// Watcher poll interval
    pub poll_interval_secs: u64,
    /// Delay between Ready and Running
    pub ready_delay_secs: u64,
    /// Tournament period, launches are aligned to multiples of it
    pub schedule_period_secs: u64,
    /// Ticket price in the smallest currency unit
    pub ticket_price: Sats,
    /// Directory holding the vault files
    pub db_path: PathBuf,
    /// Fixed seed for pairings and random picks (None = entropy)
    pub seed: Option<u64>,
}

impl Default for TournamentConfig {
    fn default() -> Self {
        Self {
            capacity: 128,
            round_pause_secs: 5,
            op_timeout_secs: 1,
            modify_time_secs: 60,
            round_time_secs: 10,
            pay_time_secs: 300,
            poll_interval_secs: 5,
            ready_delay_secs: 10,
            schedule_period_secs: 3600,
            ticket_price: 100_000,
            db_path: PathBuf::from("./db"),
            seed: None,
        }
    }
}

impl TournamentConfig {
    /// Load a TOML config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity < 2 {
            return Err(ConfigError::Invalid(format!(
                "capacity must be at least 2, got {}",
                self.capacity
            )));
        }
        if self.round_time_secs == 0 {
            return Err(ConfigError::Invalid("round_time_secs must be positive".into()));
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid("poll_interval_secs must be positive".into()));
        }
        if self.schedule_period_secs == 0 {
            return Err(ConfigError::Invalid("schedule_period_secs must be positive".into()));
        }
        if self.ticket_price == 0 {
            return Err(ConfigError::Invalid("ticket_price must be positive".into()));
        }
        Ok(())
    }

    pub fn round_pause(&self) -> Duration {
        Duration::from_secs(self.round_pause_secs)
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_secs(self.op_timeout_secs)
    }

    pub fn modify_time(&self) -> Duration {
        Duration::from_secs(self.modify_time_secs)
    }

    pub fn decision_window(&self) -> Duration {
        Duration::from_secs(self.round_time_secs)
    }

    pub fn pay_time(&self) -> Duration {
        Duration::from_secs(self.pay_time_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn ready_delay(&self) -> Duration {
        Duration::from_secs(self.ready_delay_secs)
    }

    pub fn schedule_period(&self) -> Duration {
        Duration::from_secs(self.schedule_period_secs)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
