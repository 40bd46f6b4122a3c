//! # Configuration
//!
//! Typed configuration loaded from a YAML file with environment-variable
//! overrides. Explicit validation, no silent fallbacks: a missing database
//! URL at connect time is an error, not a guessed localhost.

pub mod loader;

use serde::{Deserialize, Serialize};

pub use loader::ConfigLoader;

use crate::error::{ProposalError, Result};

/// Root configuration for the workflow core.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CoreConfig {
    /// Database connection and pooling
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Lifecycle event channel
    #[serde(default)]
    pub events: EventConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL; empty selects the in-memory backend.
    #[serde(default)]
    pub url: String,
    #[serde(default = "DatabaseConfig::default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventConfig {
    #[serde(default = "EventConfig::default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            events: EventConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: Self::default_max_connections(),
        }
    }
}

impl DatabaseConfig {
    fn default_max_connections() -> u32 {
        10
    }
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            channel_capacity: Self::default_channel_capacity(),
        }
    }
}

impl EventConfig {
    fn default_channel_capacity() -> usize {
        1000
    }
}

impl CoreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.database.max_connections == 0 {
            return Err(ProposalError::Configuration(
                "database.max_connections must be positive".into(),
            ));
        }
        if self.events.channel_capacity == 0 {
            return Err(ProposalError::Configuration(
                "events.channel_capacity must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        CoreConfig::default().validate().unwrap();
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = CoreConfig {
            events: EventConfig {
                channel_capacity: 0,
            },
            ..CoreConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
