//! Configuration loading: optional YAML file plus `PROPOSAL__`-prefixed
//! environment overrides (e.g. `PROPOSAL__DATABASE__URL`).

use std::path::Path;

use config::{Config, Environment, File};

use super::CoreConfig;
use crate::error::{ProposalError, Result};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from the given YAML file (when present) and the environment.
    pub fn load(path: Option<&Path>) -> Result<CoreConfig> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let config = builder
            .add_source(Environment::with_prefix("PROPOSAL").separator("__"))
            .build()
            .map_err(|e| ProposalError::Configuration(e.to_string()))?
            .try_deserialize::<CoreConfig>()
            .map_err(|e| ProposalError::Configuration(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }
}
