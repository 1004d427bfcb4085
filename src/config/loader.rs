// file: src/config/loader.rs
// version: 2.0.0
// guid: 6aaefdf5-ac17-4a54-b152-d00395edb921

//! Configuration file loading and environment variable substitution

use super::BootstrapConfig;
use crate::error::BootstrapError;
use crate::Result;
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Configuration loader with environment variable substitution
pub struct ConfigLoader {
    env_vars: HashMap<String, String>,
}

impl ConfigLoader {
    /// Create a new config loader
    pub fn new() -> Self {
        Self {
            env_vars: std::env::vars().collect(),
        }
    }

    /// Load configuration from `path`, or the defaults when no path is given
    pub fn load(&self, path: Option<&Path>) -> Result<BootstrapConfig> {
        let config = match path {
            Some(path) => self.load_file(path)?,
            None => BootstrapConfig::default(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<BootstrapConfig> {
        let content = fs::read_to_string(&path).map_err(|e| {
            BootstrapError::config(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let expanded = self.expand_env_vars(&content)?;
        let config: BootstrapConfig = toml::from_str(&expanded)?;

        debug!("Loaded configuration from {}", path.as_ref().display());
        Ok(config)
    }

    /// Expand `${VAR}` references in configuration content
    fn expand_env_vars(&self, content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}")
            .map_err(|e| BootstrapError::config(format!("Invalid regex pattern: {}", e)))?;

        let mut result = content.to_string();
        let mut missing_vars = Vec::new();

        for cap in re.captures_iter(content) {
            let var_name = &cap[1];
            let placeholder = &cap[0];

            if let Some(value) = self.env_vars.get(var_name) {
                result = result.replace(placeholder, value);
            } else {
                missing_vars.push(var_name.to_string());
            }
        }

        if !missing_vars.is_empty() {
            return Err(BootstrapError::config(format!(
                "Missing environment variables: {}",
                missing_vars.join(", ")
            )));
        }

        Ok(result)
    }

    /// Set environment variable for substitution
    pub fn set_env_var(&mut self, key: String, value: String) {
        self.env_vars.insert(key, value);
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
