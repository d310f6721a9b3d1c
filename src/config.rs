use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::shazam::{
    DEFAULT_ENDPOINT_COUNTRY, DEFAULT_LANGUAGE, DEFAULT_SEGMENT_SECONDS, DEFAULT_TIMEOUT_SECS,
};

/// Configuration defaults that can be saved to a file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_country: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment_seconds: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Config {
    /// Create a new empty config
    pub fn new() -> Self {
        Config {
            language: None,
            endpoint_country: None,
            segment_seconds: None,
            timeout_secs: None,
        }
    }

    /// Built-in defaults, used when neither the saved file nor the command line set a value
    pub fn builtin() -> Self {
        Config {
            language: Some(DEFAULT_LANGUAGE.to_string()),
            endpoint_country: Some(DEFAULT_ENDPOINT_COUNTRY.to_string()),
            segment_seconds: Some(DEFAULT_SEGMENT_SECONDS),
            timeout_secs: Some(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Get the config file path (~/.state/shazam-recognize/defaults.toml)
    pub fn get_config_path() -> std::result::Result<PathBuf, io::Error> {
        let home = std::env::var("HOME")
            .map_err(|_| io::Error::new(io::ErrorKind::NotFound, "HOME environment variable not set"))?;

        let config_dir = Path::new(&home).join(".state").join("shazam-recognize");
        Ok(config_dir.join("defaults.toml"))
    }

    /// Load config from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    /// Load config from `path`; a missing file gives an empty config
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::new());
        }

        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::get_config_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save config to `path`, creating parent directories as needed
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let toml_string = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        fs::write(path, toml_string)?;

        Ok(())
    }

    /// Merge this config with another, preferring values from other
    pub fn merge(&mut self, other: &Config) {
        if other.language.is_some() {
            self.language = other.language.clone();
        }
        if other.endpoint_country.is_some() {
            self.endpoint_country = other.endpoint_country.clone();
        }
        if other.segment_seconds.is_some() {
            self.segment_seconds = other.segment_seconds;
        }
        if other.timeout_secs.is_some() {
            self.timeout_secs = other.timeout_secs;
        }
    }

    /// Print the config in a human-readable format
    pub fn print(&self, title: &str) {
        println!("{}:", title);

        if let Some(language) = &self.language {
            println!("  Language:           {}", language);
        }
        if let Some(country) = &self.endpoint_country {
            println!("  Endpoint country:   {}", country);
        }
        if let Some(segment) = self.segment_seconds {
            println!("  Segment length:     {} seconds", segment);
        }
        if let Some(timeout) = self.timeout_secs {
            println!("  Request timeout:    {} seconds", timeout);
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
