//! Store configuration.
//!
//! Values come from the environment (optionally seeded from a `.env` file).
//! Anything not set falls back to a database under the platform data
//! directory.

use std::path::PathBuf;
use thiserror::Error;

pub const DB_PATH_VAR: &str = "CANVAS_DB_PATH";
pub const MAX_CONNECTIONS_VAR: &str = "CANVAS_DB_MAX_CONNECTIONS";

const DEFAULT_MAX_CONNECTIONS: u32 = 4;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine the platform data directory")]
    MissingDataDir,

    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Where and how the SQLite store is opened.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub database_path: PathBuf,
    pub max_connections: u32,
}

impl StoreConfig {
    /// Builds a config for an explicit database file.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        StoreConfig {
            database_path: path.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// Reads a `.env` file from the current directory first, except in unit
    /// tests where the environment is left untouched.
    ///
    /// # Errors
    /// - [`ConfigError::MissingDataDir`] if no path is configured and the
    ///   platform data directory cannot be resolved
    /// - [`ConfigError::InvalidValue`] if a variable does not parse
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_path = match lookup(DB_PATH_VAR) {
            Some(path) if !path.trim().is_empty() => PathBuf::from(path.trim()),
            _ => Self::default_database_path()?,
        };

        let max_connections = match lookup(MAX_CONNECTIONS_VAR) {
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::InvalidValue(
                        MAX_CONNECTIONS_VAR.to_string(),
                        format!("'{raw}' is not a positive integer"),
                    ));
                }
            },
            None => DEFAULT_MAX_CONNECTIONS,
        };

        Ok(StoreConfig {
            database_path,
            max_connections,
        })
    }

    /// Resolves `<data dir>/webcanvas/canvas.db`.
    fn default_database_path() -> Result<PathBuf, ConfigError> {
        let data = dirs::data_local_dir().ok_or(ConfigError::MissingDataDir)?;
        Ok(data.join("webcanvas").join("canvas.db"))
    }
}
