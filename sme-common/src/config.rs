//! Configuration file resolution and TOML loading
//!
//! Config files are optional. A missing file is never fatal: callers fall
//! back to built-in defaults and log a warning.
//!
//! Resolution priority for the config file path:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`SME_CONFIG` by default)
//! 3. Per-user config directory (`~/.config/sme/config.toml` on Linux)
//! 4. None (built-in defaults)

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Default environment variable naming a config file
pub const CONFIG_ENV_VAR: &str = "SME_CONFIG";

/// Application directory name under the platform config dir
pub const APP_DIR_NAME: &str = "sme";

/// Where a resolved config path came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    CommandLine,
    Environment,
    UserConfigDir,
}

/// Resolves the config file path following the priority order above
#[derive(Debug, Clone)]
pub struct ConfigPathResolver {
    env_var_name: String,
    file_name: String,
}

impl ConfigPathResolver {
    /// Resolver for `<config_dir>/sme/<file_name>` honouring `SME_CONFIG`
    pub fn new(file_name: &str) -> Self {
        Self {
            env_var_name: CONFIG_ENV_VAR.to_string(),
            file_name: file_name.to_string(),
        }
    }

    /// Override the environment variable consulted at priority 2
    pub fn with_env_var(mut self, env_var_name: &str) -> Self {
        self.env_var_name = env_var_name.to_string();
        self
    }

    /// Resolve a config path, or `None` when only defaults apply.
    ///
    /// CLI and environment paths are returned even if the file does not
    /// exist, so the caller can report the missing file. The user config
    /// directory candidate is only returned when it exists.
    pub fn resolve(&self, cli_arg: Option<&Path>) -> Option<(PathBuf, ConfigSource)> {
        if let Some(path) = cli_arg {
            return Some((path.to_path_buf(), ConfigSource::CommandLine));
        }

        if let Ok(path) = std::env::var(&self.env_var_name) {
            if !path.trim().is_empty() {
                return Some((PathBuf::from(path), ConfigSource::Environment));
            }
        }

        let user_config = dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join(&self.file_name));
        match user_config {
            Some(path) if path.exists() => Some((path, ConfigSource::UserConfigDir)),
            _ => None,
        }
    }
}

/// Read and parse a TOML file into `T`
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    let value = toml::from_str::<T>(&content)?;
    debug!("Parsed TOML configuration from {}", path.display());
    Ok(value)
}

/// Load `T` from the resolved config path, falling back to `T::default()`.
///
/// A missing file degrades to defaults with a warning. A file that exists
/// but fails to parse is an error: silently ignoring a broken config would
/// hide the user's mistake.
pub fn load_or_default<T>(resolver: &ConfigPathResolver, cli_arg: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some((path, source)) = resolver.resolve(cli_arg) else {
        info!("No config file found, using built-in defaults");
        return Ok(T::default());
    };

    if !path.exists() {
        warn!(
            "Config file {} ({:?}) does not exist, using built-in defaults",
            path.display(),
            source
        );
        return Ok(T::default());
    }

    let value = load_toml(&path)?;
    info!("Loaded configuration from {} ({:?})", path.display(), source);
    Ok(value)
}
