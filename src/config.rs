//! Settings loaded from TOML.
//!
//! Built-in defaults (`geoloc.default.toml`) are merged with an optional user
//! file, so a user file only needs the keys it changes.

use crate::geocoding::Provider;
use duration_str::deserialize_duration;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const DEFAULT_CONFIG: &str = include_str!("geoloc.default.toml");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Settings {
    pub db: DbSettings,
    pub geocoding: GeocodingSettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DbSettings {
    /// SQLite database file. A leading `~/` means the home directory.
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GeocodingSettings {
    pub default_geocoder: Provider,
    #[serde(deserialize_with = "deserialize_duration")]
    pub timeout: Duration,
    pub user_agent: String,
    /// API keys by provider short name.
    #[serde(default)]
    pub keys: HashMap<String, String>,
    /// Endpoint overrides by provider short name.
    #[serde(default)]
    pub endpoints: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CacheSettings {
    /// Age after which cached coordinates are re-fetched.
    #[serde(deserialize_with = "deserialize_duration")]
    pub max_age: Duration,
}

impl Settings {
    /// Built-in defaults only.
    pub fn defaults() -> Result<Self, ConfigError> {
        Self::from_toml_str("")
    }

    /// Defaults overlaid with `path`, or with the default user file when it
    /// exists.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Self::default_path().filter(|p| p.exists()),
        };
        match path {
            Some(path) => {
                debug!(path = %path.display(), "loading config");
                let text = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
                    path: path.clone(),
                    source,
                })?;
                Self::from_toml_str(&text)
            }
            None => Self::defaults(),
        }
    }

    /// Parse user TOML on top of the defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let mut merged: toml::Table = toml::from_str(DEFAULT_CONFIG)?;
        let overlay: toml::Table = toml::from_str(text)?;
        merge(&mut merged, overlay);
        let settings: Settings = toml::Value::Table(merged).try_into()?;
        Ok(settings.expand_paths())
    }

    /// `~/.geoloc/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".geoloc").join("config.toml"))
    }

    fn expand_paths(mut self) -> Self {
        self.db.path = expand_tilde(&self.db.path);
        self
    }
}

fn merge(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        let value = match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(base_table)), toml::Value::Table(over_table)) => {
                merge(base_table, over_table);
                continue;
            }
            (_, value) => value,
        };
        base.insert(key, value);
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = Settings::defaults().unwrap();
        assert_eq!(settings.geocoding.default_geocoder, Provider::GeoNames);
        assert_eq!(settings.geocoding.timeout, Duration::from_secs(10));
        assert_eq!(settings.cache.max_age, Duration::from_secs(30 * 24 * 3600));
        assert!(settings.geocoding.keys.is_empty());
        assert!(settings.db.path.ends_with(".geoloc/locations.sqlite"));
    }

    #[test]
    fn test_overlay_keeps_unset_defaults() {
        let settings = Settings::from_toml_str(
            r#"
            [geocoding]
            default-geocoder = "yahoo"

            [geocoding.keys]
            yahoo = "my-app-id"

            [cache]
            max-age = "2h"
            "#,
        )
        .unwrap();
        assert_eq!(settings.geocoding.default_geocoder, Provider::Yahoo);
        assert_eq!(settings.geocoding.keys.get("yahoo").map(String::as_str), Some("my-app-id"));
        assert_eq!(settings.geocoding.timeout, Duration::from_secs(10));
        assert_eq!(settings.cache.max_age, Duration::from_secs(7200));
    }

    #[test]
    fn test_unknown_geocoder_rejected() {
        let result = Settings::from_toml_str("[geocoding]\ndefault-geocoder = \"mapquest\"\n");
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[db]\npath = \"/tmp/geo.sqlite\"\n").unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.db.path, PathBuf::from("/tmp/geo.sqlite"));
    }

    #[test]
    fn test_load_missing_file() {
        let result = Settings::load(Some(Path::new("/nonexistent/geoloc.toml")));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
