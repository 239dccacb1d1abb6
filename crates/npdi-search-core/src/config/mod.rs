//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::domain::search::EntityCategory;
use crate::error::{Error, Result};

/// npdi-search configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub index: IndexSettings,
}

/// Orchestrator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Maximum number of finished searches kept for instant repeat queries
    pub cache_capacity: usize,
    /// Tie-break order for entries with equal relevance
    pub category_precedence: Vec<EntityCategory>,
    /// Overall deadline after which a search is finalized with partial results
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_ms: Option<u64>,
    /// Number of ranked entries kept in each snapshot
    pub max_results: usize,
}

/// Settings for the in-memory indexed category clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    /// Records per streamed chunk
    pub chunk_size: usize,
    /// Simulated latency before each chunk
    pub latency_ms: u64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            cache_capacity: 50,
            category_precedence: EntityCategory::all(),
            deadline_ms: None,
            max_results: 10,
        }
    }
}

impl SearchSettings {
    /// Deadline as a duration, if one is configured
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }

    /// Set the overall deadline
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline_ms = Some(u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Set the cache capacity
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Set the category precedence order
    pub fn with_precedence(mut self, precedence: Vec<EntityCategory>) -> Self {
        self.category_precedence = precedence;
        self
    }

    /// Set the number of entries kept per snapshot
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    /// Validate orchestrator settings
    pub fn validate(&self) -> Result<()> {
        if self.cache_capacity == 0 {
            return Err(Error::InvalidCacheCapacity);
        }
        if self.max_results == 0 {
            return Err(Error::ConfigError(
                "search.max_results must be at least 1".to_string(),
            ));
        }
        for (index, category) in self.category_precedence.iter().enumerate() {
            if self.category_precedence[..index].contains(category) {
                return Err(Error::ConfigError(format!(
                    "search.category_precedence lists '{}' more than once",
                    category
                )));
            }
        }
        Ok(())
    }
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            chunk_size: 25,
            latency_ms: 0,
        }
    }
}

impl IndexSettings {
    /// Latency as a duration
    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("NPDI_SEARCH_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("npdi-search")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or return defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;

        if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.validate()?;

        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        let path = Self::config_path()?;
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.search.validate()?;
        if self.index.chunk_size == 0 {
            return Err(Error::ConfigError("index.chunk_size must be at least 1".to_string()).into());
        }
        Ok(())
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            "search.cache_capacity" => Ok(self.search.cache_capacity.to_string()),
            "search.category_precedence" => Ok(self
                .search
                .category_precedence
                .iter()
                .map(|c| c.as_str())
                .collect::<Vec<_>>()
                .join(", ")),
            "search.deadline_ms" => Ok(self
                .search
                .deadline_ms
                .map(|ms| ms.to_string())
                .unwrap_or_else(|| "(not set)".to_string())),
            "search.max_results" => Ok(self.search.max_results.to_string()),

            "index.chunk_size" => Ok(self.index.chunk_size.to_string()),
            "index.latency_ms" => Ok(self.index.latency_ms.to_string()),

            _ => Err(unknown_key(key).into()),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "search.cache_capacity" => {
                let capacity: usize = parse_value("cache_capacity", value)?;
                if capacity == 0 {
                    return Err(Error::InvalidCacheCapacity.into());
                }
                self.search.cache_capacity = capacity;
            }
            "search.category_precedence" => {
                let mut precedence = Vec::new();
                for name in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                    let category = EntityCategory::from_str(name)
                        .ok_or_else(|| Error::UnknownCategory(name.to_string()))?;
                    if precedence.contains(&category) {
                        return Err(Error::ConfigError(format!(
                            "Category '{}' listed more than once",
                            name
                        ))
                        .into());
                    }
                    precedence.push(category);
                }
                self.search.category_precedence = precedence;
            }
            "search.deadline_ms" => {
                if value.eq_ignore_ascii_case("none") || value.is_empty() {
                    self.search.deadline_ms = None;
                } else {
                    self.search.deadline_ms = Some(parse_value("deadline_ms", value)?);
                }
            }
            "search.max_results" => {
                let max: usize = parse_value("max_results", value)?;
                if max == 0 {
                    return Err(Error::InvalidInput("max_results must be at least 1".to_string()).into());
                }
                self.search.max_results = max;
            }

            "index.chunk_size" => {
                let size: usize = parse_value("chunk_size", value)?;
                if size == 0 {
                    return Err(Error::InvalidInput("chunk_size must be at least 1".to_string()).into());
                }
                self.index.chunk_size = size;
            }
            "index.latency_ms" => {
                self.index.latency_ms = parse_value("latency_ms", value)?;
            }

            _ => return Err(unknown_key(key).into()),
        }
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        let keys = [
            "search.cache_capacity",
            "search.category_precedence",
            "search.deadline_ms",
            "search.max_results",
            "index.chunk_size",
            "index.latency_ms",
        ];

        keys.into_iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }

    /// Reset configuration to defaults
    pub fn reset() -> anyhow::Result<()> {
        let path = Self::config_path()?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        }
        Ok(())
    }
}

fn unknown_key(key: &str) -> Error {
    Error::ConfigError(format!(
        "Unknown configuration key: {}. Use `npdi-search config list` to see available keys.",
        key
    ))
}

fn parse_value<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::InvalidInput(format!("Invalid {} value: {}", name, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.search.cache_capacity, 50);
        assert_eq!(
            config.search.category_precedence,
            vec![
                EntityCategory::Officer,
                EntityCategory::Unit,
                EntityCategory::Agency
            ]
        );
        assert!(config.search.deadline().is_none());
        assert_eq!(config.search.max_results, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_get_and_set() {
        let mut config = Config::default();

        config.set("search.cache_capacity", "5").unwrap();
        assert_eq!(config.get("search.cache_capacity").unwrap(), "5");

        config
            .set("search.category_precedence", "agency, officer")
            .unwrap();
        assert_eq!(
            config.get("search.category_precedence").unwrap(),
            "agency, officer"
        );

        config.set("search.deadline_ms", "250").unwrap();
        assert_eq!(
            config.search.deadline(),
            Some(Duration::from_millis(250))
        );
        config.set("search.deadline_ms", "none").unwrap();
        assert_eq!(config.get("search.deadline_ms").unwrap(), "(not set)");

        config.set("index.latency_ms", "40").unwrap();
        assert_eq!(config.index.latency(), Duration::from_millis(40));
    }

    #[test]
    fn test_set_rejects_invalid_values() {
        let mut config = Config::default();
        assert!(config.set("search.cache_capacity", "0").is_err());
        assert!(config.set("search.cache_capacity", "lots").is_err());
        assert!(config.set("search.category_precedence", "officer,civilian").is_err());
        assert!(config.set("search.category_precedence", "unit,unit").is_err());
        assert!(config.set("index.chunk_size", "0").is_err());
        assert!(config.set("search.unknown", "1").is_err());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_set_reports_typed_errors() {
        let mut config = Config::default();

        let err = config
            .set("search.category_precedence", "officer,civilian")
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::UnknownCategory(name)) if name == "civilian"
        ));

        let err = config.set("search.cache_capacity", "0").unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::InvalidCacheCapacity)));

        let err = config.set("index.latency_ms", "soon").unwrap_err();
        assert_eq!(err.downcast_ref::<Error>().map(Error::code), Some("E800"));

        let err = config.get("search.unknown").unwrap_err();
        assert_eq!(err.downcast_ref::<Error>().map(Error::code), Some("E601"));
    }

    #[test]
    fn test_with_deadline_saturates() {
        let settings = SearchSettings::default().with_deadline(Duration::MAX);
        assert_eq!(settings.deadline_ms, Some(u64::MAX));

        let settings = SearchSettings::default().with_deadline(Duration::from_millis(1500));
        assert_eq!(settings.deadline_ms, Some(1500));
    }

    #[test]
    fn test_validate_duplicate_precedence() {
        let settings = SearchSettings::default().with_precedence(vec![
            EntityCategory::Unit,
            EntityCategory::Unit,
        ]);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_list_covers_every_key() {
        let items = Config::default().list().unwrap();
        assert_eq!(items.len(), 6);
        assert!(items.iter().any(|(k, v)| k == "index.chunk_size" && v == "25"));
    }

    #[test]
    fn test_toml_roundtrip_with_deadline() {
        let mut config = Config::default();
        config.search.deadline_ms = Some(1500);
        let text = toml::to_string_pretty(&config).unwrap();
        assert!(text.contains("deadline_ms = 1500"));
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let parsed: Config = toml::from_str("[index]\nchunk_size = 3\n").unwrap();
        assert_eq!(parsed.index.chunk_size, 3);
        assert_eq!(parsed.search, SearchSettings::default());
    }
}
