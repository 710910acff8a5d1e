//! Configuration: scan tuning and custom rule additions, read from TOML.
//!
//! ```toml
//! [scan]
//! workers = 8
//! follow_links = false
//!
//! [rules]
//! cache = ["*.thumbcache", "Library/Caches/"]
//! temporary = ["*.swp"]
//! ```
//!
//! Entries under `[rules]` are validated one by one; a bad entry is skipped
//! with a warning and never fails the load.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::categories::Category;
use crate::error::ConfigError;
use crate::rules::{CustomPattern, RuleSet};

const CONFIG_DIR: &str = "junkclean";
const CONFIG_FILE: &str = "config.toml";

/// Worker pool and traversal settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScanOptions {
    /// Number of walker threads. Zero is treated as one.
    pub workers: usize,
    /// Traverse symlinked directories. Cycles are still detected.
    pub follow_links: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            follow_links: false,
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scan: ScanOptions,
    /// Category name to list of glob-style patterns. Kept loosely typed so
    /// one malformed entry cannot reject the whole file.
    pub rules: BTreeMap<String, toml::Value>,
}

impl Config {
    /// `<config dir>/junkclean/config.toml`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Load the default config file, falling back to defaults when it does
    /// not exist.
    pub fn load_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    /// Parse TOML text. `origin` is only used in error messages.
    pub fn parse(content: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        tracing::debug!(
            "Loaded config from {} ({} workers, {} rule groups)",
            origin.display(),
            config.scan.workers,
            config.rules.len()
        );
        Ok(config)
    }

    /// Well-formed custom rule entries, in file order within each category.
    pub fn custom_patterns(&self) -> Vec<CustomPattern> {
        let mut patterns = Vec::new();

        for (key, value) in &self.rules {
            let category: Category = match key.parse() {
                Ok(category) => category,
                Err(e) => {
                    tracing::warn!("Skipping rules for '{}': {}", key, e);
                    continue;
                }
            };
            let Some(items) = value.as_array() else {
                tracing::warn!("Skipping rules for '{}': expected a list of patterns", key);
                continue;
            };

            for item in items {
                match item.as_str().map(str::trim) {
                    Some(pattern) if !pattern.is_empty() => patterns.push(CustomPattern {
                        category,
                        pattern: pattern.to_string(),
                    }),
                    Some(_) => tracing::warn!("Skipping empty pattern under '{}'", key),
                    None => tracing::warn!("Skipping non-string pattern {} under '{}'", item, key),
                }
            }
        }

        patterns
    }

    /// Built-in rules plus the valid custom additions.
    pub fn rule_set(&self) -> RuleSet {
        RuleSet::with_custom(&self.custom_patterns())
    }
}
