// User settings
// Loaded from ~/.config/chartgrid/settings.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Search mode a new search starts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DefaultSearchMode {
    #[default]
    Substring,
    WholeWord,
    Regex,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Statistical tests
    #[serde(rename = "stats.significanceLevel")]
    pub significance_level: f64,

    #[serde(rename = "stats.minNumericGroupSize")]
    pub min_numeric_group_size: usize,

    #[serde(rename = "stats.minProportionGroupSize")]
    pub min_proportion_group_size: usize,

    #[serde(rename = "stats.minExpectedCount")]
    pub min_expected_count: f64,

    // Search
    #[serde(rename = "search.defaultMode")]
    pub default_search_mode: DefaultSearchMode,

    // Formula
    #[serde(rename = "formula.maxDepth")]
    pub formula_max_depth: usize,

    // Profiling
    #[serde(rename = "profile.sampleSize")]
    pub profile_sample_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            // Stats
            significance_level: 0.05,
            min_numeric_group_size: 5,
            min_proportion_group_size: 10,
            min_expected_count: 5.0,
            // Search
            default_search_mode: DefaultSearchMode::Substring,
            // Formula
            formula_max_depth: 256,
            // Profiling
            profile_sample_size: 5,
        }
    }
}

/// Drop lines starting with `//` so the file can carry comments.
fn strip_comments(contents: &str) -> String {
    contents
        .lines()
        .filter(|line| !line.trim().starts_with("//"))
        .collect::<Vec<_>>()
        .join("\n")
}

impl Settings {
    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("chartgrid");
        config_dir.join("settings.json")
    }

    /// Load settings from the default location. A missing or broken file
    /// falls back to defaults.
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("{}; using default settings", e);
                Self::default()
            }
        }
    }

    /// Load and validate settings from an explicit path. Keys that are not
    /// present keep their defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings =
            serde_json::from_str(&strip_comments(&contents)).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        settings.validate()?;
        log::debug!("loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let alpha = self.significance_level;
        if !(alpha > 0.0 && alpha < 1.0) {
            return Err(ConfigError::invalid(
                "stats.significanceLevel",
                format!("must be between 0 and 1 (exclusive), got {}", alpha),
            ));
        }
        if !(self.min_expected_count.is_finite() && self.min_expected_count >= 0.0) {
            return Err(ConfigError::invalid(
                "stats.minExpectedCount",
                format!("must be a non-negative number, got {}", self.min_expected_count),
            ));
        }

        let sizes = [
            ("stats.minNumericGroupSize", self.min_numeric_group_size),
            ("stats.minProportionGroupSize", self.min_proportion_group_size),
            ("formula.maxDepth", self.formula_max_depth),
            ("profile.sampleSize", self.profile_sample_size),
        ];
        for (key, value) in sizes {
            if value < 1 {
                return Err(ConfigError::invalid(key, "must be at least 1"));
            }
        }
        Ok(())
    }

    /// Save settings to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io { path: path.to_path_buf(), source };

        // Ensure directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(io_err)
    }
}
