use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use insee::importer::{ImportFiles, ReimportPolicy};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub global: GlobalConfig,
    pub files: ImportFiles,
    pub import: ImportConfig,
    pub countries: Vec<CountryConfig>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GlobalConfig {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            db_path: PathBuf::from("insee.db"),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ImportConfig {
    pub policy: ReimportPolicy,
}

/// Baseline country seeded before the import.
#[derive(Debug, Deserialize, Clone)]
pub struct CountryConfig {
    pub name: String,
    pub code: String,
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read import config {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Invalid import config {}", path.display()))
    }

    /// Countries to seed; France when none are configured.
    pub fn baseline_countries(&self) -> Vec<CountryConfig> {
        if self.countries.is_empty() {
            vec![CountryConfig {
                name: insee::autofill::FRANCE.to_string(),
                code: "FR".to_string(),
            }]
        } else {
            self.countries.clone()
        }
    }
}
