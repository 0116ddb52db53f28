use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::color::DEFAULT_BASE_COLOR;
use crate::fetch::{DEFAULT_BOUNDARY_SOURCES, Source};
use crate::legend::DEFAULT_STEPS;
use crate::properties::PropertyAliases;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub sources: SourcesConfig,
    pub style: StyleConfig,
    pub properties: PropertyAliases,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SourcesConfig {
    /// Base URL of the crop-data API.
    pub api: Option<String>,
    /// Local crop catalog, used when no API is configured.
    pub crop_data: Option<PathBuf>,
    /// Boundary candidates, tried in order.
    pub boundaries: Vec<String>,
    pub cache_dir: PathBuf,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            api: None,
            crop_data: None,
            boundaries: DEFAULT_BOUNDARY_SOURCES.iter().map(|s| s.to_string()).collect(),
            cache_dir: PathBuf::from(".cache"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StyleConfig {
    pub base_color: String,
    pub legend_steps: usize,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            base_color: DEFAULT_BASE_COLOR.to_string(),
            legend_steps: DEFAULT_STEPS,
        }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)
            .with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }

    pub fn boundary_sources(&self) -> Result<Vec<Source>> {
        self.sources.boundaries.iter().map(|s| s.parse()).collect()
    }
}
