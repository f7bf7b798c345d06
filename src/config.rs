use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub library: LibraryConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_path")]
    pub path: PathBuf,
    #[serde(default = "default_catalog_key")]
    pub key: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: default_catalog_path(),
            key: default_catalog_key(),
        }
    }
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("./data/desk.sqlite")
}
fn default_catalog_key() -> String {
    "uploadedFiles".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default = "default_step")]
    pub step: u8,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    /// Accepted filename extensions (`.pdf`, `md`, ...). Empty accepts any type.
    #[serde(default)]
    pub accept: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            step: default_step(),
            max_file_bytes: default_max_file_bytes(),
            accept: Vec::new(),
        }
    }
}

impl IngestConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

fn default_tick_ms() -> u64 {
    300
}
fn default_step() -> u8 {
    15
}
fn default_max_file_bytes() -> u64 {
    50 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct LibraryConfig {
    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            poll_ms: default_poll_ms(),
            page_size: default_page_size(),
        }
    }
}

impl LibraryConfig {
    pub fn poll_period(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }
}

fn default_poll_ms() -> u64 {
    750
}
fn default_page_size() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}

impl Config {
    /// Configuration with every section at its default.
    pub fn minimal() -> Self {
        Self {
            catalog: CatalogConfig::default(),
            ingest: IngestConfig::default(),
            library: LibraryConfig::default(),
            server: ServerConfig::default(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.catalog.key.trim().is_empty() {
            anyhow::bail!("catalog.key must not be empty");
        }

        if self.ingest.tick_ms == 0 {
            anyhow::bail!("ingest.tick_ms must be > 0");
        }
        if !(1..=100).contains(&self.ingest.step) {
            anyhow::bail!("ingest.step must be in [1, 100]");
        }
        if self.ingest.max_file_bytes == 0 {
            anyhow::bail!("ingest.max_file_bytes must be > 0");
        }

        if self.library.poll_ms == 0 {
            anyhow::bail!("library.poll_ms must be > 0");
        }
        if self.library.page_size == 0 {
            anyhow::bail!("library.page_size must be >= 1");
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}
