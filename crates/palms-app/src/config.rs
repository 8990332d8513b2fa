use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use palms_types::{DEFAULT_API_URL, DEFAULT_MODEL};

use crate::cli::Cli;

pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Optional `config.toml` in the data directory
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub api_url: Option<String>,
    /// Model used until one is selected with `palms model`
    pub model: Option<String>,
    pub verbose: Option<bool>,
    pub log_conversations: Option<bool>,
}

impl FileConfig {
    /// Load from TOML; a missing file yields the defaults
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: FileConfig = toml::from_str(&content)
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        Ok(config)
    }
}

/// Settings for one run. Flags and environment variables win over
/// `config.toml`, which wins over the built-in defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub api_url: String,
    /// Per-run model from `--model` / `PALMS_MODEL`
    pub model_override: Option<String>,
    /// Model used when the session has no saved selection
    pub default_model: String,
    pub data_dir: PathBuf,
    pub verbose: bool,
    pub log_requests: bool,
    pub log_conversations: bool,
}

impl AppConfig {
    pub fn resolve(cli: &Cli, data_dir: PathBuf, file: FileConfig) -> Self {
        let non_empty = |value: &Option<String>| value.clone().filter(|v| !v.trim().is_empty());

        let api_url = non_empty(&cli.api_url)
            .or_else(|| non_empty(&file.api_url))
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            model_override: non_empty(&cli.model),
            default_model: non_empty(&file.model).unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            data_dir,
            verbose: cli.verbose || file.verbose.unwrap_or(false),
            log_requests: cli.log_requests,
            log_conversations: cli.log_conversations || file.log_conversations.unwrap_or(false),
        }
    }

    /// Directory of the session store
    pub fn store_dir(&self) -> PathBuf {
        self.data_dir.join("store")
    }
}

/// Set up application configuration from CLI arguments
pub fn setup_from_cli(cli: &Cli) -> Result<AppConfig> {
    let data_dir = match &cli.data_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create data directory {}", dir.display()))?;
            dir.clone()
        }
        None => palms_logging::get_palms_dir()?,
    };

    let file = FileConfig::load_from_file(data_dir.join(CONFIG_FILE_NAME))?;
    Ok(AppConfig::resolve(cli, data_dir, file))
}
