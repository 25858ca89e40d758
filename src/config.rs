use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::prompt::PromptConfig;

pub const CONFIG_PATH_ENV: &str = "GPT_CLI_CONFIG_PATH";
const APP_DIR_NAME: &str = "gpt-cli";
const CONFIG_FILE_NAME: &str = "config.yaml";
const FALLBACK_LOG_DIR: &str = "logs";
const DEFAULT_API_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
const DEFAULT_POLL_DEADLINE_SECS: u64 = 300;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found at {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read config file at {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file at {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("config file path is empty")]
    EmptyPath,

    #[error("could not determine the user config directory")]
    MissingConfigDir,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct VectorStoreConfig {
    pub name: String,
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct AssistantConfig {
    pub name: String,
    pub description: String,
    pub model: String,
    pub instruction: String,
    pub temperature: f64,
    pub vector_store_name: String,
}

/// Process-wide settings loaded from the YAML config file. Read-only after load.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct ConfigDocument {
    pub log_dir: String,
    pub auto_save_logs: bool,
    pub prompts: HashMap<String, PromptConfig>,
    pub vector_stores: HashMap<String, VectorStoreConfig>,
    pub assistants: HashMap<String, AssistantConfig>,
}

impl ConfigDocument {
    /// Directory that history names are resolved under.
    pub fn log_directory(&self) -> PathBuf {
        let configured = self.log_dir.trim();
        if !configured.is_empty() {
            return expand_home(configured);
        }

        dirs::data_dir()
            .map(|dir| dir.join(APP_DIR_NAME).join("logs"))
            .unwrap_or_else(|| PathBuf::from(FALLBACK_LOG_DIR))
    }
}

fn expand_home(raw: &str) -> PathBuf {
    match raw.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(raw)),
        None => PathBuf::from(raw),
    }
}

/// Resolves the config path: explicit flag, then `GPT_CLI_CONFIG_PATH`, then
/// `<user config dir>/gpt-cli/config.yaml`.
pub fn config_file_path(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    config_file_path_with(explicit, |key| env::var(key).ok(), dirs::config_dir())
}

fn config_file_path_with(
    explicit: Option<&Path>,
    mut get_var: impl FnMut(&str) -> Option<String>,
    user_config_dir: Option<PathBuf>,
) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit.filter(|path| !path.as_os_str().is_empty()) {
        return Ok(path.to_path_buf());
    }

    if let Some(path) = get_var(CONFIG_PATH_ENV).filter(|value| !value.trim().is_empty()) {
        return Ok(PathBuf::from(path));
    }

    user_config_dir
        .map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
        .ok_or(ConfigError::MissingConfigDir)
}

/// Reads and strictly decodes the config document at `path`.
pub fn load_config(path: &Path) -> Result<ConfigDocument, ConfigError> {
    if path.as_os_str().is_empty() {
        return Err(ConfigError::EmptyPath);
    }

    let content = fs::read_to_string(path).map_err(|source| {
        if source.kind() == ErrorKind::NotFound {
            ConfigError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;

    if content.trim().is_empty() {
        return Ok(ConfigDocument::default());
    }

    serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads the effective configuration. A missing file (or an undeterminable
/// config directory) yields the default document; any other failure is fatal.
pub fn load_configuration(explicit: Option<&Path>) -> Result<ConfigDocument, ConfigError> {
    let path = match config_file_path(explicit) {
        Ok(path) => path,
        Err(err) => {
            info!(error = %err, "config path unavailable, using defaults");
            return Ok(ConfigDocument::default());
        }
    };

    match load_config(&path) {
        Ok(document) => {
            debug!(
                path = %path.display(),
                prompts = document.prompts.len(),
                assistants = document.assistants.len(),
                vector_stores = document.vector_stores.len(),
                "loaded config file"
            );
            Ok(document)
        }
        Err(ConfigError::NotFound { path }) => {
            info!(path = %path.display(), "no config file found, using defaults");
            Ok(ConfigDocument::default())
        }
        Err(err) => Err(err),
    }
}

/// Settings taken from the process environment.
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub api_key: Option<String>,
    pub api_base_url: String,
    pub poll_interval: Duration,
    pub poll_deadline: Duration,
}

impl RuntimeSettings {
    pub fn from_env() -> Self {
        Self::from_env_with(|key| env::var(key).ok())
    }

    fn from_env_with(mut get_var: impl FnMut(&str) -> Option<String>) -> Self {
        let api_key = get_var("OPENAI_API_KEY")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        let api_base_url = get_var("OPENAI_BASE_URL")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        let poll_interval_ms = parse_positive_u64(
            get_var("GPT_CLI_POLL_INTERVAL_MS").as_deref(),
            DEFAULT_POLL_INTERVAL_MS,
        );
        let poll_deadline_secs = parse_positive_u64(
            get_var("GPT_CLI_POLL_DEADLINE_SECS").as_deref(),
            DEFAULT_POLL_DEADLINE_SECS,
        );

        Self {
            api_key,
            api_base_url,
            poll_interval: Duration::from_millis(poll_interval_ms),
            poll_deadline: Duration::from_secs(poll_deadline_secs),
        }
    }
}

fn parse_positive_u64(raw: Option<&str>, default: u64) -> u64 {
    raw.and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}
