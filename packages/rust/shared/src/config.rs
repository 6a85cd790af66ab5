//! Application configuration for kybcheck.
//!
//! User config lives at `~/.kybcheck/kybcheck.toml`.
//! CLI flags override config file values, which override defaults.
//!
//! API keys are never stored in the file — each section names the
//! environment variable that holds the key.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{KybError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "kybcheck.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".kybcheck";

// ---------------------------------------------------------------------------
// Config structs (matching kybcheck.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Companies House registry settings.
    #[serde(default)]
    pub registry: RegistryConfig,

    /// AI provider settings.
    #[serde(default)]
    pub ai: AiConfig,

    /// Web search provider settings.
    #[serde(default)]
    pub search: SearchConfig,

    /// Pipeline timeouts.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Job store settings.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port the HTTP API listens on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

fn default_port() -> u16 {
    8080
}

/// `[registry]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Companies House REST API base URL.
    #[serde(default = "default_registry_base_url")]
    pub base_url: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_registry_key_env")]
    pub api_key_env: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: default_registry_base_url(),
            api_key_env: default_registry_key_env(),
        }
    }
}

fn default_registry_base_url() -> String {
    "https://api.company-information.service.gov.uk".into()
}
fn default_registry_key_env() -> String {
    "COMPANIES_HOUSE_API_KEY".into()
}

/// `[ai]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// OpenRouter-compatible chat completions base URL.
    #[serde(default = "default_ai_base_url")]
    pub base_url: String,

    /// Name of the env var holding the API key.
    #[serde(default = "default_ai_key_env")]
    pub api_key_env: String,

    /// Model used for CRN resolution prompts.
    #[serde(default = "default_ai_model")]
    pub model: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            base_url: default_ai_base_url(),
            api_key_env: default_ai_key_env(),
            model: default_ai_model(),
        }
    }
}

fn default_ai_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_ai_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_ai_model() -> String {
    "moonshotai/kimi-k2.5".into()
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Primary search results page to scrape.
    #[serde(default = "default_primary_search")]
    pub primary_base_url: String,

    /// Secondary provider, tried when the primary yields nothing parseable.
    #[serde(default = "default_secondary_search")]
    pub secondary_base_url: String,

    /// Name of the env var holding an optional paid search API key.
    /// Absence of the key is not an error — the paid call is best-effort.
    #[serde(default = "default_serp_key_env")]
    pub api_key_env: String,

    /// Paid search API endpoint (used only when the key env var is set).
    #[serde(default = "default_serp_api_url")]
    pub api_base_url: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            primary_base_url: default_primary_search(),
            secondary_base_url: default_secondary_search(),
            api_key_env: default_serp_key_env(),
            api_base_url: default_serp_api_url(),
        }
    }
}

fn default_primary_search() -> String {
    "https://html.duckduckgo.com/html".into()
}
fn default_secondary_search() -> String {
    "https://www.bing.com/search".into()
}
fn default_serp_key_env() -> String {
    "SERP_API_KEY".into()
}
fn default_serp_api_url() -> String {
    "https://google.serper.dev/search".into()
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Timeout for website/registry/search HTTP calls, in seconds.
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    /// Timeout for AI completion calls, in seconds.
    #[serde(default = "default_ai_timeout")]
    pub ai_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            http_timeout_secs: default_http_timeout(),
            ai_timeout_secs: default_ai_timeout(),
        }
    }
}

fn default_http_timeout() -> u64 {
    10
}
fn default_ai_timeout() -> u64 {
    30
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the job database. `~` expands to the user's home directory.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "~/.kybcheck/jobs.db".into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.kybcheck/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| KybError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.kybcheck/kybcheck.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| KybError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| KybError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| KybError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| KybError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| KybError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the registry API key env var is set and non-empty.
///
/// The AI and paid-search keys are deliberately not checked here: the
/// resolver degrades through fallbacks without them, the registry does not.
pub fn validate_api_keys(config: &AppConfig) -> Result<()> {
    let var_name = &config.registry.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(()),
        _ => Err(KybError::config(format!(
            "Companies House API key not found. Set the {var_name} environment variable.\n\
             Register for a key at https://developer.company-information.service.gov.uk/"
        ))),
    }
}
