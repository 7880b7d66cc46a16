//! Configuration module for verse-search.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file (`.verse-search/settings.toml`)
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `VS_` and use double underscores
//! to separate nested levels:
//! - `VS_SEARCH__DEFAULT_TOP_K=5` sets `search.default_top_k`
//! - `VS_INDEX__BACKEND=managed` sets `index.backend`
//! - `VS_EXPLANATION__ENABLED=true` sets `explanation.enabled`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::vector::BackendKind;

/// Directory holding the settings file, relative to the workspace root.
pub const CONFIG_DIR: &str = ".verse-search";

/// Settings file name inside [`CONFIG_DIR`].
pub const SETTINGS_FILE: &str = "settings.toml";

const ENV_PREFIX: &str = "VS_";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Path to the persisted index directory
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,

    /// Path to the corpus JSON file used for builds
    #[serde(default = "default_corpus_path")]
    pub corpus_path: PathBuf,

    /// Workspace root directory (where .verse-search is located)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    /// Embedding model settings
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Index backend settings
    #[serde(default)]
    pub index: IndexConfig,

    /// Query defaults
    #[serde(default)]
    pub search: SearchConfig,

    /// Optional per-result explanations
    #[serde(default)]
    pub explanation: ExplanationConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EmbeddingConfig {
    /// fastembed model name, or `hashing-<dim>` for the offline encoder
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Number of texts encoded per model call during builds
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Where downloaded model weights are cached
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Show a progress bar while downloading model weights
    #[serde(default = "default_false")]
    pub show_download_progress: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct IndexConfig {
    /// Index backend: "flat" or "managed"
    #[serde(default)]
    pub backend: BackendKind,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SearchConfig {
    /// Number of matches returned when the caller does not ask for a count
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ExplanationConfig {
    /// Attach an explanation to every search match
    #[serde(default = "default_false")]
    pub enabled: bool,

    /// Base URL of an OpenAI-compatible API
    #[serde(default = "default_explanation_endpoint")]
    pub endpoint: String,

    /// Chat model used for explanations
    #[serde(default = "default_explanation_model")]
    pub model: String,

    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Per-call timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum explanation calls in flight per search
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Text attached when an explanation fails or times out
    #[serde(default = "default_placeholder")]
    pub placeholder: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_index_path() -> PathBuf {
    PathBuf::from(".verse-search/index")
}
fn default_corpus_path() -> PathBuf {
    PathBuf::from("verse.json")
}
fn default_false() -> bool {
    false
}
fn default_embedding_model() -> String {
    "AllMiniLML6V2".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("verse-search")
        .join("models")
}
fn default_top_k() -> usize {
    3
}
fn default_explanation_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_explanation_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_timeout_ms() -> u64 {
    10_000
}
fn default_max_concurrency() -> usize {
    4
}
fn default_placeholder() -> String {
    crate::explain::DEFAULT_PLACEHOLDER.to_string()
}
fn default_max_tokens() -> u32 {
    150
}
fn default_temperature() -> f32 {
    0.7
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            index_path: default_index_path(),
            corpus_path: default_corpus_path(),
            workspace_root: None,
            embedding: EmbeddingConfig::default(),
            index: IndexConfig::default(),
            search: SearchConfig::default(),
            explanation: ExplanationConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            batch_size: default_batch_size(),
            cache_dir: default_cache_dir(),
            show_download_progress: false,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
        }
    }
}

impl Default for ExplanationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_explanation_endpoint(),
            model: default_explanation_model(),
            api_key_env: default_api_key_env(),
            timeout_ms: default_timeout_ms(),
            max_concurrency: default_max_concurrency(),
            placeholder: default_placeholder(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        // Try to find the workspace root by looking for .verse-search directory
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(SETTINGS_FILE));

        Self::figment(&config_path)
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                // If workspace_root is not set in config, detect it
                if settings.workspace_root.is_none() {
                    settings.workspace_root = Self::workspace_root();
                }
                settings
            })
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment(path.as_ref()).extract().map_err(Box::new)
    }

    fn figment(config_path: &Path) -> Figment {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(config_path))
            // Double underscore (__) separates nested levels,
            // single underscore (_) remains as is within field names
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str()
                    .to_lowercase()
                    .replace("__", ".")
                    .into()
            }))
    }

    /// Find the workspace config by looking for .verse-search directory
    /// Searches from current directory up to root
    fn find_workspace_config() -> Option<PathBuf> {
        Self::workspace_root().map(|root| root.join(CONFIG_DIR).join(SETTINGS_FILE))
    }

    /// Get the workspace root directory (where .verse-search is located)
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .find(|ancestor| ancestor.join(CONFIG_DIR).is_dir())
            .map(Path::to_path_buf)
    }

    /// Check if configuration is properly initialized
    pub fn check_init() -> Result<(), String> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(SETTINGS_FILE));

        if !config_path.exists() {
            return Err("No configuration file found".to_string());
        }

        match std::fs::read_to_string(&config_path) {
            Ok(content) => {
                if let Err(e) = toml::from_str::<Settings>(&content) {
                    return Err(format!(
                        "Configuration file is corrupted: {e}\nRun 'verse-search init --force' to regenerate."
                    ));
                }
            }
            Err(e) => {
                return Err(format!("Cannot read configuration file: {e}"));
            }
        }

        Ok(())
    }

    /// Resolves a configured path against the workspace root.
    ///
    /// Absolute paths are returned unchanged; relative ones are joined onto
    /// `workspace_root` when it is known.
    #[must_use]
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        match &self.workspace_root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Effective index directory.
    #[must_use]
    pub fn index_dir(&self) -> PathBuf {
        self.resolve_path(&self.index_path)
    }

    /// Effective corpus file.
    #[must_use]
    pub fn corpus_file(&self) -> PathBuf {
        self.resolve_path(&self.corpus_path)
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file in the current directory
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let current_dir = std::env::current_dir()?;
        Self::init_config_file_in(&current_dir, force)
    }

    /// Create a default settings file with helpful comments under `root`
    pub fn init_config_file_in(
        root: &Path,
        force: bool,
    ) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = root.join(CONFIG_DIR).join(SETTINGS_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let template = format!(
            r#"# verse-search configuration file

# Version of the configuration schema
version = 1

# Path to the index directory (relative to workspace root)
index_path = ".verse-search/index"

# Path to the corpus JSON file (relative to workspace root)
corpus_path = "verse.json"

# Workspace root directory (automatically detected)
workspace_root = {root}

[embedding]
# fastembed model: AllMiniLML6V2, AllMiniLML12V2, BGESmallENV15, BGEBaseENV15,
# NomicEmbedTextV15, or "hashing-<dim>" for the offline hashing encoder.
# Changing the model requires rebuilding the index.
model = "AllMiniLML6V2"

# Texts encoded per model call while building
batch_size = 64

# Where downloaded model weights are cached
cache_dir = {cache_dir}

show_download_progress = false

[index]
# "flat": precomputed vectors, exact search
# "managed": stores texts and encodes them on first query
backend = "flat"

[search]
# Matches returned when no count is given
default_top_k = 3

[explanation]
# Attach a short explanation from an OpenAI-compatible chat API to each match
enabled = false
endpoint = "https://api.openai.com/v1"
model = "gpt-4o-mini"

# Environment variable holding the API key
api_key_env = "OPENAI_API_KEY"

# Per-call timeout and maximum calls in flight
timeout_ms = 10000
max_concurrency = 4

# Attached when an explanation fails or times out
placeholder = "Explanation unavailable."

max_tokens = 150
temperature = 0.7

[logging]
# Filter directive for stderr logging; RUST_LOG overrides it
level = "info"
"#,
            root = toml::Value::String(root.display().to_string()),
            cache_dir = toml::Value::String(default_cache_dir().display().to_string()),
        );

        std::fs::write(&config_path, template)?;

        Ok(config_path)
    }
}
