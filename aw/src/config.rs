//! agentwire configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::llm::ModelParameters;
use crate::r#loop::LoopConfig;

/// Main agentwire configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model provider configuration
    pub llm: LlmConfig,

    /// Tool loop limits
    #[serde(rename = "loop")]
    pub loop_config: LoopSection,

    /// HTTP server configuration
    pub server: ServerConfig,

    /// Event log persistence
    pub events: EventsConfig,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Config {
    /// Validate configuration before talking to a provider
    ///
    /// Fails fast with a clear message when the API key env var is missing.
    pub fn validate(&self) -> Result<()> {
        if std::env::var(&self.llm.api_key_env).is_err() {
            return Err(eyre::eyre!(
                "LLM API key not found. Set the {} environment variable.",
                self.llm.api_key_env
            ));
        }
        if self.llm.max_tokens == 0 {
            return Err(eyre::eyre!("llm.max-tokens must be greater than zero"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Project-local config: .agentwire.yml
        let local_config = PathBuf::from(".agentwire.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // User config: ~/.config/agentwire/agentwire.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("agentwire").join("agentwire.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Model provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name (currently only "openai" supported)
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL; any OpenAI-compatible endpoint works
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Sampling temperature, provider default when absent
    pub temperature: Option<f32>,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: "https://api.openai.com".to_string(),
            max_tokens: 4096,
            temperature: None,
            timeout_ms: 300_000,
        }
    }
}

impl LlmConfig {
    /// Read the API key from the configured environment variable
    pub fn get_api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env)
            .with_context(|| format!("Environment variable {} is not set", self.api_key_env))
    }

    /// Parameters passed through on every invocation
    pub fn model_parameters(&self) -> ModelParameters {
        ModelParameters {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

/// Tool loop limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopSection {
    /// Maximum tool rounds per request
    pub budget: u32,

    /// Capacity of the provider chunk channel
    #[serde(rename = "chunk-buffer")]
    pub chunk_buffer: usize,
}

impl Default for LoopSection {
    fn default() -> Self {
        let defaults = LoopConfig::default();
        Self {
            budget: defaults.loop_budget,
            chunk_buffer: defaults.chunk_buffer,
        }
    }
}

impl From<&LoopSection> for LoopConfig {
    fn from(section: &LoopSection) -> Self {
        LoopConfig {
            loop_budget: section.budget,
            chunk_buffer: section.chunk_buffer.max(1),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind, e.g. 127.0.0.1:8787
    pub bind: String,

    /// Session recorders kept in memory for message lookups
    #[serde(rename = "session-capacity")]
    pub session_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8787".to_string(),
            session_capacity: 256,
        }
    }
}

/// Event log persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Write a JSONL event log per session
    pub enabled: bool,

    /// Root directory for per-session logs
    pub dir: PathBuf,
}

impl Default for EventsConfig {
    fn default() -> Self {
        // ~/.local/share/agentwire/sessions on Linux
        let dir = dirs::data_dir()
            .map(|d| d.join("agentwire").join("sessions"))
            .unwrap_or_else(|| PathBuf::from(".agentwire/sessions"));

        Self { enabled: true, dir }
    }
}
