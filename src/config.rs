//! Dracode configuration types and loading.
//!
//! Configuration is YAML with kebab-case keys. Every section defaults, so a
//! missing or partial file still yields a working runtime. Values of the form
//! `${NAME}` are resolved against the process environment at read time;
//! unresolved references remain literal.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Provider catalogue: name -> provider descriptor.
    pub providers: HashMap<String, ProviderConfig>,

    /// Persistent store location.
    pub storage: StorageConfig,

    /// Pipeline driver cadence.
    pub pipeline: PipelineConfig,

    /// Per-project and per-agent limits.
    pub limits: LimitsConfig,

    /// Transport session behaviour.
    pub session: SessionConfig,
}

impl Config {
    /// Load configuration with fallback chain: explicit path, project-local
    /// `.dracode.yml`, user config, defaults.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let local_config = PathBuf::from(".dracode.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("dracode").join("dracode.yml");
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
        let expanded = expand_env(&content);
        let config: Self = serde_yaml::from_str(&expanded).context("Failed to parse config file")?;
        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Look up a provider by catalogue name.
    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.get(name)
    }
}

/// Resolve `${NAME}` references against the process environment.
///
/// References whose variable is unset are left untouched.
pub fn expand_env(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match std::env::var(name) {
                    Ok(value) => out.push_str(&value),
                    Err(_) => {
                        out.push_str("${");
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str("${");
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

/// One entry in the provider catalogue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Adapter type: "anthropic" or "openai".
    #[serde(rename = "type")]
    pub provider_type: String,

    /// Model identifier.
    pub model: String,

    /// API base URL.
    pub endpoint: String,

    /// API key, usually an `${ENV_VAR}` reference.
    #[serde(rename = "api-key")]
    pub api_key: String,

    /// Other catalogue names this entry can substitute for.
    #[serde(rename = "compatible-with")]
    pub compatible_with: Vec<String>,

    /// Maximum tokens per response.
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Request timeout in milliseconds.
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider_type: "anthropic".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            endpoint: "https://api.anthropic.com".to_string(),
            api_key: "${ANTHROPIC_API_KEY}".to_string(),
            compatible_with: Vec::new(),
            max_tokens: 16384,
            timeout_ms: 300_000,
        }
    }
}

impl ProviderConfig {
    /// The API key with environment references resolved.
    ///
    /// Returns None when the key is empty or still an unresolved reference.
    pub fn resolved_api_key(&self) -> Option<String> {
        let key = expand_env(&self.api_key);
        if key.is_empty() || key.starts_with("${") {
            None
        } else {
            Some(key)
        }
    }
}

/// Persistent store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory for the project registry and per-project state.
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("dracode"),
        }
    }
}

/// Pipeline driver cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Analyzer driver interval in seconds.
    #[serde(rename = "analyzer-interval-secs")]
    pub analyzer_interval_secs: u64,

    /// Supervisor driver interval for newly analyzed projects.
    #[serde(rename = "supervisor-interval-secs")]
    pub supervisor_interval_secs: u64,

    /// Supervisor tick interval while projects are executing.
    #[serde(rename = "execution-tick-secs")]
    pub execution_tick_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            analyzer_interval_secs: 60,
            supervisor_interval_secs: 60,
            execution_tick_secs: 30,
        }
    }
}

/// Limits governing agents and workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Parallel worker cap per project (overridable per project).
    #[serde(rename = "parallel-workers")]
    pub parallel_workers: usize,

    /// How many times a failed or stuck task is retried before staying Failed.
    #[serde(rename = "worker-retry-limit")]
    pub worker_retry_limit: u32,

    /// Seconds without a status transition before a Working worker counts as stuck.
    #[serde(rename = "stuck-deadline-secs")]
    pub stuck_deadline_secs: u64,

    /// Interactive prompt timeout in seconds.
    #[serde(rename = "prompt-timeout-secs")]
    pub prompt_timeout_secs: u64,

    /// LLM round-trip cap per agent turn.
    #[serde(rename = "max-turn-iterations")]
    pub max_turn_iterations: u32,

    /// Response token cap per LLM call.
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            parallel_workers: 3,
            worker_retry_limit: 2,
            stuck_deadline_secs: 600,
            prompt_timeout_secs: 300,
            max_turn_iterations: 25,
            max_tokens: 16384,
        }
    }
}

/// Transport session behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Messages retained per session for replay.
    #[serde(rename = "retained-messages")]
    pub retained_messages: usize,

    /// Seconds a disconnected session survives before garbage collection.
    #[serde(rename = "linger-secs")]
    pub linger_secs: u64,

    /// Unix socket path for the transport listener.
    #[serde(rename = "socket-path")]
    pub socket_path: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retained_messages: 100,
            linger_secs: 600,
            socket_path: dirs::runtime_dir()
                .or_else(dirs::data_local_dir)
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join("dracode")
                .join("dracode.sock"),
        }
    }
}
