//! Configuration file and provider factory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use mixeval_core::traits::LlmProvider;

use crate::anthropic::AnthropicProvider;
use crate::mock::MockProvider;
use crate::ollama::OllamaProvider;
use crate::openai::OpenAiProvider;

/// Configuration for a single LLM provider.
///
/// `Debug` masks API keys so configs can be logged.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    OpenAI {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        org_id: Option<String>,
    },
    Anthropic {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
    },
    Ollama {
        #[serde(default = "default_ollama_url")]
        base_url: String,
    },
    /// Offline provider answering from a prompt-substring table.
    Mock {
        #[serde(default)]
        responses: HashMap<String, String>,
        #[serde(default)]
        default_response: Option<String>,
    },
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderConfig::OpenAI {
                base_url, org_id, ..
            } => f
                .debug_struct("OpenAI")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .field("org_id", org_id)
                .finish(),
            ProviderConfig::Anthropic { base_url, .. } => f
                .debug_struct("Anthropic")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .finish(),
            ProviderConfig::Ollama { base_url } => f
                .debug_struct("Ollama")
                .field("base_url", base_url)
                .finish(),
            ProviderConfig::Mock {
                responses,
                default_response,
            } => f
                .debug_struct("Mock")
                .field("responses", &responses.len())
                .field("default_response", default_response)
                .finish(),
        }
    }
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

/// Top-level mixeval configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MixevalConfig {
    /// Provider configurations keyed by name.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    /// Provider for model names given without a `provider/` prefix.
    #[serde(default = "default_provider")]
    pub default_provider: String,
    /// Model evaluated when none is given on the command line.
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Sampling temperature (0.0 for deterministic evals).
    #[serde(default)]
    pub default_temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Max retries on transient provider errors.
    #[serde(default = "default_retries")]
    pub max_retries: u32,
    /// Initial delay between retries in milliseconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
    /// Max concurrent requests.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Directory for reports and the result cache.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Root directory holding source datasets.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Default sampling seed.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_model() -> String {
    "gpt-4.1-mini".to_string()
}
fn default_max_tokens() -> u32 {
    2048
}
fn default_retries() -> u32 {
    3
}
fn default_retry_delay() -> u64 {
    1000
}
fn default_parallelism() -> usize {
    4
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("./mixeval-results")
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_seed() -> u64 {
    42
}

impl Default for MixevalConfig {
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: 0.0,
            max_tokens: default_max_tokens(),
            max_retries: default_retries(),
            retry_delay_ms: default_retry_delay(),
            parallelism: default_parallelism(),
            output_dir: default_output_dir(),
            data_dir: default_data_dir(),
            seed: default_seed(),
        }
    }
}

/// Replace `${VAR_NAME}` references with environment values (empty if unset).
fn resolve_env_vars(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        result.push_str(&rest[..start]);
        result.push_str(&std::env::var(&rest[start + 2..start + len]).unwrap_or_default());
        rest = &rest[start + len + 1..];
    }
    result.push_str(rest);
    result
}

impl ProviderConfig {
    fn resolve_env(&mut self) {
        match self {
            ProviderConfig::OpenAI {
                api_key,
                base_url,
                org_id,
            } => {
                *api_key = resolve_env_vars(api_key);
                if let Some(url) = base_url {
                    *url = resolve_env_vars(url);
                }
                if let Some(org) = org_id {
                    *org = resolve_env_vars(org);
                }
            }
            ProviderConfig::Anthropic { api_key, base_url } => {
                *api_key = resolve_env_vars(api_key);
                if let Some(url) = base_url {
                    *url = resolve_env_vars(url);
                }
            }
            ProviderConfig::Ollama { base_url } => *base_url = resolve_env_vars(base_url),
            ProviderConfig::Mock { .. } => {}
        }
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `mixeval.toml` in the current directory
/// 2. `~/.config/mixeval/config.toml`
///
/// Environment variable overrides: `MIXEVAL_OPENAI_KEY`, `MIXEVAL_ANTHROPIC_KEY`.
pub fn load_config() -> Result<MixevalConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<MixevalConfig> {
    let config_path = match path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => [Some(PathBuf::from("mixeval.toml")), global_config_path()]
            .into_iter()
            .flatten()
            .find(|p| p.exists()),
    };

    let mut config = match config_path {
        Some(path) => {
            tracing::debug!("loading config from {}", path.display());
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<MixevalConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => MixevalConfig::default(),
    };

    apply_env_overrides(&mut config);
    for provider in config.providers.values_mut() {
        provider.resolve_env();
    }

    Ok(config)
}

fn apply_env_overrides(config: &mut MixevalConfig) {
    if let Ok(key) = std::env::var("MIXEVAL_ANTHROPIC_KEY") {
        let entry = config
            .providers
            .entry("anthropic".into())
            .or_insert(ProviderConfig::Anthropic {
                api_key: String::new(),
                base_url: None,
            });
        if let ProviderConfig::Anthropic { api_key, .. } = entry {
            *api_key = key;
        }
    }

    if let Ok(key) = std::env::var("MIXEVAL_OPENAI_KEY") {
        let entry = config
            .providers
            .entry("openai".into())
            .or_insert(ProviderConfig::OpenAI {
                api_key: String::new(),
                base_url: None,
                org_id: None,
            });
        if let ProviderConfig::OpenAI { api_key, .. } = entry {
            *api_key = key;
        }
    }
}

fn global_config_path() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(|h| {
        PathBuf::from(h)
            .join(".config")
            .join("mixeval")
            .join("config.toml")
    })
}

/// Create a provider instance from its configuration.
pub fn create_provider(config: &ProviderConfig) -> Result<Box<dyn LlmProvider>> {
    Ok(match config {
        ProviderConfig::Anthropic { api_key, base_url } => {
            Box::new(AnthropicProvider::new(api_key, base_url.clone())?)
        }
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => Box::new(OpenAiProvider::new(
            api_key,
            base_url.clone(),
            org_id.clone(),
        )?),
        ProviderConfig::Ollama { base_url } => Box::new(OllamaProvider::new(base_url)?),
        ProviderConfig::Mock {
            responses,
            default_response,
        } => {
            let mock = MockProvider::new(responses.clone());
            Box::new(match default_response {
                Some(reply) => mock.with_default(reply),
                None => mock,
            })
        }
    })
}
