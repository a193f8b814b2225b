//! mixeval-providers: LLM provider integrations.
//!
//! Implements the `LlmProvider` trait for OpenAI-compatible endpoints,
//! Anthropic, Ollama, and an offline mock, plus the `mixeval.toml` config.

pub mod anthropic;
pub mod config;
mod http;
pub mod mock;
pub mod ollama;
pub mod openai;

pub use config::{create_provider, load_config, load_config_from, MixevalConfig, ProviderConfig};
pub use mixeval_core::error::ProviderError;
