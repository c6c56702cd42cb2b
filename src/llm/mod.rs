pub mod prompt;
pub mod providers;

use crate::config::LlmConfig;
use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("no provider configured")]
    NotConfigured,
    #[error("LLM connection error: {0}")]
    ConnectionError(String),
    #[error("LLM request timed out: {0}")]
    Timeout(String),
    #[error("LLM response error: {0}")]
    ResponseError(String),
    #[error("LLM configuration error: {0}")]
    ConfigError(String),
    #[error("{0}")]
    Exhausted(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout(err.to_string())
        } else {
            LlmError::ConnectionError(err.to_string())
        }
    }
}

/// A text-generation backend: prompt in, SQL text out.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Output of the first provider that produced something usable.
#[derive(Debug, Clone)]
pub struct Generation {
    pub provider: String,
    pub text: String,
}

/// Ordered chain of providers. Each is tried once; the first non-empty
/// answer wins.
pub struct LlmManager {
    generators: Vec<Box<dyn TextGenerator>>,
}

impl LlmManager {
    /// Builds every provider whose credential resolves; the rest are skipped.
    pub fn new(config: &LlmConfig) -> Self {
        let mut generators: Vec<Box<dyn TextGenerator>> = Vec::new();

        for provider in &config.providers {
            let Some(api_key) = provider.credential() else {
                info!("LLM provider '{}' has no credential, skipping", provider.name);
                continue;
            };

            match providers::build(provider, api_key) {
                Ok(generator) => {
                    info!("LLM provider '{}' enabled ({:?}, model {})", provider.name, provider.kind, provider.model);
                    generators.push(generator);
                }
                Err(e) => warn!("LLM provider '{}' could not be built: {}", provider.name, e),
            }
        }

        Self { generators }
    }

    pub fn from_generators(generators: Vec<Box<dyn TextGenerator>>) -> Self {
        Self { generators }
    }

    pub fn is_configured(&self) -> bool {
        !self.generators.is_empty()
    }

    pub async fn generate(&self, prompt: &str) -> Result<Generation, LlmError> {
        if self.generators.is_empty() {
            return Err(LlmError::NotConfigured);
        }

        let mut failures = Vec::new();
        for generator in &self.generators {
            match generator.generate(prompt).await {
                Ok(text) if !text.trim().is_empty() => {
                    return Ok(Generation {
                        provider: generator.name().to_string(),
                        text: text.trim().to_string(),
                    });
                }
                Ok(_) => {
                    warn!("LLM provider '{}' returned an empty response", generator.name());
                    failures.push(format!("{}: empty response", generator.name()));
                }
                Err(e) => {
                    warn!("LLM provider '{}' failed: {}", generator.name(), e);
                    failures.push(format!("{}: {}", generator.name(), e));
                }
            }
        }

        Err(LlmError::Exhausted(failures.join("; ")))
    }
}
