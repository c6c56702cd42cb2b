pub mod ollama;
pub mod remote;

use crate::config::{ProviderConfig, ProviderKind};
use crate::llm::{LlmError, TextGenerator};

pub fn build(config: &ProviderConfig, api_key: String) -> Result<Box<dyn TextGenerator>, LlmError> {
    Ok(match config.kind {
        ProviderKind::Chat => Box::new(remote::RemoteLlmProvider::new(config, api_key)?),
        ProviderKind::Generate => Box::new(ollama::OllamaProvider::new(config, api_key)?),
    })
}
