use std::sync::Arc;

use crate::ai::provider::LLMProvider;

pub mod anthropic;
pub mod health;
pub mod openai_compatible;
pub mod reliable;
pub mod router;

// Public re-exports
pub use anthropic::{AnthropicConfig, AnthropicProvider};
pub use health::{ProviderEndpointConfig, ProviderKind, ProviderRouter, ProviderRouterError};
pub use openai_compatible::{OpenAICompatibleConfig, OpenAICompatibleProvider};
pub use reliable::ReliableProvider;
pub use router::{CostTier, ModelRouter, ModelTarget, RouterConfig, TaskType};

/// Provider type enum for known providers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    Anthropic,
    VercelAIGateway,
    OpenRouter,
}

impl ProviderType {
    /// Parse provider type from string ID
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "anthropic" => Some(ProviderType::Anthropic),
            "vercel-ai-gateway" => Some(ProviderType::VercelAIGateway),
            "openrouter" => Some(ProviderType::OpenRouter),
            _ => None,
        }
    }

    /// Get the provider ID string
    pub fn as_id(&self) -> &'static str {
        match self {
            ProviderType::Anthropic => "anthropic",
            ProviderType::VercelAIGateway => "vercel-ai-gateway",
            ProviderType::OpenRouter => "openrouter",
        }
    }
}

/// Create a provider from type and API key
pub fn create_provider(
    provider_type: ProviderType,
    api_key: &str,
    base_url: Option<&str>,
    default_model: Option<&str>,
) -> Result<Arc<dyn LLMProvider>, String> {
    if provider_type == ProviderType::Anthropic {
        let mut config = AnthropicConfig::new(api_key);
        if let Some(url) = base_url {
            config = config.with_base_url(url);
        }
        if let Some(model) = default_model {
            config = config.with_default_model(model);
        }
        return Ok(Arc::new(AnthropicProvider::new(config)?));
    }

    let (mut config, name) = match provider_type {
        ProviderType::Anthropic => unreachable!("handled above"),
        ProviderType::VercelAIGateway => (
            OpenAICompatibleConfig::vercel_gateway(api_key),
            "vercel-ai-gateway",
        ),
        ProviderType::OpenRouter => (
            OpenAICompatibleConfig::openrouter(api_key),
            "openrouter",
        ),
    };

    if let Some(url) = base_url {
        config.base_url = url.to_string();
    }
    if let Some(model) = default_model {
        config.default_model = model.to_string();
    }

    Ok(Arc::new(OpenAICompatibleProvider::new(config, name)?))
}
