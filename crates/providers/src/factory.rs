use std::sync::Arc;

use deskpilot_core::{Config, PreferenceStore};
use tracing::info;

use crate::client::build_http_client;
use crate::ollama::DEFAULT_OLLAMA_URL;
use crate::{AiProviderRegistry, AnthropicProvider, OllamaProvider, OpenAIProvider};

const ANTHROPIC_DEFAULT_BASE: &str = "https://api.anthropic.com/v1";
const OPENAI_DEFAULT_BASE: &str = "https://api.openai.com/v1";

fn api_base<'a>(config: &'a Config, id: &str, fallback: &'a str) -> &'a str {
    config
        .provider(id)
        .and_then(|p| p.api_base.as_deref())
        .filter(|b| !b.trim().is_empty())
        .unwrap_or(fallback)
}

/// Registers Claude, OpenAI and Ollama, in that order. Credentials are not
/// read here; each backend fetches its key from `prefs` per call.
pub fn create_registry(config: &Config, prefs: Arc<dyn PreferenceStore>) -> AiProviderRegistry {
    let registry = AiProviderRegistry::new();

    let claude_base = api_base(config, "claude", ANTHROPIC_DEFAULT_BASE);
    let client = build_http_client(config.provider("claude"), &config.network, claude_base);
    registry.register(Arc::new(AnthropicProvider::new(client, prefs.clone(), Some(claude_base))));

    let openai_base = api_base(config, "openai", OPENAI_DEFAULT_BASE);
    let client = build_http_client(config.provider("openai"), &config.network, openai_base);
    registry.register(Arc::new(OpenAIProvider::new(client, prefs.clone(), Some(openai_base))));

    let ollama_target = prefs
        .get_str("ollamaUrl")
        .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
    let client = build_http_client(config.provider("ollama"), &config.network, &ollama_target);
    registry.register(Arc::new(OllamaProvider::new(client, prefs)));

    info!(models = registry.all_models().len(), "AI providers registered");
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskpilot_core::MemoryPreferences;

    #[test]
    fn test_default_registry_order() {
        let registry = create_registry(&Config::default(), Arc::new(MemoryPreferences::new()));
        let ids: Vec<String> = registry.all().iter().map(|p| p.id().to_string()).collect();
        assert_eq!(ids, vec!["claude", "openai", "ollama"]);
        assert_eq!(
            registry.find_provider("claude-sonnet-4-5-20250929").unwrap().id(),
            "claude"
        );
        assert_eq!(registry.find_provider("llama3.2").unwrap().id(), "ollama");
        assert_eq!(registry.all_models().len(), 11);
    }
}
