use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::Result;
use crate::paths::Paths;
use crate::types::ModuleConfig;

/// Per-backend connection settings. Credentials live in the preference store,
/// not here, so they are read fresh on every call.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_base: Option<String>,
    /// `None` follows the global proxy, `Some("")` forces a direct connection.
    #[serde(default)]
    pub proxy: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    #[serde(default)]
    pub proxy: Option<String>,
    #[serde(default)]
    pub no_proxy: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterConfig {
    /// Module that receives messages no trigger matched.
    #[serde(default = "default_module")]
    pub default_module: String,
    /// Model used by LLM-assisted routing. Falls back to `models.defaultModel`.
    #[serde(default)]
    pub routing_model: Option<String>,
}

fn default_module() -> String {
    "chat".to_string()
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_module: default_module(),
            routing_model: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextConfig {
    #[serde(default = "default_clock_interval_ms")]
    pub clock_interval_ms: u64,
    #[serde(default = "default_clipboard_interval_ms")]
    pub clipboard_interval_ms: u64,
    #[serde(default = "default_recent_message_limit")]
    pub recent_message_limit: usize,
}

fn default_clock_interval_ms() -> u64 {
    1000
}

fn default_clipboard_interval_ms() -> u64 {
    2000
}

fn default_recent_message_limit() -> usize {
    10
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            clock_interval_ms: default_clock_interval_ms(),
            clipboard_interval_ms: default_clipboard_interval_ms(),
            recent_message_limit: default_recent_message_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDefaults {
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub temperature: Option<f32>,
}

fn default_model() -> String {
    "claude-sonnet-4-5-20250929".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

impl Default for ModelDefaults {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub models: ModelDefaults,
    /// Initial per-module configuration applied at registration.
    #[serde(default)]
    pub modules: HashMap<String, ModuleConfig>,
}

impl Default for Config {
    fn default() -> Self {
        let mut providers = HashMap::new();
        providers.insert("claude".to_string(), ProviderConfig {
            api_base: Some("https://api.anthropic.com/v1".to_string()),
            proxy: None,
        });
        providers.insert("openai".to_string(), ProviderConfig {
            api_base: Some("https://api.openai.com/v1".to_string()),
            proxy: None,
        });
        // Ollama's base URL is a user preference (`ollamaUrl`); no override here.
        providers.insert("ollama".to_string(), ProviderConfig::default());

        Self {
            providers,
            network: NetworkConfig::default(),
            router: RouterConfig::default(),
            context: ContextConfig::default(),
            models: ModelDefaults::default(),
            modules: HashMap::new(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn load_or_default(paths: &Paths) -> Result<Self> {
        let config_path = paths.config_file();
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn provider(&self, id: &str) -> Option<&ProviderConfig> {
        self.providers.get(id)
    }

    pub fn routing_model(&self) -> &str {
        self.router
            .routing_model
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(&self.models.default_model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let raw = r#"{
  "router": { "defaultModule": "notes" },
  "context": { "clockIntervalMs": 250 }
}"#;
        let cfg: Config = serde_json::from_str(raw).unwrap();
        assert_eq!(cfg.router.default_module, "notes");
        assert_eq!(cfg.context.clock_interval_ms, 250);
        assert_eq!(cfg.context.clipboard_interval_ms, 2000);
        assert_eq!(cfg.context.recent_message_limit, 10);
        assert!(cfg.providers.is_empty());
    }

    #[test]
    fn test_routing_model_falls_back_to_default_model() {
        let mut cfg = Config::default();
        assert_eq!(cfg.routing_model(), "claude-sonnet-4-5-20250929");
        cfg.router.routing_model = Some("llama3.2".to_string());
        assert_eq!(cfg.routing_model(), "llama3.2");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut cfg = Config::default();
        cfg.modules.insert("code".to_string(), ModuleConfig::disabled());
        cfg.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert!(!loaded.modules["code"].enabled);
        assert_eq!(
            loaded.provider("claude").and_then(|p| p.api_base.as_deref()),
            Some("https://api.anthropic.com/v1")
        );
    }
}
