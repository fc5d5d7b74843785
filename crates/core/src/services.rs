//! Boundaries to the host environment: preferences, history, search, clipboard.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Conversation, ConversationMessage};

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";

pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> Option<serde_json::Value>;

    fn set(&self, key: &str, value: serde_json::Value) -> Result<()>;

    fn get_or(&self, key: &str, default: serde_json::Value) -> serde_json::Value {
        self.get(key).unwrap_or(default)
    }

    fn get_str(&self, key: &str) -> Option<String> {
        self.get(key)
            .and_then(|v| v.as_str().map(str::to_string))
            .filter(|s| !s.trim().is_empty())
    }

    /// Reads `apiKey.<backend>`. Empty strings count as missing.
    fn api_key(&self, backend: &str) -> Option<String> {
        self.get_str(&format!("apiKey.{}", backend))
    }

    fn set_api_key(&self, backend: &str, key: &str) -> Result<()> {
        self.set(&format!("apiKey.{}", backend), serde_json::Value::String(key.to_string()))
    }

    fn default_model(&self) -> String {
        self.get_str("defaultModel").unwrap_or_else(|| DEFAULT_MODEL.to_string())
    }

    fn theme(&self) -> String {
        self.get_str("theme").unwrap_or_else(|| "dark".to_string())
    }
}

/// Process-local preferences, nothing persisted.
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    values: RwLock<HashMap<String, serde_json::Value>>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferences {
    fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.values
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: serde_json::Value) -> Result<()> {
        self.values
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value);
        Ok(())
    }
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create(&self, title: Option<String>) -> Result<Conversation>;

    async fn get(&self, id: &str) -> Result<Option<Conversation>>;

    /// Most recently updated first.
    async fn all(&self) -> Result<Vec<Conversation>>;

    async fn update_title(&self, id: &str, title: &str) -> Result<()>;

    async fn add_message(&self, conversation_id: &str, message: ConversationMessage) -> Result<()>;

    /// Case-insensitive substring match over titles and message bodies.
    async fn search(&self, query: &str) -> Result<Vec<Conversation>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub id: String,
    pub text: String,
    pub score: f64,
    pub metadata: serde_json::Value,
}

#[async_trait]
pub trait VectorSearch: Send + Sync {
    async fn add(&self, id: &str, text: &str, metadata: serde_json::Value) -> Result<()>;

    /// Ranked by similarity, best first, at most `k` hits.
    async fn search(&self, query: &str, k: usize) -> Result<Vec<VectorHit>>;
}

#[async_trait]
pub trait Clipboard: Send + Sync {
    async fn read_text(&self) -> Result<Option<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_api_key_reads_namespaced_key() {
        let prefs = MemoryPreferences::new();
        assert_eq!(prefs.api_key("openai"), None);
        prefs.set("apiKey.openai", json!("  ")).unwrap();
        assert_eq!(prefs.api_key("openai"), None);
        prefs.set_api_key("openai", "sk-1").unwrap();
        assert_eq!(prefs.api_key("openai").as_deref(), Some("sk-1"));
        assert_eq!(prefs.get("apiKey.openai"), Some(json!("sk-1")));
    }

    #[test]
    fn test_convenience_defaults() {
        let prefs = MemoryPreferences::new();
        assert_eq!(prefs.default_model(), DEFAULT_MODEL);
        assert_eq!(prefs.theme(), "dark");
        prefs.set("theme", json!("light")).unwrap();
        assert_eq!(prefs.theme(), "light");
        assert_eq!(prefs.get_or("missing", json!(3)), json!(3));
    }
}
