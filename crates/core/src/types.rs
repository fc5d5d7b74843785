use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

pub type Settings = serde_json::Map<String, serde_json::Value>;

/// Enable flag and free-form settings for one module.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModuleConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub settings: Settings,
}

fn default_true() -> bool {
    true
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            settings: Settings::new(),
        }
    }
}

impl ModuleConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            settings: Settings::new(),
        }
    }

    /// Shallow overwrite: fields present in the patch win, the rest persist.
    pub fn apply(&mut self, patch: ModuleConfigPatch) {
        if let Some(enabled) = patch.enabled {
            self.enabled = enabled;
        }
        if let Some(settings) = patch.settings {
            self.settings = settings;
        }
    }

    pub fn setting_str(&self, key: &str) -> Option<&str> {
        self.settings.get(key).and_then(|v| v.as_str())
    }
}

/// Partial update for [`ModuleConfig`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleConfigPatch {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub settings: Option<Settings>,
}

impl ModuleConfigPatch {
    pub fn enabled(enabled: bool) -> Self {
        Self {
            enabled: Some(enabled),
            settings: None,
        }
    }

    pub fn settings(settings: Settings) -> Self {
        Self {
            enabled: None,
            settings: Some(settings),
        }
    }
}

/// Result of routing one user message.
#[derive(Debug, Clone, Serialize)]
pub struct Intent {
    id: String,
    raw: String,
    modules: Vec<String>,
    primary: String,
    confidence: f64,
}

impl Intent {
    /// `modules` must be ordered by score descending with `primary` first.
    pub fn new(raw: impl Into<String>, modules: Vec<String>, primary: impl Into<String>, confidence: f64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            raw: raw.into(),
            modules,
            primary: primary.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn modules(&self) -> &[String] {
        &self.modules
    }

    pub fn primary(&self) -> &str {
        &self.primary
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ContextLayer {
    Immediate,
    Session,
    Daily,
    Longterm,
}

impl std::fmt::Display for ContextLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ContextLayer::Immediate => "immediate",
            ContextLayer::Session => "session",
            ContextLayer::Daily => "daily",
            ContextLayer::Longterm => "longterm",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSignal {
    pub layer: ContextLayer,
    pub key: String,
    pub value: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub source: String,
}

impl ContextSignal {
    pub fn new(layer: ContextLayer, key: impl Into<String>, value: serde_json::Value, source: impl Into<String>) -> Self {
        Self {
            layer,
            key: key.into(),
            value,
            timestamp: Utc::now(),
            source: source.into(),
        }
    }
}

/// Point-in-time view handed to module handlers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSnapshot {
    pub time: DateTime<Utc>,
    pub clipboard: Option<String>,
    pub signals: BTreeMap<String, serde_json::Value>,
    pub recent_messages: Vec<ConversationMessage>,
    pub active_module: Option<String>,
}

impl ContextSnapshot {
    pub fn empty() -> Self {
        Self {
            time: Utc::now(),
            clipboard: None,
            signals: BTreeMap::new(),
            recent_messages: Vec::new(),
            active_module: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AiMessage {
    pub role: Role,
    pub content: String,
}

impl AiMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }
}

#[derive(Debug, Clone)]
pub struct AiRequest {
    pub model: String,
    pub messages: Vec<AiMessage>,
    pub system: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub cancel: CancellationToken,
}

impl AiRequest {
    pub fn new(model: impl Into<String>, messages: Vec<AiMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            system: None,
            temperature: None,
            max_tokens: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiResponse {
    pub content: String,
    pub model: String,
    pub usage: Usage,
}

/// Presentation hint a module may attach to its result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UiHint {
    Markdown,
    Code { language: Option<String> },
    Diff,
    List,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ui: Option<UiHint>,
}

impl ModuleResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.into()),
            error: None,
            ui: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: None,
            error: Some(error.into()),
            ui: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_ui(mut self, ui: UiHint) -> Self {
        self.ui = Some(ui);
        self
    }
}

/// Tool schema advertised by a module, JSON-schema shaped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(data: serde_json::Value) -> Self {
        Self { success: true, data: Some(data), error: None }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self { success: false, data: None, error: Some(error.into()) }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickAction {
    pub id: String,
    pub label: String,
    pub icon: Option<String>,
    pub description: Option<String>,
    pub module_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_id: Option<String>,
}

impl ConversationMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            module_id: None,
        }
    }

    pub fn with_module(mut self, module_id: impl Into<String>) -> Self {
        self.module_id = Some(module_id.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<ConversationMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub source: String,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl BusEvent {
    pub fn new(event_type: impl Into<String>, source: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            source: source.into(),
            data,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_config_patch_is_shallow() {
        let mut settings = Settings::new();
        settings.insert("language".into(), json!("rust"));
        let mut cfg = ModuleConfig { enabled: true, settings };

        cfg.apply(ModuleConfigPatch::enabled(false));
        assert!(!cfg.enabled);
        assert_eq!(cfg.setting_str("language"), Some("rust"));

        let mut replacement = Settings::new();
        replacement.insert("tone".into(), json!("formal"));
        cfg.apply(ModuleConfigPatch::settings(replacement));
        assert!(!cfg.enabled);
        assert_eq!(cfg.setting_str("language"), None);
        assert_eq!(cfg.setting_str("tone"), Some("formal"));
    }

    #[test]
    fn test_module_config_defaults_enabled() {
        let cfg: ModuleConfig = serde_json::from_str("{}").unwrap();
        assert!(cfg.enabled);
        assert!(cfg.settings.is_empty());
    }

    #[test]
    fn test_intent_confidence_is_clamped() {
        let intent = Intent::new("hi", vec!["chat".into()], "chat", 2.5);
        assert_eq!(intent.confidence(), 1.0);
        assert_eq!(intent.primary(), "chat");
        assert!(!intent.id().is_empty());
    }

    #[test]
    fn test_module_result_skips_empty_fields() {
        let v = serde_json::to_value(ModuleResult::failure("boom")).unwrap();
        assert_eq!(v, json!({"success": false, "error": "boom"}));
    }
}
