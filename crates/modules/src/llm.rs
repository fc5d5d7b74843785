use std::sync::Arc;

use deskpilot_core::config::ModelDefaults;
use deskpilot_core::{AiMessage, AiRequest, AiResponse, PreferenceStore, Result, ToolResult};
use deskpilot_providers::AiProviderRegistry;
use serde_json::json;
use tracing::debug;

/// Model selection and request defaults shared by the built-in modules.
#[derive(Clone)]
pub struct Completer {
    providers: Arc<AiProviderRegistry>,
    prefs: Arc<dyn PreferenceStore>,
    defaults: ModelDefaults,
}

impl Completer {
    pub fn new(providers: Arc<AiProviderRegistry>, prefs: Arc<dyn PreferenceStore>, defaults: ModelDefaults) -> Self {
        Self {
            providers,
            prefs,
            defaults,
        }
    }

    /// The `defaultModel` preference, else the configured default.
    pub fn model(&self) -> String {
        self.prefs
            .get_str("defaultModel")
            .unwrap_or_else(|| self.defaults.default_model.clone())
    }

    pub fn request(&self, system: &str, messages: Vec<AiMessage>) -> AiRequest {
        let mut request = AiRequest::new(self.model(), messages)
            .with_system(system)
            .with_max_tokens(self.defaults.max_tokens);
        if let Some(t) = self.defaults.temperature {
            request = request.with_temperature(t);
        }
        request
    }

    pub async fn complete(&self, request: &AiRequest) -> Result<AiResponse> {
        debug!(model = %request.model, "Module completion");
        self.providers.chat(request).await
    }

    /// Single-prompt completion folded into a tool result.
    pub async fn tool_reply(&self, system: &str, prompt: String) -> ToolResult {
        let request = self.request(system, vec![AiMessage::user(prompt)]);
        match self.complete(&request).await {
            Ok(resp) => ToolResult::ok(json!(resp.content)),
            Err(e) => ToolResult::err(e.to_string()),
        }
    }
}
