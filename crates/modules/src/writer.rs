use async_trait::async_trait;
use deskpilot_core::{
    AiMessage, CapabilityModule, ContextSnapshot, Intent, ModuleCapabilities, ModuleResult, QuickAction, Result,
    ToolDefinition, ToolResult, UiHint,
};
use serde_json::{json, Value};

use crate::llm::Completer;
use crate::{require_str, str_arg, strings};

const SYSTEM_PROMPT: &str = "You are an expert writer and editor. Produce high-quality, polished content.";
const DEFAULT_TONE: &str = "professional";

pub struct WriterModule {
    completer: Completer,
    triggers: Vec<String>,
}

impl WriterModule {
    pub fn new(completer: Completer) -> Self {
        Self {
            completer,
            triggers: strings(&[
                "write", "draft", "blog", "article", "email", "rewrite", "proofread", "grammar", "tone",
                "summarize", "expand",
            ]),
        }
    }

    /// Fills the prompt template for `name`.
    pub fn prompt_for(name: &str, args: &Value) -> std::result::Result<String, ToolResult> {
        let tone = str_arg(args, "tone").unwrap_or(DEFAULT_TONE);
        Ok(match name {
            "writer.draft" => format!(
                "Write content based on this prompt. Tone: {}.\n\n{}",
                tone,
                require_str(args, "prompt")?
            ),
            "writer.rewrite" => format!(
                "Rewrite the following text in a {} tone:\n\n{}",
                tone,
                require_str(args, "text")?
            ),
            "writer.proofread" => format!(
                "Proofread and correct the following text. List all grammar and style issues:\n\n{}",
                require_str(args, "text")?
            ),
            "writer.summarize" => {
                let text = require_str(args, "text")?;
                match str_arg(args, "length") {
                    Some(length) => format!("Summarize the following text in {}:\n\n{}", length, text),
                    None => format!("Summarize the following text:\n\n{}", text),
                }
            }
            "writer.expand" => format!(
                "Expand these bullet points into well-written prose paragraphs:\n\n{}",
                require_str(args, "text")?
            ),
            other => return Err(ToolResult::err(format!("Unknown tool: {}", other))),
        })
    }
}

fn text_schema(extra: &[&str]) -> Value {
    let mut props = serde_json::Map::new();
    props.insert("text".into(), json!({ "type": "string" }));
    for key in extra {
        props.insert((*key).into(), json!({ "type": "string" }));
    }
    json!({ "type": "object", "properties": props, "required": ["text"] })
}

#[async_trait]
impl CapabilityModule for WriterModule {
    fn id(&self) -> &str {
        "writer"
    }

    fn name(&self) -> &str {
        "Writer"
    }

    fn description(&self) -> &str {
        "Long-form writing, editing, tone adjustment, and content creation"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn triggers(&self) -> &[String] {
        &self.triggers
    }

    fn can_handle(&self, intent: &Intent) -> bool {
        let raw = intent.raw().to_lowercase();
        self.triggers.iter().any(|t| raw.contains(t.as_str()))
    }

    async fn handle(&self, intent: &Intent, _context: &ContextSnapshot) -> Result<ModuleResult> {
        let request = self.completer.request(SYSTEM_PROMPT, vec![AiMessage::user(intent.raw())]);
        match self.completer.complete(&request).await {
            Ok(response) => Ok(ModuleResult::success(response.content).with_ui(UiHint::Markdown)),
            Err(e) => Ok(ModuleResult::failure(e.to_string())),
        }
    }

    fn capabilities(&self) -> ModuleCapabilities {
        ModuleCapabilities::none().with_tools().with_quick_actions()
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::new(
                "writer.draft",
                "Generate content from a prompt",
                json!({
                    "type": "object",
                    "properties": {
                        "prompt": { "type": "string" },
                        "tone": { "type": "string" },
                        "template": { "type": "string" }
                    },
                    "required": ["prompt"]
                }),
            ),
            ToolDefinition::new("writer.rewrite", "Rewrite text with a tone/style", text_schema(&["tone"])),
            ToolDefinition::new("writer.proofread", "Check grammar and style", text_schema(&[])),
            ToolDefinition::new("writer.summarize", "Summarize long text", text_schema(&["length"])),
            ToolDefinition::new("writer.expand", "Expand bullet points into prose", text_schema(&[])),
        ]
    }

    async fn execute_tool(&self, name: &str, args: Value) -> Result<ToolResult> {
        match Self::prompt_for(name, &args) {
            Ok(prompt) => Ok(self.completer.tool_reply(SYSTEM_PROMPT, prompt).await),
            Err(failed) => Ok(failed),
        }
    }

    fn quick_actions(&self) -> Vec<QuickAction> {
        [
            ("writer.draft", "Draft", "pen-tool", "Start a new draft"),
            ("writer.proofread", "Proofread", "spell-check", "Check clipboard text"),
        ]
        .into_iter()
        .map(|(id, label, icon, description)| QuickAction {
            id: id.to_string(),
            label: label.to_string(),
            icon: Some(icon.to_string()),
            description: Some(description.to_string()),
            module_id: self.id().to_string(),
        })
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{completer, EchoProvider};

    #[test]
    fn test_templates() {
        assert_eq!(
            WriterModule::prompt_for("writer.rewrite", &json!({"text": "hey", "tone": "formal"})).unwrap(),
            "Rewrite the following text in a formal tone:\n\nhey"
        );
        assert_eq!(
            WriterModule::prompt_for("writer.draft", &json!({"prompt": "launch post"})).unwrap(),
            "Write content based on this prompt. Tone: professional.\n\nlaunch post"
        );
        assert!(WriterModule::prompt_for("writer.summarize", &json!({"text": "t", "length": "one line"}))
            .unwrap()
            .starts_with("Summarize the following text in one line:"));
    }

    #[tokio::test]
    async fn test_tool_uses_writer_system_prompt() {
        let provider = EchoProvider::new();
        let writer = WriterModule::new(completer(provider.clone()));
        let result = writer
            .execute_tool("writer.proofread", json!({"text": "teh cat"}))
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.data.unwrap().as_str().unwrap().ends_with("teh cat"));
        assert_eq!(provider.last().system.as_deref(), Some(SYSTEM_PROMPT));
    }

    #[tokio::test]
    async fn test_quick_action_without_text_fails_cleanly() {
        let provider = EchoProvider::new();
        let writer = WriterModule::new(completer(provider.clone()));
        let result = writer.execute_tool("writer.proofread", json!({})).await.unwrap();
        assert!(!result.success);
        assert!(provider.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_provider_error_becomes_failed_result() {
        let writer = WriterModule::new(completer(EchoProvider::failing()));
        let result = writer.execute_tool("writer.expand", json!({"text": "- a"})).await.unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("503"));
    }

    #[tokio::test]
    async fn test_handle_backend_error_is_failed_result() {
        let writer = WriterModule::new(completer(EchoProvider::failing()));
        let intent = Intent::new("draft a launch email", vec!["writer".into()], "writer", 1.0);
        let result = writer.handle(&intent, &ContextSnapshot::empty()).await.unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("503"));
    }
}
