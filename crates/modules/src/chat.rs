use std::sync::Arc;

use async_trait::async_trait;
use deskpilot_core::{
    AiMessage, CapabilityModule, ContextSnapshot, ConversationStore, Intent, ModuleCapabilities, ModuleResult,
    QuickAction, Result, Role, ToolDefinition, ToolResult, UiHint,
};
use serde_json::{json, Value};
use tracing::warn;

use crate::llm::Completer;
use crate::{require_str, safe_truncate, str_arg, strings};

const CLIPBOARD_PREVIEW_CHARS: usize = 500;

/// General conversation. Accepts every intent, so it also serves as the
/// router's fallback.
pub struct ChatModule {
    completer: Completer,
    conversations: Arc<dyn ConversationStore>,
    triggers: Vec<String>,
}

impl ChatModule {
    pub fn new(completer: Completer, conversations: Arc<dyn ConversationStore>) -> Self {
        Self {
            completer,
            conversations,
            triggers: strings(&["chat", "talk", "ask", "help", "explain", "tell me", "what is", "how to"]),
        }
    }

    pub fn system_prompt(context: &ContextSnapshot) -> String {
        let mut prompt = String::from("You are a helpful AI assistant. Be concise and direct.");
        prompt.push_str(&format!("\n\nCurrent time: {}", context.time.to_rfc3339()));
        if let Some(clip) = context.clipboard.as_deref().filter(|c| !c.trim().is_empty()) {
            prompt.push_str(&format!(
                "\n\nUser's clipboard: \"{}\"",
                safe_truncate(clip, CLIPBOARD_PREVIEW_CHARS)
            ));
        }
        prompt
    }

    /// Recent history ending with the current message.
    fn messages(intent: &Intent, context: &ContextSnapshot) -> Vec<AiMessage> {
        let mut messages: Vec<AiMessage> = context
            .recent_messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| AiMessage { role: m.role, content: m.content.clone() })
            .collect();
        let ends_with_raw = messages
            .last()
            .is_some_and(|m| m.role == Role::User && m.content == intent.raw());
        if !ends_with_raw {
            messages.push(AiMessage::user(intent.raw()));
        }
        messages
    }

    async fn search(&self, args: &Value) -> Result<ToolResult> {
        let query = match require_str(args, "query") {
            Ok(q) => q,
            Err(missing) => return Ok(missing),
        };
        let hits = self.conversations.search(query).await?;
        Ok(ToolResult::ok(serde_json::to_value(hits)?))
    }

    async fn history(&self, args: &Value) -> Result<ToolResult> {
        let found = match str_arg(args, "conversationId") {
            Some(id) => self.conversations.get(id).await?,
            None => self.conversations.all().await?.into_iter().next(),
        };
        Ok(match found {
            Some(conv) => ToolResult::ok(serde_json::to_value(conv)?),
            None => ToolResult::err("Not found"),
        })
    }
}

#[async_trait]
impl CapabilityModule for ChatModule {
    fn id(&self) -> &str {
        "chat"
    }

    fn name(&self) -> &str {
        "Chat"
    }

    fn description(&self) -> &str {
        "General AI conversation, the default handler"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn triggers(&self) -> &[String] {
        &self.triggers
    }

    fn can_handle(&self, _intent: &Intent) -> bool {
        true
    }

    async fn handle(&self, intent: &Intent, context: &ContextSnapshot) -> Result<ModuleResult> {
        let request = self
            .completer
            .request(&Self::system_prompt(context), Self::messages(intent, context));
        let response = match self.completer.complete(&request).await {
            Ok(response) => response,
            Err(e) => return Ok(ModuleResult::failure(e.to_string())),
        };
        Ok(ModuleResult::success(response.content.clone())
            .with_data(json!({ "model": response.model, "usage": response.usage }))
            .with_ui(UiHint::Markdown))
    }

    fn capabilities(&self) -> ModuleCapabilities {
        ModuleCapabilities::none().with_tools().with_quick_actions()
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::new(
                "chat.search",
                "Full-text search across all conversations",
                json!({
                    "type": "object",
                    "properties": { "query": { "type": "string" } },
                    "required": ["query"]
                }),
            ),
            ToolDefinition::new(
                "chat.get_history",
                "Retrieve a conversation, the most recent one by default",
                json!({
                    "type": "object",
                    "properties": { "conversationId": { "type": "string" } }
                }),
            ),
        ]
    }

    async fn execute_tool(&self, name: &str, args: Value) -> Result<ToolResult> {
        match name {
            "chat.search" => self.search(&args).await,
            "chat.get_history" => self.history(&args).await,
            "chat.new" => {
                let conv = self.conversations.create(str_arg(&args, "title").map(str::to_string)).await?;
                Ok(ToolResult::ok(json!({ "id": conv.id, "title": conv.title })))
            }
            other => {
                warn!(tool = %other, "Unknown chat tool");
                Ok(ToolResult::err(format!("Unknown tool: {}", other)))
            }
        }
    }

    fn quick_actions(&self) -> Vec<QuickAction> {
        vec![QuickAction {
            id: "chat.new".to_string(),
            label: "New Chat".to_string(),
            icon: Some("message-square-plus".to_string()),
            description: Some("Start a new conversation".to_string()),
            module_id: self.id().to_string(),
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{completer, EchoProvider};
    use deskpilot_core::{ConversationMessage, Paths};
    use deskpilot_storage::JsonlConversationStore;

    fn module(provider: Arc<EchoProvider>, dir: &tempfile::TempDir) -> ChatModule {
        let store = JsonlConversationStore::open(Paths::with_base(dir.path().to_path_buf())).unwrap();
        ChatModule::new(completer(provider), Arc::new(store))
    }

    fn intent(raw: &str) -> Intent {
        Intent::new(raw, vec!["chat".into()], "chat", 1.0)
    }

    #[test]
    fn test_system_prompt_clips_clipboard() {
        let mut ctx = ContextSnapshot::empty();
        ctx.clipboard = Some("c".repeat(900));
        let prompt = ChatModule::system_prompt(&ctx);
        assert!(prompt.starts_with("You are a helpful AI assistant."));
        assert!(prompt.contains("Current time: "));
        assert!(prompt.contains(&format!("\"{}\"", "c".repeat(500))));
        assert!(!prompt.contains(&"c".repeat(501)));

        ctx.clipboard = None;
        assert!(!ChatModule::system_prompt(&ctx).contains("clipboard"));
    }

    #[tokio::test]
    async fn test_handle_sends_history_once() {
        let dir = tempfile::tempdir().unwrap();
        let provider = EchoProvider::new();
        let chat = module(provider.clone(), &dir);

        let mut ctx = ContextSnapshot::empty();
        ctx.recent_messages = vec![
            ConversationMessage::new(Role::User, "earlier"),
            ConversationMessage::new(Role::Assistant, "reply"),
            ConversationMessage::new(Role::User, "tell me more"),
        ];
        let result = chat.handle(&intent("tell me more"), &ctx).await.unwrap();

        assert!(result.success);
        assert_eq!(result.message.as_deref(), Some("echo: tell me more"));
        let sent = provider.last();
        assert_eq!(sent.messages.len(), 3);
        assert!(sent.system.unwrap().contains("Current time"));
    }

    #[tokio::test]
    async fn test_provider_failure_becomes_failed_result() {
        let dir = tempfile::tempdir().unwrap();
        let chat = module(EchoProvider::failing(), &dir);
        let result = chat.handle(&intent("hi"), &ContextSnapshot::empty()).await.unwrap();
        assert!(!result.success);
        assert!(result.message.is_none());
        assert_eq!(result.error.as_deref(), Some("HTTP 503: overloaded"));
    }

    #[tokio::test]
    async fn test_new_chat_then_search_and_history() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonlConversationStore::open(Paths::with_base(dir.path().to_path_buf())).unwrap());
        let chat = ChatModule::new(completer(EchoProvider::new()), store.clone());

        let created = chat.execute_tool("chat.new", json!({})).await.unwrap();
        let id = created.data.unwrap()["id"].as_str().unwrap().to_string();
        store
            .add_message(&id, ConversationMessage::new(Role::User, "refactor the parser"))
            .await
            .unwrap();

        let found = chat.execute_tool("chat.search", json!({"query": "PARSER"})).await.unwrap();
        assert_eq!(found.data.unwrap().as_array().unwrap().len(), 1);

        let history = chat.execute_tool("chat.get_history", json!({})).await.unwrap();
        assert_eq!(history.data.unwrap()["title"], "refactor the parser");

        let missing = chat
            .execute_tool("chat.get_history", json!({"conversationId": "nope"}))
            .await
            .unwrap();
        assert_eq!(missing.error.as_deref(), Some("Not found"));

        let bad = chat.execute_tool("chat.search", json!({})).await.unwrap();
        assert!(!bad.success);
    }
}
