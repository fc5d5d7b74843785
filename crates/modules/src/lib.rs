pub mod chat;
pub mod code;
pub mod git;
pub mod llm;
pub mod project;
pub mod writer;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;

use deskpilot_core::{CapabilityModule, ConversationStore, ToolResult};
use serde_json::Value;

pub use chat::ChatModule;
pub use code::CodeModule;
pub use llm::Completer;
pub use writer::WriterModule;

/// Truncate to at most `max_chars` bytes on a char boundary.
pub fn safe_truncate(s: &str, max_chars: usize) -> &str {
    if s.len() <= max_chars {
        return s;
    }
    let mut end = max_chars;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

pub(crate) fn str_arg<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str).filter(|s| !s.trim().is_empty())
}

/// A missing required argument becomes a failed tool result.
pub(crate) fn require_str<'a>(args: &'a Value, key: &str) -> std::result::Result<&'a str, ToolResult> {
    str_arg(args, key).ok_or_else(|| ToolResult::err(format!("Missing required parameter: {}", key)))
}

pub(crate) fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// The built-in modules in registration order: chat, code, writer.
pub fn default_modules(
    completer: Completer,
    conversations: Arc<dyn ConversationStore>,
) -> Vec<Arc<dyn CapabilityModule>> {
    vec![
        Arc::new(ChatModule::new(completer.clone(), conversations)),
        Arc::new(CodeModule::new(completer.clone())),
        Arc::new(WriterModule::new(completer)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_safe_truncate_multibyte() {
        assert_eq!(safe_truncate("héllo", 2), "h");
        assert_eq!(safe_truncate("abc", 10), "abc");
    }

    #[test]
    fn test_require_str() {
        let args = json!({"text": "hi", "blank": "  "});
        assert_eq!(require_str(&args, "text").ok(), Some("hi"));
        let err = require_str(&args, "blank").unwrap_err();
        assert_eq!(err.error.as_deref(), Some("Missing required parameter: blank"));
    }
}
