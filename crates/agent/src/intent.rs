use std::sync::Arc;

use deskpilot_core::{
    AiMessage, AiRequest, CapabilityModule, ContextSnapshot, Intent, ModuleResult,
};
use deskpilot_providers::AiProviderRegistry;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::registry::{ModuleRef, ModuleRegistry};

/// Confidence reported when the model picked the module.
const ASSISTED_CONFIDENCE: f64 = 0.8;
const FALLBACK_CONFIDENCE: f64 = 0.5;

/// Counts case-insensitive trigger hits per module, drops zero scores, and
/// orders by score descending. The sort is stable, so ties keep input order.
pub fn score_modules(message: &str, modules: &[(String, Vec<String>)]) -> Vec<(String, usize)> {
    let lower = message.to_lowercase();
    let mut scores: Vec<(String, usize)> = modules
        .iter()
        .map(|(id, triggers)| {
            let score = triggers
                .iter()
                .filter(|t| !t.is_empty() && lower.contains(&t.to_lowercase()))
                .count();
            (id.clone(), score)
        })
        .filter(|(_, score)| *score > 0)
        .collect();
    scores.sort_by(|a, b| b.1.cmp(&a.1));
    scores
}

fn confidence_for(top: usize) -> f64 {
    (top as f64 / 3.0).min(1.0)
}

#[derive(Debug, Deserialize)]
struct RoutingReply {
    #[serde(default)]
    modules: Vec<String>,
    #[serde(rename = "type", default)]
    primary: Option<String>,
}

pub struct IntentRouter {
    registry: Arc<ModuleRegistry>,
    default_module: String,
}

impl IntentRouter {
    pub fn new(registry: Arc<ModuleRegistry>, default_module: impl Into<String>) -> Self {
        Self {
            registry,
            default_module: default_module.into(),
        }
    }

    pub fn default_module(&self) -> &str {
        &self.default_module
    }

    /// Always yields at least one candidate.
    pub fn route(&self, message: &str) -> Intent {
        let candidates: Vec<(String, Vec<String>)> = self
            .registry
            .enabled()
            .iter()
            .map(|m| (m.id().to_string(), m.triggers().to_vec()))
            .collect();
        let scores = score_modules(message, &candidates);

        match scores.first() {
            Some((primary, top)) => {
                let confidence = confidence_for(*top);
                let primary = primary.clone();
                debug!(module = %primary, score = top, confidence, "Routed by keywords");
                let modules = scores.into_iter().map(|(id, _)| id).collect();
                Intent::new(message, modules, primary, confidence)
            }
            None => Intent::new(
                message,
                vec![self.default_module.clone()],
                self.default_module.clone(),
                FALLBACK_CONFIDENCE,
            ),
        }
    }

    /// Never fails: a missing module or a handler error becomes a failure result.
    pub async fn execute(&self, intent: &Intent, context: &ContextSnapshot) -> ModuleResult {
        let module = self
            .registry
            .get(intent.primary())
            .or_else(|| self.registry.get(&self.default_module));

        let Some(module) = module else {
            warn!(primary = %intent.primary(), "No module available for intent");
            return ModuleResult::failure("No module available");
        };

        match module.handle(intent, context).await {
            Ok(result) => result,
            Err(e) => {
                warn!(module = %module.id(), error = %e, "Module handler failed");
                ModuleResult::failure(e.to_string())
            }
        }
    }

    pub fn build_routing_prompt(&self, modules: &[ModuleRef]) -> String {
        let list = modules
            .iter()
            .map(|m| {
                format!(
                    "- {}: {} (triggers: {})",
                    m.id(),
                    m.description(),
                    m.triggers().join(", ")
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "You are an intent router. Given a user message, determine which module(s) should handle it.\n\n\
             Available modules:\n{}\n\n\
             Respond with JSON: {{\"modules\": [\"module_id\"], \"type\": \"primary_module_id\"}}\n\
             If unsure, use \"{}\".",
            list, self.default_module
        )
    }

    /// Asks `model` to pick the module. Any failure along the way falls back
    /// to keyword routing.
    pub async fn route_assisted(&self, message: &str, providers: &AiProviderRegistry, model: &str) -> Intent {
        let enabled = self.registry.enabled();
        let request = AiRequest::new(model, vec![AiMessage::user(message)])
            .with_system(self.build_routing_prompt(&enabled))
            .with_temperature(0.0)
            .with_max_tokens(200);

        let reply = match providers.chat(&request).await {
            Ok(response) => response.content,
            Err(e) => {
                warn!(model = %model, error = %e, "Assisted routing failed, using keywords");
                return self.route(message);
            }
        };

        let known: Vec<&str> = enabled.iter().map(|m| m.id()).collect();
        match parse_routing_reply(&reply, &known) {
            Some((primary, modules)) => {
                debug!(module = %primary, "Routed by model");
                Intent::new(message, modules, primary, ASSISTED_CONFIDENCE)
            }
            None => {
                warn!(reply = %reply, "Unusable routing reply, using keywords");
                self.route(message)
            }
        }
    }
}

/// Extracts `(primary, modules)` from a model reply, keeping only known ids.
/// Tolerates prose or code fences around the JSON object.
pub fn parse_routing_reply(reply: &str, known: &[&str]) -> Option<(String, Vec<String>)> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end < start {
        return None;
    }
    let parsed: RoutingReply = serde_json::from_str(&reply[start..=end]).ok()?;

    let mut modules: Vec<String> = Vec::new();
    for id in parsed.primary.into_iter().chain(parsed.modules) {
        if known.contains(&id.as_str()) && !modules.contains(&id) {
            modules.push(id);
        }
    }
    let primary = modules.first()?.clone();
    Some((primary, modules))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockModule;
    use deskpilot_core::ModuleConfig;

    fn router() -> IntentRouter {
        let registry = Arc::new(ModuleRegistry::new());
        registry.register(Arc::new(MockModule::new("chat", &[])), None);
        registry.register(Arc::new(MockModule::new("code", &["code", "bug"])), None);
        registry.register(Arc::new(MockModule::new("writer", &["write", "draft"])), None);
        IntentRouter::new(registry, "chat")
    }

    #[test]
    fn test_score_modules_orders_and_keeps_ties_stable() {
        let modules = vec![
            ("a".to_string(), vec!["x".to_string()]),
            ("b".to_string(), vec!["x".to_string(), "y".to_string()]),
            ("c".to_string(), vec!["X".to_string()]),
            ("d".to_string(), vec!["z".to_string()]),
        ];
        let scores = score_modules("x and y", &modules);
        assert_eq!(
            scores,
            vec![("b".to_string(), 2), ("a".to_string(), 1), ("c".to_string(), 1)]
        );
    }

    #[test]
    fn test_route_picks_matching_module() {
        let intent = router().route("please fix this bug");
        assert_eq!(intent.primary(), "code");
        assert_eq!(intent.modules(), ["code".to_string()]);
        assert!((intent.confidence() - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_route_unmatched_falls_back_to_default() {
        let intent = router().route("hello there");
        assert_eq!(intent.primary(), "chat");
        assert_eq!(intent.modules(), ["chat".to_string()]);
        assert_eq!(intent.confidence(), 0.5);
    }

    #[test]
    fn test_two_hits_beat_one() {
        let intent = router().route("Write a draft about this CODE");
        assert_eq!(intent.primary(), "writer");
        assert_eq!(intent.modules(), ["writer".to_string(), "code".to_string()]);
    }

    #[test]
    fn test_confidence_saturates_at_three() {
        let registry = Arc::new(ModuleRegistry::new());
        registry.register(Arc::new(MockModule::new("code", &["a", "b", "c", "d"])), None);
        let router = IntentRouter::new(registry, "chat");
        assert_eq!(router.route("a b c").confidence(), 1.0);
        assert_eq!(router.route("a b c d").confidence(), 1.0);
    }

    #[test]
    fn test_disabled_modules_are_not_routed() {
        let r = router();
        r.registry.set_config("code", deskpilot_core::ModuleConfigPatch::enabled(false)).unwrap();
        assert_eq!(r.route("a bug").primary(), "chat");
    }

    #[tokio::test]
    async fn test_execute_falls_back_to_default_module() {
        let r = router();
        let intent = Intent::new("hi", vec!["gone".into()], "gone", 0.9);
        let result = r.execute(&intent, &ContextSnapshot::empty()).await;
        assert!(result.success);
        assert_eq!(result.message.as_deref(), Some("chat handled hi"));
    }

    #[tokio::test]
    async fn test_execute_without_any_module_is_a_failure_result() {
        let router = IntentRouter::new(Arc::new(ModuleRegistry::new()), "chat");
        let result = router.execute(&router.route("hi"), &ContextSnapshot::empty()).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("No module available"));
    }

    #[tokio::test]
    async fn test_handler_error_becomes_failure_result() {
        let registry = Arc::new(ModuleRegistry::new());
        registry.register(Arc::new(MockModule::new("chat", &[]).failing_handle()), Some(ModuleConfig::default()));
        let router = IntentRouter::new(registry, "chat");
        let result = router.execute(&router.route("hi"), &ContextSnapshot::empty()).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("handler exploded"));
    }

    #[test]
    fn test_routing_prompt_lists_modules() {
        let r = router();
        let prompt = r.build_routing_prompt(&r.registry.enabled());
        assert!(prompt.contains("- code: mock module (triggers: code, bug)"));
        assert!(prompt.contains("- chat: mock module (triggers: )"));
        assert!(prompt.contains("If unsure, use \"chat\"."));
    }

    #[test]
    fn test_parse_routing_reply() {
        let known = ["chat", "code", "writer"];
        let reply = "Sure:\n```json\n{\"modules\": [\"code\", \"writer\", \"bogus\"], \"type\": \"writer\"}\n```";
        let (primary, modules) = parse_routing_reply(reply, &known).unwrap();
        assert_eq!(primary, "writer");
        assert_eq!(modules, vec!["writer", "code"]);

        assert!(parse_routing_reply("{\"type\": \"bogus\"}", &known).is_none());
        assert!(parse_routing_reply("no json here", &known).is_none());

        let (primary, _) = parse_routing_reply("{\"modules\": [\"code\"]}", &known).unwrap();
        assert_eq!(primary, "code");
    }

    #[tokio::test]
    async fn test_route_assisted_falls_back_without_providers() {
        let r = router();
        let providers = AiProviderRegistry::new();
        let intent = r.route_assisted("fix the bug", &providers, "nope").await;
        assert_eq!(intent.primary(), "code");
    }
}
