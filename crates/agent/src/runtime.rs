use std::sync::Arc;

use deskpilot_core::{
    CapabilityModule, Clipboard, Config, ConversationMessage, Intent, ModuleResult, Role,
};
use deskpilot_providers::AiProviderRegistry;
use serde_json::json;
use tracing::{info, warn};

use crate::bus::EventBus;
use crate::context::ContextEngine;
use crate::intent::IntentRouter;
use crate::registry::{LifecycleReport, ModuleRegistry};

/// Wires the bus, registries, router and context engine together.
pub struct AssistantRuntime {
    config: Config,
    bus: EventBus,
    registry: Arc<ModuleRegistry>,
    providers: Arc<AiProviderRegistry>,
    router: IntentRouter,
    context: ContextEngine,
}

impl AssistantRuntime {
    pub fn new(config: Config, providers: Arc<AiProviderRegistry>, clipboard: Option<Arc<dyn Clipboard>>) -> Self {
        let bus = EventBus::new();
        let registry = Arc::new(ModuleRegistry::with_bus(bus.clone()));
        let router = IntentRouter::new(registry.clone(), config.router.default_module.clone());
        let mut context = ContextEngine::new(registry.clone(), bus.clone(), config.context.clone());
        if let Some(clipboard) = clipboard {
            context = context.with_clipboard(clipboard);
        }
        Self {
            config,
            bus,
            registry,
            providers,
            router,
            context,
        }
    }

    /// Registers a module with the initial config from `modules.<id>`, if any.
    pub fn register_module(&self, module: Arc<dyn CapabilityModule>) {
        let config = self.config.modules.get(module.id()).cloned();
        self.registry.register(module, config);
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    pub fn providers(&self) -> &Arc<AiProviderRegistry> {
        &self.providers
    }

    pub fn router(&self) -> &IntentRouter {
        &self.router
    }

    pub fn context(&self) -> &ContextEngine {
        &self.context
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn start(&self) -> LifecycleReport {
        let report = self.registry.init_all().await;
        for (id, e) in &report.failures {
            warn!(module = %id, error = %e, "Module unavailable");
        }
        self.context.start().await;
        info!(modules = self.registry.len(), "Assistant runtime started");
        report
    }

    /// Keyword routing, unless `assisted` asks the routing model first.
    pub async fn handle_message(&self, message: &str, assisted: bool) -> (Intent, ModuleResult) {
        let intent = if assisted {
            self.router
                .route_assisted(message, &self.providers, self.config.routing_model())
                .await
        } else {
            self.router.route(message)
        };
        self.bus.send(
            "intent:routed",
            "router",
            json!({ "id": intent.id(), "primary": intent.primary(), "confidence": intent.confidence() }),
        );

        self.context.set_active_module(Some(intent.primary().to_string()));
        self.context
            .push_message(ConversationMessage::new(Role::User, message).with_module(intent.primary()));
        let snapshot = self.context.snapshot();

        let result = self.router.execute(&intent, &snapshot).await;
        if let Some(reply) = result.message.as_deref().filter(|_| result.success) {
            self.context
                .push_message(ConversationMessage::new(Role::Assistant, reply).with_module(intent.primary()));
        }
        self.bus.send(
            "intent:handled",
            intent.primary(),
            json!({ "id": intent.id(), "success": result.success }),
        );
        (intent, result)
    }

    pub async fn shutdown(&self) -> LifecycleReport {
        self.context.stop();
        let report = self.registry.destroy_all().await;
        self.context.clear_signals();
        info!(failures = report.failures.len(), "Assistant runtime stopped");
        report
    }
}
