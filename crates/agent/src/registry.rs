use std::sync::{Arc, RwLock};

use deskpilot_core::{
    CapabilityModule, Error, ModuleConfig, ModuleConfigPatch, QuickAction, Result, ToolDefinition,
    ToolResult,
};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::bus::EventBus;

pub type ModuleRef = Arc<dyn CapabilityModule>;

struct Entry {
    module: ModuleRef,
    config: ModuleConfig,
}

/// Outcome of `init_all` / `destroy_all`. One failing module never stops the rest.
#[derive(Debug, Default)]
pub struct LifecycleReport {
    pub succeeded: Vec<String>,
    pub failures: Vec<(String, Error)>,
}

impl LifecycleReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed_ids(&self) -> Vec<&str> {
        self.failures.iter().map(|(id, _)| id.as_str()).collect()
    }
}

/// Owns module instances in registration order, with their config.
#[derive(Default)]
pub struct ModuleRegistry {
    entries: RwLock<Vec<Entry>>,
    bus: Option<EventBus>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bus(bus: EventBus) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            bus: Some(bus),
        }
    }

    /// Re-registering an id replaces the instance at its original position.
    /// Without an explicit config, a re-registered module keeps its old one.
    pub fn register(&self, module: ModuleRef, config: Option<ModuleConfig>) {
        let id = module.id().to_string();
        {
            let mut entries = self.write();
            match entries.iter_mut().find(|e| e.module.id() == id) {
                Some(existing) => {
                    debug!(module = %id, "Replacing registered module");
                    existing.module = module;
                    if let Some(config) = config {
                        existing.config = config;
                    }
                }
                None => entries.push(Entry {
                    module,
                    config: config.unwrap_or_default(),
                }),
            }
        }
        self.emit("module:registered", json!({ "id": id }));
    }

    pub fn unregister(&self, id: &str) -> Option<ModuleRef> {
        let removed = {
            let mut entries = self.write();
            let pos = entries.iter().position(|e| e.module.id() == id)?;
            entries.remove(pos).module
        };
        self.emit("module:unregistered", json!({ "id": id }));
        Some(removed)
    }

    pub fn get(&self, id: &str) -> Option<ModuleRef> {
        self.read()
            .iter()
            .find(|e| e.module.id() == id)
            .map(|e| e.module.clone())
    }

    pub fn all(&self) -> Vec<ModuleRef> {
        self.read().iter().map(|e| e.module.clone()).collect()
    }

    pub fn enabled(&self) -> Vec<ModuleRef> {
        self.read()
            .iter()
            .filter(|e| e.config.enabled)
            .map(|e| e.module.clone())
            .collect()
    }

    pub fn is_enabled(&self, id: &str) -> bool {
        self.read()
            .iter()
            .any(|e| e.module.id() == id && e.config.enabled)
    }

    pub fn config(&self, id: &str) -> Option<ModuleConfig> {
        self.read()
            .iter()
            .find(|e| e.module.id() == id)
            .map(|e| e.config.clone())
    }

    pub fn set_config(&self, id: &str, patch: ModuleConfigPatch) -> Result<ModuleConfig> {
        let toggled = patch.enabled;
        let updated = {
            let mut entries = self.write();
            let entry = entries
                .iter_mut()
                .find(|e| e.module.id() == id)
                .ok_or_else(|| Error::NotFound(format!("module {}", id)))?;
            entry.config.apply(patch);
            entry.config.clone()
        };
        if let Some(enabled) = toggled {
            let event = if enabled { "module:enabled" } else { "module:disabled" };
            self.emit(event, json!({ "id": id }));
        }
        Ok(updated)
    }

    pub fn all_tools(&self) -> Vec<ToolDefinition> {
        self.enabled()
            .iter()
            .filter(|m| m.capabilities().tools)
            .flat_map(|m| m.tools())
            .collect()
    }

    pub fn all_quick_actions(&self) -> Vec<QuickAction> {
        self.enabled()
            .iter()
            .filter(|m| m.capabilities().quick_actions)
            .flat_map(|m| m.quick_actions())
            .collect()
    }

    /// Owning module of a tool, among enabled modules that execute tools.
    pub fn tool_owner(&self, name: &str) -> Option<ModuleRef> {
        self.enabled().into_iter().find(|m| {
            let caps = m.capabilities();
            caps.tools && caps.tool_execution && m.tools().iter().any(|t| t.name == name)
        })
    }

    pub async fn execute_tool(&self, name: &str, args: serde_json::Value) -> Result<ToolResult> {
        let module = self
            .tool_owner(name)
            .ok_or_else(|| Error::NotFound(format!("tool {}", name)))?;
        debug!(tool = %name, module = %module.id(), "Executing tool");
        module.execute_tool(name, args).await
    }

    /// Dispatches `execute_tool(action_id, {})` on the module that declared it.
    pub async fn run_quick_action(&self, action_id: &str) -> Result<ToolResult> {
        let module = self
            .enabled()
            .into_iter()
            .find(|m| {
                let caps = m.capabilities();
                caps.quick_actions
                    && caps.tool_execution
                    && m.quick_actions().iter().any(|a| a.id == action_id)
            })
            .ok_or_else(|| Error::NotFound(format!("quick action {}", action_id)))?;
        module.execute_tool(action_id, json!({})).await
    }

    pub async fn init_all(&self) -> LifecycleReport {
        let targets: Vec<(ModuleRef, ModuleConfig)> = self
            .read()
            .iter()
            .filter(|e| e.config.enabled)
            .map(|e| (e.module.clone(), e.config.clone()))
            .collect();

        let mut report = LifecycleReport::default();
        for (module, config) in targets {
            let id = module.id().to_string();
            match module.init(&config).await {
                Ok(()) => {
                    debug!(module = %id, "Module initialized");
                    report.succeeded.push(id);
                }
                Err(e) => {
                    warn!(module = %id, error = %e, "Module init failed");
                    report.failures.push((id, e));
                }
            }
        }
        info!(
            ok = report.succeeded.len(),
            failed = report.failures.len(),
            "Modules initialized"
        );
        report
    }

    /// Destroys every registered module, enabled or not.
    pub async fn destroy_all(&self) -> LifecycleReport {
        let targets = self.all();
        let mut report = LifecycleReport::default();
        for module in targets {
            let id = module.id().to_string();
            match module.destroy().await {
                Ok(()) => report.succeeded.push(id),
                Err(e) => {
                    warn!(module = %id, error = %e, "Module destroy failed");
                    report.failures.push((id, e));
                }
            }
        }
        report
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn emit(&self, event_type: &str, data: serde_json::Value) {
        if let Some(bus) = &self.bus {
            bus.send(event_type, "registry", data);
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Entry>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Entry>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }
}
