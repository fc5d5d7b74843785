use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::types::{
    ContextSignal, ContextSnapshot, Intent, ModuleConfig, ModuleResult, QuickAction, ToolDefinition,
    ToolResult,
};

/// Optional features a module opts into. The registry checks these before
/// calling the matching trait method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModuleCapabilities {
    pub tools: bool,
    pub tool_execution: bool,
    pub context_signals: bool,
    pub quick_actions: bool,
}

impl ModuleCapabilities {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_tools(mut self) -> Self {
        self.tools = true;
        self.tool_execution = true;
        self
    }

    pub fn with_context_signals(mut self) -> Self {
        self.context_signals = true;
        self
    }

    pub fn with_quick_actions(mut self) -> Self {
        self.quick_actions = true;
        self
    }
}

/// A pluggable unit of assistant behaviour, keyed by `id`.
#[async_trait]
pub trait CapabilityModule: Send + Sync {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn description(&self) -> &str;

    fn version(&self) -> &str {
        "0.1.0"
    }

    /// Keywords matched case-insensitively against raw input.
    fn triggers(&self) -> &[String];

    async fn init(&self, _config: &ModuleConfig) -> Result<()> {
        Ok(())
    }

    async fn destroy(&self) -> Result<()> {
        Ok(())
    }

    fn can_handle(&self, intent: &Intent) -> bool {
        intent.modules().iter().any(|m| m == self.id())
    }

    async fn handle(&self, intent: &Intent, context: &ContextSnapshot) -> Result<ModuleResult>;

    fn capabilities(&self) -> ModuleCapabilities {
        ModuleCapabilities::none()
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        Vec::new()
    }

    async fn execute_tool(&self, name: &str, _args: serde_json::Value) -> Result<ToolResult> {
        Err(Error::Module(format!("{} does not execute tool {}", self.id(), name)))
    }

    async fn context_signals(&self) -> Result<Vec<ContextSignal>> {
        Ok(Vec::new())
    }

    fn quick_actions(&self) -> Vec<QuickAction> {
        Vec::new()
    }
}
