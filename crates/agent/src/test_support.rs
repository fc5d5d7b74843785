use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use deskpilot_core::{
    CapabilityModule, ContextLayer, ContextSignal, ContextSnapshot, Error, Intent, ModuleCapabilities,
    ModuleConfig, ModuleResult, QuickAction, Result, ToolDefinition, ToolResult,
};
use serde_json::json;

/// Configurable module used across the crate's tests.
pub struct MockModule {
    pub id: String,
    pub triggers: Vec<String>,
    pub fail_init: bool,
    pub fail_destroy: bool,
    pub fail_handle: bool,
    pub tools: Vec<String>,
    pub signal: Option<(String, serde_json::Value)>,
    pub init_calls: AtomicUsize,
    pub destroy_calls: AtomicUsize,
    pub log: Arc<Mutex<Vec<String>>>,
}

impl MockModule {
    pub fn new(id: &str, triggers: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            triggers: triggers.iter().map(|t| t.to_string()).collect(),
            fail_init: false,
            fail_destroy: false,
            fail_handle: false,
            tools: Vec::new(),
            signal: None,
            init_calls: AtomicUsize::new(0),
            destroy_calls: AtomicUsize::new(0),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_log(mut self, log: Arc<Mutex<Vec<String>>>) -> Self {
        self.log = log;
        self
    }

    pub fn with_tools(mut self, tools: &[&str]) -> Self {
        self.tools = tools.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_signal(mut self, key: &str, value: serde_json::Value) -> Self {
        self.signal = Some((key.to_string(), value));
        self
    }

    pub fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    pub fn failing_destroy(mut self) -> Self {
        self.fail_destroy = true;
        self
    }

    pub fn failing_handle(mut self) -> Self {
        self.fail_handle = true;
        self
    }

    pub fn inits(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn destroys(&self) -> usize {
        self.destroy_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CapabilityModule for MockModule {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.id
    }

    fn description(&self) -> &str {
        "mock module"
    }

    fn triggers(&self) -> &[String] {
        &self.triggers
    }

    async fn init(&self, _config: &ModuleConfig) -> Result<()> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push(format!("init:{}", self.id));
        if self.fail_init {
            return Err(Error::Module(format!("{} refused to start", self.id)));
        }
        Ok(())
    }

    async fn destroy(&self) -> Result<()> {
        self.destroy_calls.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push(format!("destroy:{}", self.id));
        if self.fail_destroy {
            return Err(Error::Module(format!("{} failed to stop", self.id)));
        }
        Ok(())
    }

    async fn handle(&self, intent: &Intent, _context: &ContextSnapshot) -> Result<ModuleResult> {
        if self.fail_handle {
            return Err(Error::Module("handler exploded".into()));
        }
        Ok(ModuleResult::success(format!("{} handled {}", self.id, intent.raw())))
    }

    fn capabilities(&self) -> ModuleCapabilities {
        let mut caps = ModuleCapabilities::none();
        if !self.tools.is_empty() {
            caps = caps.with_tools().with_quick_actions();
        }
        if self.signal.is_some() {
            caps = caps.with_context_signals();
        }
        caps
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition::new(t.clone(), "mock tool", json!({"type": "object"})))
            .collect()
    }

    async fn execute_tool(&self, name: &str, args: serde_json::Value) -> Result<ToolResult> {
        Ok(ToolResult::ok(json!({"module": self.id, "tool": name, "args": args})))
    }

    async fn context_signals(&self) -> Result<Vec<ContextSignal>> {
        Ok(self
            .signal
            .iter()
            .map(|(k, v)| ContextSignal::new(ContextLayer::Session, k.clone(), v.clone(), self.id.clone()))
            .collect())
    }

    fn quick_actions(&self) -> Vec<QuickAction> {
        self.tools
            .first()
            .map(|t| QuickAction {
                id: t.clone(),
                label: format!("Run {}", t),
                icon: None,
                description: None,
                module_id: self.id.clone(),
            })
            .into_iter()
            .collect()
    }
}
